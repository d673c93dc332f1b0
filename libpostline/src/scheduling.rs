//! Agent schedule descriptors
//!
//! Agents carry a weekly schedule (time-of-day, UTC offset, days of week)
//! that decides when the daemon generates drafts for them. Parsing is strict
//! because the schedule arrives from a persisted JSON column.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{PostlineError, Result};

/// Weekly generation schedule for one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSchedule {
    /// Local time of day, "HH:MM".
    pub time_of_day: String,
    /// Offset from UTC in minutes, e.g. -300 for US Eastern standard time.
    pub utc_offset_minutes: i32,
    /// Days of the week the schedule fires on. Empty means every day.
    #[serde(default)]
    pub days: BTreeSet<String>,
}

impl Default for AgentSchedule {
    fn default() -> Self {
        Self {
            time_of_day: "09:00".to_string(),
            utc_offset_minutes: 0,
            days: BTreeSet::new(),
        }
    }
}

impl AgentSchedule {
    /// Parse and validate the descriptor fields.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the time, offset, or any day name is
    /// malformed.
    pub fn validate(&self) -> Result<()> {
        self.parsed_time()?;
        self.offset()?;
        self.parsed_days()?;
        Ok(())
    }

    fn parsed_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.time_of_day, "%H:%M").map_err(|e| {
            PostlineError::InvalidInput(format!(
                "Invalid time of day '{}': {}",
                self.time_of_day, e
            ))
        })
    }

    fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            PostlineError::InvalidInput(format!(
                "UTC offset out of range: {} minutes",
                self.utc_offset_minutes
            ))
        })
    }

    // chrono's Weekday is not Ord, so the parsed form stays a Vec.
    fn parsed_days(&self) -> Result<Vec<Weekday>> {
        self.days
            .iter()
            .map(|d| parse_weekday(d))
            .collect::<Result<Vec<_>>>()
    }

    /// Next UTC instant at or after `after` when this schedule fires.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let time = self.parsed_time()?;
        let offset = self.offset()?;
        let days = self.parsed_days()?;

        let local_after = after.with_timezone(&offset);
        for day_delta in 0..=7 {
            let date = local_after.date_naive() + Duration::days(day_delta);
            if !days.is_empty() && !days.contains(&date.weekday()) {
                continue;
            }
            let candidate = date
                .and_time(time)
                .and_local_timezone(offset)
                .single()
                .ok_or_else(|| {
                    PostlineError::InvalidInput("Ambiguous local schedule time".to_string())
                })?;
            let candidate = candidate.with_timezone(&Utc);
            if candidate >= after {
                return Ok(candidate);
            }
        }

        // Unreachable: an 8-day window always contains every weekday.
        Err(PostlineError::InvalidInput(
            "No schedule occurrence found in the next week".to_string(),
        ))
    }
}

fn parse_weekday(s: &str) -> Result<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        _ => Err(PostlineError::InvalidInput(format!(
            "Unknown weekday: '{}'",
            s
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule(time: &str, offset_minutes: i32, days: &[&str]) -> AgentSchedule {
        AgentSchedule {
            time_of_day: time.to_string(),
            utc_offset_minutes: offset_minutes,
            days: days.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_default_schedule_is_valid() {
        assert!(AgentSchedule::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_time() {
        assert!(schedule("25:00", 0, &[]).validate().is_err());
        assert!(schedule("nine", 0, &[]).validate().is_err());
        assert!(schedule("", 0, &[]).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_offset() {
        assert!(schedule("09:00", 24 * 60, &[]).validate().is_err());
        assert!(schedule("09:00", -24 * 60, &[]).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_day() {
        assert!(schedule("09:00", 0, &["funday"]).validate().is_err());
    }

    #[test]
    fn test_validate_accepts_day_names_and_abbreviations() {
        assert!(schedule("09:00", 0, &["mon", "Tuesday", "FRI"])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_next_occurrence_same_day() {
        let sched = schedule("15:00", 0, &[]);
        let after = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(); // Monday
        let next = sched.next_occurrence(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 2, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_rolls_to_next_day() {
        let sched = schedule("09:00", 0, &[]);
        let after = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        let next = sched.next_occurrence(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_respects_days() {
        // Mondays only; asking on a Monday afternoon rolls a full week.
        let sched = schedule("09:00", 0, &["monday"]);
        let after = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        let next = sched.next_occurrence(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 9, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_applies_offset() {
        // 09:00 at UTC-5 is 14:00 UTC.
        let sched = schedule("09:00", -300, &[]);
        let after = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let next = sched.next_occurrence(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_exact_boundary() {
        let sched = schedule("12:00", 0, &[]);
        let after = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let next = sched.next_occurrence(after).unwrap();
        assert_eq!(next, after);
    }

    #[test]
    fn test_next_occurrence_with_duplicate_day_spellings() {
        // "mon" and "monday" both parse to the same weekday.
        let sched = schedule("09:00", 0, &["mon", "monday"]);
        let after = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(); // Sunday
        let next = sched.next_occurrence(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_schedule_serde_round_trip() {
        let sched = schedule("18:30", 120, &["wed", "sat"]);
        let json = serde_json::to_string(&sched).unwrap();
        let back: AgentSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sched);
    }

    #[test]
    fn test_schedule_days_default_empty() {
        let back: AgentSchedule =
            serde_json::from_str(r#"{"time_of_day":"08:00","utc_offset_minutes":0}"#).unwrap();
        assert!(back.days.is_empty());
    }
}
