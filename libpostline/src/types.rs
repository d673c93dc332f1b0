//! Core types for Postline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Target publishing platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    LinkedIn,
    Facebook,
    Instagram,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::LinkedIn, Platform::Facebook, Platform::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::LinkedIn => "linkedin",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }

    /// Maximum caption length enforced before dispatch, if the platform
    /// documents one.
    pub fn caption_limit(&self) -> Option<usize> {
        match self {
            Platform::LinkedIn => Some(3000),
            Platform::Facebook => None,
            Platform::Instagram => Some(2200),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linkedin" => Ok(Platform::LinkedIn),
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            _ => Err(format!(
                "Unknown platform: '{}'. Valid options: linkedin, facebook, instagram",
                s
            )),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a draft.
///
/// `Publishing` is a claim state: a dispatcher moves a draft there with a
/// conditional update before calling the adapter, so two overlapping sweeps
/// cannot both publish the same draft. `Published` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Draft => "draft",
            DraftStatus::Scheduled => "scheduled",
            DraftStatus::Publishing => "publishing",
            DraftStatus::Published => "published",
            DraftStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DraftStatus::Published | DraftStatus::Failed)
    }
}

impl FromStr for DraftStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DraftStatus::Draft),
            "scheduled" => Ok(DraftStatus::Scheduled),
            "publishing" => Ok(DraftStatus::Publishing),
            "published" => Ok(DraftStatus::Published),
            "failed" => Ok(DraftStatus::Failed),
            _ => Err(format!("Unknown draft status: '{}'", s)),
        }
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of media attached to a draft.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Carousel,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Carousel => "carousel",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "carousel" => Ok(MediaKind::Carousel),
            _ => Err(format!("Unknown media kind: '{}'", s)),
        }
    }
}

/// A generated social-media post awaiting scheduling or publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub user_id: i64,
    pub platform: Platform,
    pub title: String,
    pub content: String,
    pub hashtags: Vec<String>,
    pub media_url: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub status: DraftStatus,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
    pub external_id: Option<String>,
    pub agent_id: Option<String>,
    pub created_at: i64,
}

impl Draft {
    pub fn new(user_id: i64, platform: Platform, title: String, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            platform,
            title,
            content,
            hashtags: Vec::new(),
            media_url: None,
            media_kind: None,
            status: DraftStatus::Draft,
            scheduled_at: None,
            published_at: None,
            external_id: None,
            agent_id: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// A stored credential set binding one user to one external platform
/// profile or page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user_id: i64,
    pub platform: Platform,
    pub label: String,
    /// Stable identifier assigned by the vendor (person id, page id,
    /// IG business account id).
    pub external_account_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub active: bool,
    pub created_at: i64,
}

impl Account {
    pub fn new(
        user_id: i64,
        platform: Platform,
        label: String,
        external_account_id: String,
        access_token: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            platform,
            label,
            external_account_id,
            access_token,
            refresh_token: None,
            active: true,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Per-user settings describing which platforms, accounts, and schedule to
/// use for automated generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub user_id: i64,
    pub active: bool,
    pub platforms: Vec<Platform>,
    /// Preferred account per platform; the dispatcher falls back to any
    /// active account when the mapping is missing or stale.
    pub selected_accounts: std::collections::BTreeMap<Platform, String>,
    pub schedule: crate::scheduling::AgentSchedule,
    pub agency_name: String,
    pub agency_description: String,
    pub tone: String,
    pub created_at: i64,
}

/// Outcome of one publish attempt in the audit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutcome {
    Success,
    Failed,
    Pending,
}

impl LogOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogOutcome::Success => "success",
            LogOutcome::Failed => "failed",
            LogOutcome::Pending => "pending",
        }
    }
}

impl FromStr for LogOutcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(LogOutcome::Success),
            "failed" => Ok(LogOutcome::Failed),
            "pending" => Ok(LogOutcome::Pending),
            _ => Err(format!("Unknown log outcome: '{}'", s)),
        }
    }
}

impl fmt::Display for LogOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record for a draft: generation appends a `pending`
/// entry, a finished publish appends `success` or `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishLogEntry {
    pub id: String,
    pub user_id: i64,
    pub draft_id: String,
    pub platform: Platform,
    pub outcome: LogOutcome,
    pub message: String,
    pub attempted_at: i64,
}

impl PublishLogEntry {
    pub fn new(
        user_id: i64,
        draft_id: String,
        platform: Platform,
        outcome: LogOutcome,
        message: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            draft_id,
            platform,
            outcome,
            message,
            attempted_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Success/failed/pending counts for one (user, platform) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    pub success: i64,
    pub failed: i64,
    pub pending: i64,
}
