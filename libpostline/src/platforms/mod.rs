//! Platform adapters
//!
//! One adapter per vendor API. The dispatcher hands every adapter the same
//! publish request; the adapter owns caption composition, the wire format,
//! and the mapping of vendor responses into a [`PublishOutcome`].
//!
//! Error discipline: transport failures (connect errors, timeouts,
//! unparseable bodies) surface as `PlatformError` and are retried by the
//! dispatcher. A well-formed vendor error response is NOT an error at this
//! layer; it becomes a `PublishOutcome` with `success: false`, and the
//! dispatcher treats it as a failed attempt.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Account, MediaKind, Platform};

pub mod facebook;
pub mod instagram;
pub mod linkedin;

// Mock adapter is available for all builds (not just tests) to support
// integration tests
pub mod mock;

/// Timeout applied to every vendor HTTP call.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Media attached to a publish request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

/// Everything an adapter needs to publish one draft.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub title: String,
    pub content: String,
    pub hashtags: Vec<String>,
    pub media: Option<MediaRef>,
}

/// Result of one adapter call that reached the vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub success: bool,
    /// Vendor-assigned post id, when the vendor returned one.
    pub external_id: Option<String>,
    /// Public URL of the published post, when derivable.
    pub canonical_url: Option<String>,
    /// Human-readable detail; the vendor error message on failure.
    pub message: String,
}

impl PublishOutcome {
    pub fn success(external_id: impl Into<String>, canonical_url: Option<String>) -> Self {
        Self {
            success: true,
            external_id: Some(external_id.into()),
            canonical_url,
            message: "published".to_string(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            canonical_url: None,
            message: message.into(),
        }
    }
}

/// A vendor API client the dispatcher can publish through.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// The platform this client publishes to.
    fn platform(&self) -> Platform;

    /// Publish one request using the given account's credentials.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError` only for transport-level trouble; vendor
    /// rejections come back as an unsuccessful [`PublishOutcome`].
    async fn publish(&self, account: &Account, request: &PublishRequest)
        -> Result<PublishOutcome>;
}

/// Compose the final caption: content, a space, then hashtags joined by
/// spaces, truncated to the platform limit with a `...` marker.
///
/// Truncation counts characters, not bytes, so multi-byte captions never
/// split a code point.
pub fn compose_caption(platform: Platform, content: &str, hashtags: &[String]) -> String {
    let mut caption = content.to_string();
    if !hashtags.is_empty() {
        caption.push(' ');
        caption.push_str(&hashtags.join(" "));
    }

    match platform.caption_limit() {
        Some(limit) if caption.chars().count() > limit => {
            let mut truncated: String = caption.chars().take(limit.saturating_sub(3)).collect();
            truncated.push_str("...");
            truncated
        }
        _ => caption,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_caption_joins_hashtags() {
        let caption = compose_caption(
            Platform::Facebook,
            "Big launch today",
            &["#launch".to_string(), "#startup".to_string()],
        );
        assert_eq!(caption, "Big launch today #launch #startup");
    }

    #[test]
    fn test_compose_caption_no_hashtags_no_trailing_space() {
        let caption = compose_caption(Platform::Facebook, "Plain text", &[]);
        assert_eq!(caption, "Plain text");
    }

    #[test]
    fn test_compose_caption_truncates_at_platform_limit() {
        let long = "x".repeat(4000);
        let caption = compose_caption(Platform::LinkedIn, &long, &[]);
        assert_eq!(caption.chars().count(), 3000);
        assert!(caption.ends_with("..."));

        let caption = compose_caption(Platform::Instagram, &long, &[]);
        assert_eq!(caption.chars().count(), 2200);
        assert!(caption.ends_with("..."));
    }

    #[test]
    fn test_compose_caption_facebook_is_unlimited() {
        let long = "x".repeat(10_000);
        let caption = compose_caption(Platform::Facebook, &long, &[]);
        assert_eq!(caption.len(), 10_000);
    }

    #[test]
    fn test_compose_caption_exact_limit_untouched() {
        let exact = "y".repeat(2200);
        let caption = compose_caption(Platform::Instagram, &exact, &[]);
        assert_eq!(caption, exact);
    }

    #[test]
    fn test_compose_caption_counts_chars_not_bytes() {
        // 3000 three-byte characters would overflow a byte-based limit.
        let multibyte = "\u{65e5}".repeat(3000);
        let caption = compose_caption(Platform::LinkedIn, &multibyte, &[]);
        assert_eq!(caption.chars().count(), 3000);
        assert!(!caption.ends_with("..."));
    }

    #[test]
    fn test_compose_caption_truncation_includes_hashtags() {
        let content = "z".repeat(2195);
        let caption = compose_caption(
            Platform::Instagram,
            &content,
            &["#one".to_string(), "#two".to_string()],
        );
        assert_eq!(caption.chars().count(), 2200);
        assert!(caption.ends_with("..."));
    }

    #[test]
    fn test_publish_outcome_constructors() {
        let ok = PublishOutcome::success("post-1", Some("https://example.com/p/1".to_string()));
        assert!(ok.success);
        assert_eq!(ok.external_id, Some("post-1".to_string()));

        let bad = PublishOutcome::failure("token expired");
        assert!(!bad.success);
        assert_eq!(bad.external_id, None);
        assert_eq!(bad.message, "token expired");
    }
}
