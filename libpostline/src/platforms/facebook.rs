//! Facebook Page adapter
//!
//! Publishes to a Page feed through the Graph API. The request is a form
//! post; the page id comes from the account's external id and the page
//! access token from the account's stored token.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::FacebookConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::{
    compose_caption, PlatformClient, PublishOutcome, PublishRequest, HTTP_TIMEOUT_SECS,
};
use crate::types::{Account, Platform};

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

#[derive(Debug, Deserialize)]
struct FeedResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: GraphError,
}

/// Graph API error envelope: `{ "error": { "message", "type", "code" } }`.
#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<i64>,
}

pub struct FacebookClient {
    http: reqwest::Client,
    api_base: String,
}

impl FacebookClient {
    pub fn new(config: &FacebookConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }

    fn form_fields(account: &Account, request: &PublishRequest) -> Vec<(&'static str, String)> {
        let message = compose_caption(Platform::Facebook, &request.content, &request.hashtags);

        let mut fields = vec![
            ("message", message),
            ("access_token", account.access_token.clone()),
        ];
        if let Some(media) = &request.media {
            fields.push(("picture", media.url.clone()));
        }
        fields
    }
}

#[async_trait]
impl PlatformClient for FacebookClient {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish(
        &self,
        account: &Account,
        request: &PublishRequest,
    ) -> Result<PublishOutcome> {
        let url = format!("{}/{}/feed", self.api_base, account.external_account_id);
        let fields = Self::form_fields(account, request);

        let response = self
            .http
            .post(&url)
            .form(&fields)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        if response.status().is_success() {
            let feed: FeedResponse = response
                .json()
                .await
                .map_err(|e| PlatformError::Publishing(format!("unreadable response: {}", e)))?;

            let canonical_url = format!("https://www.facebook.com/{}", feed.id);
            Ok(PublishOutcome::success(feed.id, Some(canonical_url)))
        } else {
            let status = response.status();
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => match (body.error.kind, body.error.code) {
                    (Some(kind), Some(code)) => {
                        format!("{} ({} {})", body.error.message, kind, code)
                    }
                    _ => body.error.message,
                },
                Err(_) => format!("facebook returned {}", status),
            };
            Ok(PublishOutcome::failure(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MediaRef;
    use crate::types::MediaKind;

    fn page_account() -> Account {
        Account::new(
            1,
            Platform::Facebook,
            "Page".to_string(),
            "246810".to_string(),
            "page-token".to_string(),
        )
    }

    fn request(media: Option<MediaRef>) -> PublishRequest {
        PublishRequest {
            title: "t".to_string(),
            content: "Body text".to_string(),
            hashtags: vec!["#fb".to_string()],
            media,
        }
    }

    #[test]
    fn test_form_fields_without_media() {
        let fields = FacebookClient::form_fields(&page_account(), &request(None));
        assert_eq!(
            fields,
            vec![
                ("message", "Body text #fb".to_string()),
                ("access_token", "page-token".to_string()),
            ]
        );
    }

    #[test]
    fn test_form_fields_with_picture() {
        let media = MediaRef {
            url: "https://cdn.example.com/p.jpg".to_string(),
            kind: MediaKind::Image,
        };
        let fields = FacebookClient::form_fields(&page_account(), &request(Some(media)));
        assert!(fields.contains(&("picture", "https://cdn.example.com/p.jpg".to_string())));
    }

    #[test]
    fn test_error_envelope_parsing() {
        let json = r#"{"error":{"message":"Invalid OAuth access token","type":"OAuthException","code":190}}"#;
        let parsed: ErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.error.message, "Invalid OAuth access token");
        assert_eq!(parsed.error.kind.as_deref(), Some("OAuthException"));
        assert_eq!(parsed.error.code, Some(190));
    }

    #[test]
    fn test_feed_response_parsing() {
        let parsed: FeedResponse = serde_json::from_str(r#"{"id":"246810_13579"}"#).unwrap();
        assert_eq!(parsed.id, "246810_13579");
    }
}
