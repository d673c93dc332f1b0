//! Instagram adapter
//!
//! Content Publishing API: create a media container (or a carousel of
//! containers), then publish it with `media_publish`. The ig business
//! account id lives in the account's external id.
//!
//! If the publish step fails after containers were created, the orphan
//! containers are left behind; the Graph API expires them on its own.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::InstagramConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::{
    compose_caption, MediaRef, PlatformClient, PublishOutcome, PublishRequest, HTTP_TIMEOUT_SECS,
};
use crate::types::{Account, MediaKind, Platform};

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

/// Either a created container id or the vendor's refusal.
enum StepResult {
    Id(String),
    Refused(String),
}

pub struct InstagramClient {
    http: reqwest::Client,
    api_base: String,
}

impl InstagramClient {
    pub fn new(config: &InstagramConfig) -> Result<Self> {
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

    /// One Graph API form post that yields an id on success.
    async fn graph_post(&self, url: &str, fields: &[(&str, String)]) -> Result<StepResult> {
        let response = self
            .http
            .post(url)
            .form(fields)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        if response.status().is_success() {
            let body: IdResponse = response
                .json()
                .await
                .map_err(|e| PlatformError::Publishing(format!("unreadable response: {}", e)))?;
            Ok(StepResult::Id(body.id))
        } else {
            let status = response.status();
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("instagram returned {}", status),
            };
            Ok(StepResult::Refused(message))
        }
    }

    fn media_field(media: &MediaRef) -> (&'static str, String) {
        match media.kind {
            MediaKind::Video => ("video_url", media.url.clone()),
            _ => ("image_url", media.url.clone()),
        }
    }

    /// Create the container(s) for the request; returns the publishable
    /// container id. Carousel drafts carry comma-separated item URLs.
    async fn create_container(
        &self,
        account: &Account,
        caption: &str,
        media: &MediaRef,
    ) -> Result<StepResult> {
        let media_url = format!("{}/{}/media", self.api_base, account.external_account_id);

        if media.kind == MediaKind::Carousel {
            let mut children = Vec::new();
            for item_url in media.url.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let child = self
                    .graph_post(
                        &media_url,
                        &[
                            ("image_url", item_url.to_string()),
                            ("is_carousel_item", "true".to_string()),
                            ("access_token", account.access_token.clone()),
                        ],
                    )
                    .await?;
                match child {
                    StepResult::Id(id) => children.push(id),
                    refused => return Ok(refused),
                }
            }
            if children.is_empty() {
                return Ok(StepResult::Refused("carousel has no items".to_string()));
            }

            self.graph_post(
                &media_url,
                &[
                    ("media_type", "CAROUSEL".to_string()),
                    ("children", children.join(",")),
                    ("caption", caption.to_string()),
                    ("access_token", account.access_token.clone()),
                ],
            )
            .await
        } else {
            let (field, value) = Self::media_field(media);
            self.graph_post(
                &media_url,
                &[
                    (field, value),
                    ("caption", caption.to_string()),
                    ("access_token", account.access_token.clone()),
                ],
            )
            .await
        }
    }
}

#[async_trait]
impl PlatformClient for InstagramClient {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(
        &self,
        account: &Account,
        request: &PublishRequest,
    ) -> Result<PublishOutcome> {
        // Instagram requires media; a bare text draft cannot publish.
        let media = match &request.media {
            Some(media) => media,
            None => return Ok(PublishOutcome::failure("instagram requires media")),
        };

        let caption = compose_caption(Platform::Instagram, &request.content, &request.hashtags);

        let container_id = match self.create_container(account, &caption, media).await? {
            StepResult::Id(id) => id,
            StepResult::Refused(message) => return Ok(PublishOutcome::failure(message)),
        };

        let publish_url = format!(
            "{}/{}/media_publish",
            self.api_base, account.external_account_id
        );
        match self
            .graph_post(
                &publish_url,
                &[
                    ("creation_id", container_id),
                    ("access_token", account.access_token.clone()),
                ],
            )
            .await?
        {
            StepResult::Id(media_id) => Ok(PublishOutcome::success(media_id, None)),
            StepResult::Refused(message) => Ok(PublishOutcome::failure(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_field_image_and_carousel() {
        let image = MediaRef {
            url: "https://cdn.example.com/a.jpg".to_string(),
            kind: MediaKind::Image,
        };
        assert_eq!(
            InstagramClient::media_field(&image),
            ("image_url", "https://cdn.example.com/a.jpg".to_string())
        );
    }

    #[test]
    fn test_media_field_video() {
        let video = MediaRef {
            url: "https://cdn.example.com/a.mp4".to_string(),
            kind: MediaKind::Video,
        };
        assert_eq!(
            InstagramClient::media_field(&video),
            ("video_url", "https://cdn.example.com/a.mp4".to_string())
        );
    }

    #[test]
    fn test_id_response_parsing() {
        let parsed: IdResponse = serde_json::from_str(r#"{"id":"17900123"}"#).unwrap();
        assert_eq!(parsed.id, "17900123");
    }

    #[test]
    fn test_error_response_parsing() {
        let json = r#"{"error":{"message":"Media posted before business account conversion"}}"#;
        let parsed: ErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.error.message,
            "Media posted before business account conversion"
        );
    }
}
