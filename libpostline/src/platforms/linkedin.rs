//! LinkedIn adapter
//!
//! Publishes via the versioned REST API (`/rest/posts`). The post body is a
//! typed structure serialized with serde, never hand-assembled JSON. Images
//! go through the two-step initializeUpload flow before the post itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::config::LinkedInConfig;
use crate::db::Database;
use crate::error::{PlatformError, Result};
use crate::platforms::{
    compose_caption, PlatformClient, PublishOutcome, PublishRequest, HTTP_TIMEOUT_SECS,
};
use crate::types::{Account, MediaKind, Platform};

const DEFAULT_API_BASE: &str = "https://api.linkedin.com";
const OAUTH_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const API_VERSION: &str = "202405";

/// Body of `POST /rest/posts`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostBody {
    author: String,
    commentary: String,
    visibility: &'static str,
    distribution: Distribution,
    lifecycle_state: &'static str,
    is_reshare_disabled_by_author: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<PostContent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Distribution {
    feed_distribution: &'static str,
}

#[derive(Debug, Serialize)]
struct PostContent {
    media: MediaId,
}

#[derive(Debug, Serialize)]
struct MediaId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InitializeUploadResponse {
    value: UploadValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadValue {
    upload_url: String,
    image: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VendorError {
    message: Option<String>,
}

pub struct LinkedInClient {
    http: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: String,
    db: Database,
}

impl LinkedInClient {
    pub fn new(config: &LinkedInConfig, db: Database) -> Result<Self> {
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
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            db,
        })
    }

    /// Author URN for the account. Organization pages carry an
    /// `organization:` prefix in the stored external id; everything else is
    /// a member profile.
    fn author_urn(account: &Account) -> String {
        match account.external_account_id.strip_prefix("organization:") {
            Some(org_id) => format!("urn:li:organization:{}", org_id),
            None => format!("urn:li:person:{}", account.external_account_id),
        }
    }

    /// Best-effort token refresh before publishing. Failure keeps the old
    /// token; the publish attempt decides whether it was still good.
    async fn refresh_access_token(&self, account: &Account) -> Option<String> {
        let refresh_token = account.refresh_token.as_deref()?;

        let response = self
            .http
            .post(OAUTH_TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<TokenResponse>().await {
                    Ok(token) => {
                        if let Err(e) = self.store_refreshed(account, &token).await {
                            debug!(account = %account.id, error = %e, "refreshed token not persisted");
                        }
                        debug!(account = %account.id, "refreshed linkedin access token");
                        Some(token.access_token)
                    }
                    Err(e) => {
                        debug!(account = %account.id, error = %e, "token refresh body unreadable");
                        None
                    }
                }
            }
            Ok(resp) => {
                debug!(account = %account.id, status = %resp.status(), "token refresh rejected");
                None
            }
            Err(e) => {
                debug!(account = %account.id, error = %e, "token refresh unreachable");
                None
            }
        }
    }

    /// Persist a refreshed token pair. A new refresh token replaces the
    /// stored one; otherwise the stored one is kept.
    async fn store_refreshed(&self, account: &Account, token: &TokenResponse) -> Result<()> {
        let refresh = token
            .refresh_token
            .as_deref()
            .or(account.refresh_token.as_deref());
        self.db
            .update_account_tokens(&account.id, &token.access_token, refresh)
            .await
    }

    /// Two-step image upload: initializeUpload, then PUT the bytes fetched
    /// from the draft's media URL. Returns the image URN.
    async fn upload_image(&self, token: &str, owner_urn: &str, media_url: &str) -> Result<String> {
        let init: InitializeUploadResponse = self
            .http
            .post(format!(
                "{}/rest/images?action=initializeUpload",
                self.api_base
            ))
            .bearer_auth(token)
            .header("LinkedIn-Version", API_VERSION)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&json!({ "initializeUploadRequest": { "owner": owner_urn } }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| PlatformError::Publishing(format!("image upload init: {}", e)))?
            .json()
            .await
            .map_err(|e| PlatformError::Publishing(format!("image upload init body: {}", e)))?;

        let bytes = self
            .http
            .get(media_url)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("fetch media: {}", e)))?
            .error_for_status()
            .map_err(|e| PlatformError::Publishing(format!("fetch media: {}", e)))?
            .bytes()
            .await
            .map_err(|e| PlatformError::Network(format!("fetch media body: {}", e)))?;

        self.http
            .put(&init.value.upload_url)
            .bearer_auth(token)
            .body(bytes)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("upload media: {}", e)))?
            .error_for_status()
            .map_err(|e| PlatformError::Publishing(format!("upload media: {}", e)))?;

        Ok(init.value.image)
    }
}

#[async_trait]
impl PlatformClient for LinkedInClient {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    async fn publish(
        &self,
        account: &Account,
        request: &PublishRequest,
    ) -> Result<PublishOutcome> {
        let token = self
            .refresh_access_token(account)
            .await
            .unwrap_or_else(|| account.access_token.clone());

        let author = Self::author_urn(account);
        let commentary = compose_caption(Platform::LinkedIn, &request.content, &request.hashtags);

        let content = match &request.media {
            Some(media) if media.kind == MediaKind::Image => {
                let image_urn = self.upload_image(&token, &author, &media.url).await?;
                Some(PostContent {
                    media: MediaId { id: image_urn },
                })
            }
            _ => None,
        };

        let body = PostBody {
            author,
            commentary,
            visibility: "PUBLIC",
            distribution: Distribution {
                feed_distribution: "MAIN_FEED",
            },
            lifecycle_state: "PUBLISHED",
            is_reshare_disabled_by_author: false,
            content,
        };

        let response = self
            .http
            .post(format!("{}/rest/posts", self.api_base))
            .bearer_auth(&token)
            .header("LinkedIn-Version", API_VERSION)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        if response.status().is_success() {
            // The post id arrives in a header, not the body.
            let post_id = response
                .headers()
                .get("x-restli-id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            let canonical_url = post_id
                .as_ref()
                .map(|id| format!("https://www.linkedin.com/feed/update/{}", id));

            Ok(PublishOutcome {
                success: true,
                external_id: post_id,
                canonical_url,
                message: "published".to_string(),
            })
        } else {
            let status = response.status();
            let message = match response.json::<VendorError>().await {
                Ok(err) => err
                    .message
                    .unwrap_or_else(|| format!("linkedin returned {}", status)),
                Err(_) => format!("linkedin returned {}", status),
            };
            Ok(PublishOutcome::failure(message))
        }
    }
}
