//! Publish dispatcher
//!
//! Owns the pipeline from "draft is due" to "terminal outcome recorded":
//! claim, account resolution, adapter dispatch with bounded retry, and the
//! transactional status + log write. One draft is processed at a time; a
//! failing draft never aborts the sweep.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::db::Database;
use crate::error::{DispatchError, Result};
use crate::generator::{AgencyProfile, ContentGenerator};
use crate::platforms::{MediaRef, PlatformClient, PublishOutcome, PublishRequest};
use crate::types::{Account, AgentConfig, Draft, LogOutcome, Platform, PublishLogEntry};

/// How long after generation a new draft is scheduled to publish.
const GENERATION_LEAD_SECS: i64 = 5 * 60;

/// Bounded retry: `max_retries` attempts after the first, fixed delay
/// between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no delay. Mostly for tests.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Per-sweep tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub attempted: usize,
    pub published: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    db: Database,
    clients: BTreeMap<Platform, Arc<dyn PlatformClient>>,
    generator: Option<Arc<dyn ContentGenerator>>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(db: Database, retry: RetryPolicy) -> Self {
        Self {
            db,
            clients: BTreeMap::new(),
            generator: None,
            retry,
        }
    }

    /// Build a dispatcher with every enabled adapter and the generator
    /// from the loaded configuration.
    pub fn from_config(db: Database, config: &crate::config::Config) -> Result<Self> {
        use crate::generator::LlmGenerator;
        use crate::platforms::{
            facebook::FacebookClient, instagram::InstagramClient, linkedin::LinkedInClient,
        };

        let mut dispatcher = Self::new(db.clone(), RetryPolicy::from_config(&config.dispatch));

        if let Some(linkedin) = config.linkedin.as_ref().filter(|c| c.enabled) {
            dispatcher.register_client(Arc::new(LinkedInClient::new(linkedin, db)?));
        }
        if let Some(facebook) = config.facebook.as_ref().filter(|c| c.enabled) {
            dispatcher.register_client(Arc::new(FacebookClient::new(facebook)?));
        }
        if let Some(instagram) = config.instagram.as_ref().filter(|c| c.enabled) {
            dispatcher.register_client(Arc::new(InstagramClient::new(instagram)?));
        }
        if let Some(generator) = config.generator.as_ref().filter(|c| c.enabled) {
            dispatcher.set_generator(Arc::new(LlmGenerator::new(generator)?));
        }

        Ok(dispatcher)
    }

    pub fn register_client(&mut self, client: Arc<dyn PlatformClient>) {
        self.clients.insert(client.platform(), client);
    }

    pub fn set_generator(&mut self, generator: Arc<dyn ContentGenerator>) {
        self.generator = Some(generator);
    }

    /// Scheduled drafts whose publish time has passed.
    pub async fn find_due_posts(&self, now: i64) -> Result<Vec<Draft>> {
        self.db.find_due_drafts(now).await
    }

    /// Publish one draft end to end.
    ///
    /// The draft must exist and belong to `user_id`; otherwise `NotFound`
    /// with no side effects. A lost claim returns `InvalidState`, also with
    /// no side effects. Everything past the claim ends in a terminal draft
    /// status and exactly one publish-log entry.
    pub async fn publish(&self, user_id: i64, draft_id: &str) -> Result<PublishOutcome> {
        let draft = self
            .db
            .get_draft_owned(user_id, draft_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(draft_id.to_string()))?;

        if !self.db.claim_draft(&draft.id).await? {
            return Err(DispatchError::InvalidState(format!(
                "draft {} is {} and cannot be claimed",
                draft.id, draft.status
            ))
            .into());
        }

        let (client, account) = match self.prepare_dispatch(&draft).await {
            Ok(pair) => pair,
            Err(e) => {
                // Terminal outcomes were already recorded inside
                // prepare_dispatch; for anything else the claim is released
                // instead of leaving the draft stuck in `publishing`.
                if let Err(release) = self.db.release_claim(&draft.id).await {
                    warn!(draft = %draft.id, error = %release, "claim release failed");
                }
                return Err(e);
            }
        };

        let request = PublishRequest {
            title: draft.title.clone(),
            content: draft.content.clone(),
            hashtags: draft.hashtags.clone(),
            media: match (&draft.media_url, draft.media_kind) {
                (Some(url), Some(kind)) => Some(MediaRef {
                    url: url.clone(),
                    kind,
                }),
                _ => None,
            },
        };

        let mut last_error = String::new();
        for attempt in 1..=self.retry.total_attempts() {
            match client.publish(&account, &request).await {
                Ok(outcome) if outcome.success => {
                    let now = chrono::Utc::now().timestamp();
                    let entry = PublishLogEntry::new(
                        draft.user_id,
                        draft.id.clone(),
                        draft.platform,
                        LogOutcome::Success,
                        outcome.message.clone(),
                    );
                    self.db
                        .mark_published(&draft.id, outcome.external_id.as_deref(), now, &entry)
                        .await?;
                    info!(draft = %draft.id, platform = %draft.platform, attempt, "published");
                    return Ok(outcome);
                }
                Ok(outcome) => {
                    // Vendor said no; treated like any other failed attempt.
                    warn!(
                        draft = %draft.id,
                        platform = %draft.platform,
                        attempt,
                        message = %outcome.message,
                        "vendor rejected publish attempt"
                    );
                    last_error = outcome.message;
                }
                Err(e) => {
                    warn!(
                        draft = %draft.id,
                        platform = %draft.platform,
                        attempt,
                        error = %e,
                        "publish attempt failed"
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < self.retry.total_attempts() {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        let attempts = self.retry.total_attempts();
        let message = format!("failed after {} attempts: {}", attempts, last_error);
        self.fail_draft(&draft, &message).await?;

        Err(DispatchError::Exhausted {
            attempts,
            message: last_error,
        }
        .into())
    }

    /// Adapter lookup and account resolution for a claimed draft.
    ///
    /// A missing adapter or account is terminal: the draft is failed with a
    /// log entry before `NoAccount` is returned. Any other error leaves no
    /// outcome behind and must be handled by the caller.
    async fn prepare_dispatch(
        &self,
        draft: &Draft,
    ) -> Result<(Arc<dyn PlatformClient>, Account)> {
        let client = match self.clients.get(&draft.platform) {
            Some(client) => Arc::clone(client),
            None => {
                let message = format!("no adapter configured for {}", draft.platform);
                self.fail_draft(draft, &message).await?;
                return Err(DispatchError::NoAccount(message).into());
            }
        };

        let account = match self.resolve_account(draft).await? {
            Some(account) => account,
            None => {
                let message = format!(
                    "no active {} account for user {}",
                    draft.platform, draft.user_id
                );
                self.fail_draft(draft, &message).await?;
                return Err(DispatchError::NoAccount(draft.platform.to_string()).into());
            }
        };

        Ok((client, account))
    }

    /// Pick the account to publish with.
    ///
    /// 1. The agent's selected account for the platform, if it still exists
    ///    and is active.
    /// 2. Otherwise the first active (user, platform) account.
    /// 3. Otherwise none.
    async fn resolve_account(&self, draft: &Draft) -> Result<Option<Account>> {
        if let Some(agent_id) = &draft.agent_id {
            if let Some(agent) = self.db.get_agent(agent_id).await? {
                if let Some(account_id) = agent.selected_accounts.get(&draft.platform) {
                    match self.db.get_account(account_id).await? {
                        Some(account) if account.active => return Ok(Some(account)),
                        _ => {
                            debug!(
                                draft = %draft.id,
                                account = %account_id,
                                "selected account missing or inactive, falling back"
                            );
                        }
                    }
                }
            }
        }

        let mut active = self
            .db
            .list_active_accounts(draft.user_id, draft.platform)
            .await?;
        Ok(if active.is_empty() {
            None
        } else {
            Some(active.remove(0))
        })
    }

    async fn fail_draft(&self, draft: &Draft, message: &str) -> Result<()> {
        let entry = PublishLogEntry::new(
            draft.user_id,
            draft.id.clone(),
            draft.platform,
            LogOutcome::Failed,
            message.to_string(),
        );
        self.db.mark_failed(&draft.id, &entry).await
    }

    /// Publish every due draft, one at a time. Individual failures are
    /// tallied, never propagated.
    pub async fn run_sweep(&self, now: i64) -> Result<SweepStats> {
        let due = self.find_due_posts(now).await?;
        let mut stats = SweepStats::default();

        for draft in due {
            stats.attempted += 1;
            match self.publish(draft.user_id, &draft.id).await {
                Ok(_) => stats.published += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(draft = %draft.id, error = %e, "sweep publish failed");
                }
            }
        }

        info!(
            attempted = stats.attempted,
            published = stats.published,
            failed = stats.failed,
            "publish sweep finished"
        );
        Ok(stats)
    }

    /// Generate one draft per (active agent, platform) and schedule it for
    /// `now + 5 minutes`, recording a `pending` log entry per created
    /// draft. Generation failures are logged and skipped; a failure leaves
    /// no draft and no publish-log entry to attach to.
    pub async fn run_generation(&self, now: i64) -> Result<usize> {
        let generator = match &self.generator {
            Some(generator) => Arc::clone(generator),
            None => {
                debug!("no content generator configured, skipping generation sweep");
                return Ok(0);
            }
        };

        let agents = self.db.list_active_agents().await?;
        let mut created = 0;

        for agent in agents {
            let profile = AgencyProfile {
                name: agent.agency_name.clone(),
                description: agent.agency_description.clone(),
                tone: agent.tone.clone(),
            };

            for platform in &agent.platforms {
                match generator.generate(&profile, *platform).await {
                    Ok(post) => {
                        let draft = Self::draft_from_generated(&agent, *platform, post, now);
                        self.db.create_draft(&draft).await?;
                        let entry = PublishLogEntry::new(
                            agent.user_id,
                            draft.id.clone(),
                            *platform,
                            LogOutcome::Pending,
                            "draft generated and scheduled".to_string(),
                        );
                        self.db.append_log(&entry).await?;
                        created += 1;
                        info!(
                            agent = %agent.id,
                            platform = %platform,
                            draft = %draft.id,
                            "generated draft"
                        );
                    }
                    Err(e) => {
                        warn!(
                            agent = %agent.id,
                            platform = %platform,
                            error = %e,
                            "generation failed, skipping platform"
                        );
                    }
                }
            }
        }

        Ok(created)
    }

    fn draft_from_generated(
        agent: &AgentConfig,
        platform: Platform,
        post: crate::generator::GeneratedPost,
        now: i64,
    ) -> Draft {
        let mut draft = Draft::new(agent.user_id, platform, post.title, post.content);
        draft.hashtags = post.hashtags;
        draft.agent_id = Some(agent.id.clone());
        draft.status = crate::types::DraftStatus::Scheduled;
        draft.scheduled_at = Some(now + GENERATION_LEAD_SECS);
        draft
    }
}
