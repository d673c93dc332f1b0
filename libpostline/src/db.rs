//! Database operations for Postline

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{DbError, Result};
use crate::types::{
    Account, AgentConfig, Draft, DraftStatus, LogOutcome, LogStats, MediaKind, Platform,
    PublishLogEntry,
};

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Use forward slashes for SQLite URL (works on both Windows and Unix)
        // Use mode=rwc to allow creating the database file if it doesn't exist
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        Self::from_pool(pool).await
    }

    /// Create an in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ---- Drafts ----

    /// Insert a new draft
    pub async fn create_draft(&self, draft: &Draft) -> Result<()> {
        let hashtags = serde_json::to_string(&draft.hashtags)
            .map_err(|e| DbError::CorruptRow(format!("hashtags: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO drafts
                (id, user_id, platform, title, content, hashtags, media_url, media_kind,
                 status, scheduled_at, published_at, external_id, agent_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.id)
        .bind(draft.user_id)
        .bind(draft.platform.as_str())
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(&hashtags)
        .bind(&draft.media_url)
        .bind(draft.media_kind.map(|k| k.as_str()))
        .bind(draft.status.as_str())
        .bind(draft.scheduled_at)
        .bind(draft.published_at)
        .bind(&draft.external_id)
        .bind(&draft.agent_id)
        .bind(draft.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get a draft by ID
    pub async fn get_draft(&self, draft_id: &str) -> Result<Option<Draft>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, platform, title, content, hashtags, media_url, media_kind,
                   status, scheduled_at, published_at, external_id, agent_id, created_at
            FROM drafts WHERE id = ?
            "#,
        )
        .bind(draft_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(draft_from_row).transpose()
    }

    /// Get a draft by ID, but only if it belongs to `user_id`.
    pub async fn get_draft_owned(&self, user_id: i64, draft_id: &str) -> Result<Option<Draft>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, platform, title, content, hashtags, media_url, media_kind,
                   status, scheduled_at, published_at, external_id, agent_id, created_at
            FROM drafts WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(draft_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(draft_from_row).transpose()
    }

    /// Drafts whose schedule has elapsed, oldest first.
    ///
    /// Only `scheduled` drafts are eligible; manual drafts without a
    /// schedule never surface here.
    pub async fn find_due_drafts(&self, now: i64) -> Result<Vec<Draft>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, platform, title, content, hashtags, media_url, media_kind,
                   status, scheduled_at, published_at, external_id, agent_id, created_at
            FROM drafts
            WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ?
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(draft_from_row).collect()
    }

    /// List a user's drafts, newest first.
    pub async fn list_drafts(&self, user_id: i64, limit: usize) -> Result<Vec<Draft>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, platform, title, content, hashtags, media_url, media_kind,
                   status, scheduled_at, published_at, external_id, agent_id, created_at
            FROM drafts
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(draft_from_row).collect()
    }

    /// Claim a draft for publication.
    ///
    /// Conditional transition `draft`/`scheduled` -> `publishing`. Returns
    /// false when the draft was already claimed, already terminal, or
    /// missing, so overlapping sweeps cannot double-publish.
    pub async fn claim_draft(&self, draft_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE drafts SET status = 'publishing'
            WHERE id = ? AND status IN ('draft', 'scheduled')
            "#,
        )
        .bind(draft_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Return a claimed draft to `scheduled` without recording an outcome.
    pub async fn release_claim(&self, draft_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE drafts SET status = 'scheduled'
            WHERE id = ? AND status = 'publishing'
            "#,
        )
        .bind(draft_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Schedule a draft for a future publish time.
    pub async fn set_scheduled(&self, draft_id: &str, scheduled_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE drafts SET status = 'scheduled', scheduled_at = ?
            WHERE id = ?
            "#,
        )
        .bind(scheduled_at)
        .bind(draft_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Record a successful publish: draft becomes `published` and the log
    /// entry is appended in the same transaction.
    pub async fn mark_published(
        &self,
        draft_id: &str,
        external_id: Option<&str>,
        published_at: i64,
        log_entry: &PublishLogEntry,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            UPDATE drafts SET status = 'published', published_at = ?, external_id = ?
            WHERE id = ?
            "#,
        )
        .bind(published_at)
        .bind(external_id)
        .bind(draft_id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        insert_log_entry(&mut tx, log_entry).await?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Record a terminal failure: draft becomes `failed` and the log entry
    /// is appended in the same transaction.
    pub async fn mark_failed(&self, draft_id: &str, log_entry: &PublishLogEntry) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            UPDATE drafts SET status = 'failed'
            WHERE id = ?
            "#,
        )
        .bind(draft_id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        insert_log_entry(&mut tx, log_entry).await?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    // ---- Accounts ----

    /// Insert a new account
    pub async fn create_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts
                (id, user_id, platform, label, external_account_id, access_token,
                 refresh_token, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(account.user_id)
        .bind(account.platform.as_str())
        .bind(&account.label)
        .bind(&account.external_account_id)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.active as i32)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Insert an account, or refresh tokens and label when one already
    /// exists for the same (user, platform, external id). Reconnecting a
    /// platform must not produce duplicate rows.
    pub async fn upsert_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts
                (id, user_id, platform, label, external_account_id, access_token,
                 refresh_token, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform, external_account_id) DO UPDATE SET
                label = excluded.label,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                active = excluded.active
            "#,
        )
        .bind(&account.id)
        .bind(account.user_id)
        .bind(account.platform.as_str())
        .bind(&account.label)
        .bind(&account.external_account_id)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.active as i32)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, platform, label, external_account_id, access_token,
                   refresh_token, active, created_at
            FROM accounts WHERE id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(account_from_row).transpose()
    }

    /// Active accounts for a (user, platform) pair, oldest first.
    pub async fn list_active_accounts(
        &self,
        user_id: i64,
        platform: Platform,
    ) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, platform, label, external_account_id, access_token,
                   refresh_token, active, created_at
            FROM accounts
            WHERE user_id = ? AND platform = ? AND active = 1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(account_from_row).collect()
    }

    /// Mark an account inactive without deleting its history.
    pub async fn deactivate_account(&self, account_id: &str) -> Result<()> {
        sqlx::query("UPDATE accounts SET active = 0 WHERE id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Remove an account entirely. Prefer [`Self::deactivate_account`] when
    /// publish history should stay attributable.
    pub async fn delete_account(&self, account_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Persist a refreshed access token pair.
    pub async fn update_account_tokens(
        &self,
        account_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts SET access_token = ?, refresh_token = ?
            WHERE id = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ---- Agents ----

    /// Insert a new agent configuration
    pub async fn create_agent(&self, agent: &AgentConfig) -> Result<()> {
        let platforms = serde_json::to_string(&agent.platforms)
            .map_err(|e| DbError::CorruptRow(format!("platforms: {}", e)))?;
        let selected = serde_json::to_string(&agent.selected_accounts)
            .map_err(|e| DbError::CorruptRow(format!("selected_accounts: {}", e)))?;
        let schedule = serde_json::to_string(&agent.schedule)
            .map_err(|e| DbError::CorruptRow(format!("schedule: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO agents
                (id, user_id, active, platforms, selected_accounts, schedule,
                 agency_name, agency_description, tone, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&agent.id)
        .bind(agent.user_id)
        .bind(agent.active as i32)
        .bind(&platforms)
        .bind(&selected)
        .bind(&schedule)
        .bind(&agent.agency_name)
        .bind(&agent.agency_description)
        .bind(&agent.tone)
        .bind(agent.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get an agent by ID
    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentConfig>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, active, platforms, selected_accounts, schedule,
                   agency_name, agency_description, tone, created_at
            FROM agents WHERE id = ?
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(agent_from_row).transpose()
    }

    /// All agents eligible for automated generation.
    pub async fn list_active_agents(&self) -> Result<Vec<AgentConfig>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, active, platforms, selected_accounts, schedule,
                   agency_name, agency_description, tone, created_at
            FROM agents
            WHERE active = 1
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(agent_from_row).collect()
    }

    // ---- Publish log ----

    /// Append a log entry outside of a draft status transition.
    pub async fn append_log(&self, entry: &PublishLogEntry) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;
        insert_log_entry(&mut tx, entry).await?;
        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Log entries for one draft, newest first.
    pub async fn get_draft_log(&self, draft_id: &str) -> Result<Vec<PublishLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, draft_id, platform, outcome, message, attempted_at
            FROM publish_log
            WHERE draft_id = ?
            ORDER BY attempted_at DESC, id DESC
            "#,
        )
        .bind(draft_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(log_entry_from_row).collect()
    }

    /// Log entries for one (user, platform) pair, newest first.
    pub async fn query_log(
        &self,
        user_id: i64,
        platform: Platform,
        limit: usize,
    ) -> Result<Vec<PublishLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, draft_id, platform, outcome, message, attempted_at
            FROM publish_log
            WHERE user_id = ? AND platform = ?
            ORDER BY attempted_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(log_entry_from_row).collect()
    }

    /// Outcome counts for one (user, platform) pair.
    pub async fn log_stats(&self, user_id: i64, platform: Platform) -> Result<LogStats> {
        let rows = sqlx::query(
            r#"
            SELECT outcome, COUNT(*) AS n
            FROM publish_log
            WHERE user_id = ? AND platform = ?
            GROUP BY outcome
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut stats = LogStats::default();
        for row in rows {
            let outcome: String = row.get("outcome");
            let count: i64 = row.get("n");
            match outcome.as_str() {
                "success" => stats.success = count,
                "failed" => stats.failed = count,
                "pending" => stats.pending = count,
                _ => {}
            }
        }
        Ok(stats)
    }
}

async fn insert_log_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry: &PublishLogEntry,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO publish_log (id, user_id, draft_id, platform, outcome, message, attempted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(entry.user_id)
    .bind(&entry.draft_id)
    .bind(entry.platform.as_str())
    .bind(entry.outcome.as_str())
    .bind(&entry.message)
    .bind(entry.attempted_at)
    .execute(&mut **tx)
    .await
    .map_err(DbError::SqlxError)?;

    Ok(())
}

fn draft_from_row(r: sqlx::sqlite::SqliteRow) -> Result<Draft> {
    let platform: String = r.get("platform");
    let status: String = r.get("status");
    let hashtags: String = r.get("hashtags");
    let media_kind: Option<String> = r.get("media_kind");

    Ok(Draft {
        id: r.get("id"),
        user_id: r.get("user_id"),
        platform: Platform::from_str(&platform).map_err(DbError::CorruptRow)?,
        title: r.get("title"),
        content: r.get("content"),
        hashtags: serde_json::from_str(&hashtags)
            .map_err(|e| DbError::CorruptRow(format!("hashtags: {}", e)))?,
        media_url: r.get("media_url"),
        media_kind: media_kind
            .map(|k| MediaKind::from_str(&k).map_err(DbError::CorruptRow))
            .transpose()?,
        status: DraftStatus::from_str(&status).map_err(DbError::CorruptRow)?,
        scheduled_at: r.get("scheduled_at"),
        published_at: r.get("published_at"),
        external_id: r.get("external_id"),
        agent_id: r.get("agent_id"),
        created_at: r.get("created_at"),
    })
}

fn account_from_row(r: sqlx::sqlite::SqliteRow) -> Result<Account> {
    let platform: String = r.get("platform");

    Ok(Account {
        id: r.get("id"),
        user_id: r.get("user_id"),
        platform: Platform::from_str(&platform).map_err(DbError::CorruptRow)?,
        label: r.get("label"),
        external_account_id: r.get("external_account_id"),
        access_token: r.get("access_token"),
        refresh_token: r.get("refresh_token"),
        active: r.get::<i32, _>("active") != 0,
        created_at: r.get("created_at"),
    })
}

fn agent_from_row(r: sqlx::sqlite::SqliteRow) -> Result<AgentConfig> {
    let platforms: String = r.get("platforms");
    let selected: String = r.get("selected_accounts");
    let schedule: String = r.get("schedule");

    Ok(AgentConfig {
        id: r.get("id"),
        user_id: r.get("user_id"),
        active: r.get::<i32, _>("active") != 0,
        platforms: serde_json::from_str(&platforms)
            .map_err(|e| DbError::CorruptRow(format!("platforms: {}", e)))?,
        selected_accounts: serde_json::from_str(&selected)
            .map_err(|e| DbError::CorruptRow(format!("selected_accounts: {}", e)))?,
        schedule: serde_json::from_str(&schedule)
            .map_err(|e| DbError::CorruptRow(format!("schedule: {}", e)))?,
        agency_name: r.get("agency_name"),
        agency_description: r.get("agency_description"),
        tone: r.get("tone"),
        created_at: r.get("created_at"),
    })
}

fn log_entry_from_row(r: sqlx::sqlite::SqliteRow) -> Result<PublishLogEntry> {
    let platform: String = r.get("platform");
    let outcome: String = r.get("outcome");

    Ok(PublishLogEntry {
        id: r.get("id"),
        user_id: r.get("user_id"),
        draft_id: r.get("draft_id"),
        platform: Platform::from_str(&platform).map_err(DbError::CorruptRow)?,
        outcome: LogOutcome::from_str(&outcome).map_err(DbError::CorruptRow)?,
        message: r.get("message"),
        attempted_at: r.get("attempted_at"),
    })
}
