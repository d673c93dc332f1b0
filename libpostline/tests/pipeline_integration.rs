//! End-to-end pipeline tests
//!
//! Exercise the full lifecycle against a real on-disk SQLite database:
//! generation sweep creates scheduled drafts, the publish sweep claims and
//! publishes them through mock adapters, and the audit log records exactly
//! one terminal entry per draft.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use libpostline::db::Database;
use libpostline::dispatcher::{Dispatcher, RetryPolicy};
use libpostline::generator::{GeneratedPost, ScriptedGenerator};
use libpostline::platforms::mock::MockClient;
use libpostline::scheduling::AgentSchedule;
use libpostline::types::{
    Account, AgentConfig, Draft, DraftStatus, LogOutcome, Platform,
};

async fn file_db(temp_dir: &TempDir) -> Result<Database> {
    let db_path = temp_dir.path().join("postline.db");
    Ok(Database::new(db_path.to_str().unwrap()).await?)
}

fn agent(user_id: i64, platforms: Vec<Platform>) -> AgentConfig {
    AgentConfig {
        id: uuid_string(),
        user_id,
        active: true,
        platforms,
        selected_accounts: Default::default(),
        schedule: AgentSchedule::default(),
        agency_name: "Northwind Media".to_string(),
        agency_description: "a regional marketing agency".to_string(),
        tone: "confident".to_string(),
        created_at: chrono::Utc::now().timestamp(),
    }
}

fn uuid_string() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn post() -> GeneratedPost {
    GeneratedPost {
        title: "Weekly update".to_string(),
        content: "Fresh work from the studio".to_string(),
        hashtags: vec!["#marketing".to_string()],
        media_prompt: None,
    }
}

async fn account(db: &Database, user_id: i64, platform: Platform) -> Result<Account> {
    let account = Account::new(
        user_id,
        platform,
        format!("{} main", platform),
        format!("ext-{}", platform),
        "token".to_string(),
    );
    db.create_account(&account).await?;
    Ok(account)
}

#[tokio::test]
async fn test_generate_then_publish_full_lifecycle() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db = file_db(&temp_dir).await?;

    account(&db, 1, Platform::LinkedIn).await?;
    account(&db, 1, Platform::Facebook).await?;
    db.create_agent(&agent(1, vec![Platform::LinkedIn, Platform::Facebook]))
        .await?;

    let mut dispatcher = Dispatcher::new(db.clone(), RetryPolicy::none());
    dispatcher.set_generator(Arc::new(ScriptedGenerator::repeating(post())));
    let linkedin = MockClient::succeeding(Platform::LinkedIn, "li-1");
    let facebook = MockClient::succeeding(Platform::Facebook, "fb-1");
    dispatcher.register_client(Arc::new(linkedin.clone()));
    dispatcher.register_client(Arc::new(facebook.clone()));

    // Generation schedules two drafts five minutes out.
    let now = chrono::Utc::now().timestamp();
    let created = dispatcher.run_generation(now).await?;
    assert_eq!(created, 2);

    // Nothing is due yet.
    let stats = dispatcher.run_sweep(now).await?;
    assert_eq!(stats.attempted, 0);

    // Six minutes later both drafts are due and publish cleanly.
    let later = now + 360;
    let stats = dispatcher.run_sweep(later).await?;
    assert_eq!(stats.attempted, 2);
    assert_eq!(stats.published, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(linkedin.attempts(), 1);
    assert_eq!(facebook.attempts(), 1);

    let drafts = db.list_drafts(1, 10).await?;
    assert_eq!(drafts.len(), 2);
    for draft in &drafts {
        assert_eq!(draft.status, DraftStatus::Published);
        assert!(draft.published_at.is_some());
        assert!(draft.external_id.is_some());

        // One pending entry from generation plus one success from publish.
        let log = db.get_draft_log(&draft.id).await?;
        assert_eq!(log.len(), 2);
        assert!(log.iter().any(|e| e.outcome == LogOutcome::Pending));
        assert!(log.iter().any(|e| e.outcome == LogOutcome::Success));
    }

    // A second sweep finds nothing left to do.
    let stats = dispatcher.run_sweep(later).await?;
    assert_eq!(stats.attempted, 0);

    Ok(())
}

#[tokio::test]
async fn test_transient_failures_recover_within_retry_budget() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db = file_db(&temp_dir).await?;
    account(&db, 1, Platform::LinkedIn).await?;

    let mut draft = Draft::new(1, Platform::LinkedIn, "t".to_string(), "c".to_string());
    draft.status = DraftStatus::Scheduled;
    draft.scheduled_at = Some(0);
    db.create_draft(&draft).await?;

    let mock = MockClient::failing_then_succeeding(Platform::LinkedIn, 2, "li-42");
    let mut dispatcher = Dispatcher::new(
        db.clone(),
        RetryPolicy {
            max_retries: 2,
            delay: Duration::ZERO,
        },
    );
    dispatcher.register_client(Arc::new(mock.clone()));

    let stats = dispatcher.run_sweep(chrono::Utc::now().timestamp()).await?;
    assert_eq!(stats.published, 1);
    assert_eq!(mock.attempts(), 3);

    let stored = db.get_draft(&draft.id).await?.unwrap();
    assert_eq!(stored.status, DraftStatus::Published);
    assert_eq!(stored.external_id, Some("li-42".to_string()));

    // One success entry, zero failed entries.
    let log = db.get_draft_log(&draft.id).await?;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].outcome, LogOutcome::Success);

    Ok(())
}

#[tokio::test]
async fn test_exhausted_draft_fails_and_sweep_continues() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db = file_db(&temp_dir).await?;
    account(&db, 1, Platform::Instagram).await?;
    account(&db, 1, Platform::Facebook).await?;

    let mut doomed = Draft::new(1, Platform::Instagram, "t".to_string(), "c".to_string());
    doomed.status = DraftStatus::Scheduled;
    doomed.scheduled_at = Some(0);
    db.create_draft(&doomed).await?;

    let mut fine = Draft::new(1, Platform::Facebook, "t".to_string(), "c".to_string());
    fine.status = DraftStatus::Scheduled;
    fine.scheduled_at = Some(1);
    db.create_draft(&fine).await?;

    let mut dispatcher = Dispatcher::new(
        db.clone(),
        RetryPolicy {
            max_retries: 2,
            delay: Duration::ZERO,
        },
    );
    let instagram = MockClient::unreachable(Platform::Instagram);
    dispatcher.register_client(Arc::new(instagram.clone()));
    dispatcher.register_client(Arc::new(MockClient::succeeding(Platform::Facebook, "fb-7")));

    let stats = dispatcher.run_sweep(chrono::Utc::now().timestamp()).await?;
    assert_eq!(stats.attempted, 2);
    assert_eq!(stats.published, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(instagram.attempts(), 3);

    let failed = db.get_draft(&doomed.id).await?.unwrap();
    assert_eq!(failed.status, DraftStatus::Failed);
    let log = db.get_draft_log(&doomed.id).await?;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].outcome, LogOutcome::Failed);

    let ok = db.get_draft(&fine.id).await?.unwrap();
    assert_eq!(ok.status, DraftStatus::Published);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_publish_only_one_wins() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db = file_db(&temp_dir).await?;
    account(&db, 1, Platform::LinkedIn).await?;

    let mut draft = Draft::new(1, Platform::LinkedIn, "t".to_string(), "c".to_string());
    draft.status = DraftStatus::Scheduled;
    draft.scheduled_at = Some(0);
    db.create_draft(&draft).await?;

    let mock = MockClient::succeeding(Platform::LinkedIn, "li-once");
    let dispatcher = {
        let mut d = Dispatcher::new(db.clone(), RetryPolicy::none());
        d.register_client(Arc::new(mock.clone()));
        Arc::new(d)
    };

    // Race two publishers for the same draft.
    let a = {
        let dispatcher = Arc::clone(&dispatcher);
        let id = draft.id.clone();
        tokio::spawn(async move { dispatcher.publish(1, &id).await })
    };
    let b = {
        let dispatcher = Arc::clone(&dispatcher);
        let id = draft.id.clone();
        tokio::spawn(async move { dispatcher.publish(1, &id).await })
    };

    let results = [a.await?, b.await?];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    // The loser never reached the adapter.
    assert_eq!(mock.attempts(), 1);

    let log = db.get_draft_log(&draft.id).await?;
    assert_eq!(log.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_agent_selected_account_is_used_for_publishing() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db = file_db(&temp_dir).await?;

    let _first = account(&db, 1, Platform::LinkedIn).await?;
    let second = Account::new(
        1,
        Platform::LinkedIn,
        "preferred".to_string(),
        "ext-preferred".to_string(),
        "token-2".to_string(),
    );
    db.create_account(&second).await?;

    let mut agent = agent(1, vec![Platform::LinkedIn]);
    agent
        .selected_accounts
        .insert(Platform::LinkedIn, second.id.clone());
    db.create_agent(&agent).await?;

    let mut dispatcher = Dispatcher::new(db.clone(), RetryPolicy::none());
    dispatcher.set_generator(Arc::new(ScriptedGenerator::repeating(post())));
    let mock = MockClient::succeeding(Platform::LinkedIn, "li-sel");
    dispatcher.register_client(Arc::new(mock.clone()));

    let now = chrono::Utc::now().timestamp();
    dispatcher.run_generation(now).await?;
    let stats = dispatcher.run_sweep(now + 600).await?;
    assert_eq!(stats.published, 1);

    // The generated draft carries the agent id, so resolution went through
    // the selected account.
    let drafts = db.list_drafts(1, 10).await?;
    assert_eq!(drafts[0].agent_id, Some(agent.id.clone()));
    assert_eq!(mock.attempts(), 1);

    Ok(())
}
