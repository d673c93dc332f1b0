//! Postline - scheduled multi-platform social publishing
//!
//! This library stores generated post drafts, schedules them, and publishes
//! them to LinkedIn, Facebook Pages, and Instagram with bounded retry and
//! an append-only audit log.

pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod generator;
pub mod logging;
pub mod platforms;
pub mod scheduling;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use dispatcher::{Dispatcher, RetryPolicy, SweepStats};
pub use error::{PostlineError, Result};
pub use types::{Account, AgentConfig, Draft, DraftStatus, Platform, PublishLogEntry};
