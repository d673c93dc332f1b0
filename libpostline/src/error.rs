//! Error types for Postline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PostlineError>;

#[derive(Error, Debug)]
pub enum PostlineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PostlineError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PostlineError::InvalidInput(_) => 3,
            PostlineError::Dispatch(DispatchError::NotFound(_)) => 4,
            PostlineError::Dispatch(DispatchError::NoAccount(_)) => 2,
            PostlineError::Platform(PlatformError::Authentication(_)) => 2,
            PostlineError::Dispatch(_) => 1,
            PostlineError::Platform(_) => 1,
            PostlineError::Config(_) => 1,
            PostlineError::Database(_) => 1,
            PostlineError::Generation(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Errors raised by platform adapters.
///
/// Only transport-level trouble surfaces here; a well-formed vendor error
/// response becomes a `PublishOutcome` with `success: false` instead.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Publishing failed: {0}")]
    Publishing(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors raised by the dispatcher before an adapter is ever invoked, plus
/// the terminal failure after retry exhaustion.
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("Draft not found: {0}")]
    NotFound(String),

    #[error("No active account for {0}")]
    NoAccount(String),

    #[error("Draft not publishable: {0}")]
    InvalidState(String),

    #[error("Publishing failed after {attempts} attempts: {message}")]
    Exhausted { attempts: u32, message: String },
}

#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Generator request failed: {0}")]
    Request(String),

    #[error("Generator returned malformed content: {0}")]
    Malformed(String),
}
