//! Error types for creez-tasks

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider returned HTTP {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    #[error("Upload failed for {object}: {reason}")]
    Upload { object: String, reason: String },

    #[error("Insufficient credits for user {user_id}")]
    QuotaExceeded { user_id: String },

    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("No artifacts were generated or uploaded")]
    NoArtifacts,

    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler is shut down")]
    SchedulerClosed,
}

impl TaskError {
    /// Whether this failure came from the credit check rather than generation
    pub fn is_quota(&self) -> bool {
        matches!(self, TaskError::QuotaExceeded { .. })
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
