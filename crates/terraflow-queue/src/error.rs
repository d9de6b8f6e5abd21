//! Message bus error type, `#[from]`-convertible into
//! `terraflow_shared::OrchestrationError` at the CoreMachine boundary.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to (de)serialize queue message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid receipt handle: {0}")]
    InvalidReceiptHandle(String),

    #[error(
        "queue lock/renew harmonization invariant violated: lock_duration={lock_duration}s \
         auto_renew_max={auto_renew_max}s handler_timeout={handler_timeout}s"
    )]
    HarmonizationViolation {
        lock_duration: u64,
        auto_renew_max: u64,
        handler_timeout: u64,
    },
}

impl From<QueueError> for terraflow_shared::OrchestrationError {
    fn from(e: QueueError) -> Self {
        terraflow_shared::OrchestrationError::queue_error(e.to_string())
    }
}
