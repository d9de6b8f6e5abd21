//! # Orchestration Error Types
//!
//! Unified error handling for the orchestration core. Mirrors the
//! contract-violation / business-error split: `ContractViolation` and
//! `HandlerNotRegistered` are programming defects that fail the task loudly;
//! the rest are business errors a caller can reasonably retry or surface.

use thiserror::Error;

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Comprehensive error type for orchestration core operations.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("queue error: {0}")]
    QueueError(String),

    #[error("unknown job: {job_id}")]
    UnknownJob { job_id: String },

    #[error("unknown task: {task_id}")]
    UnknownTask { task_id: String },

    #[error("invalid state transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("no handler registered for task_type: {task_type}")]
    HandlerNotRegistered { task_type: String },

    #[error("no blueprint registered for job_type: {job_type}")]
    BlueprintNotRegistered { job_type: String },

    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("invalid task spec from blueprint '{job_type}' stage {stage}: {reason}")]
    InvalidTaskSpec {
        job_type: String,
        stage: i32,
        reason: String,
    },
}

impl OrchestrationError {
    pub fn queue_error(message: impl Into<String>) -> Self {
        Self::QueueError(message.into())
    }

    pub fn unknown_job(job_id: impl Into<String>) -> Self {
        Self::UnknownJob {
            job_id: job_id.into(),
        }
    }

    pub fn unknown_task(task_id: impl Into<String>) -> Self {
        Self::UnknownTask {
            task_id: task_id.into(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            id: id.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn handler_not_registered(task_type: impl Into<String>) -> Self {
        Self::HandlerNotRegistered {
            task_type: task_type.into(),
        }
    }

    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::ContractViolation(message.into())
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    /// `CONTRACT_VIOLATION:`-prefixed errors crash the handler invocation per
    /// §7; everything else is a business error that the task/job can absorb.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::ContractViolation(_) | Self::HandlerNotRegistered { .. }
        )
    }

    /// Render the string stored in `error_details` columns, prefixed per §7
    /// for contract violations so operators can grep for them.
    pub fn to_error_details(&self) -> String {
        if self.is_contract_violation() {
            format!("CONTRACT_VIOLATION: {self}")
        } else {
            self.to_string()
        }
    }

    /// Whether the underlying condition is worth retrying at the transport
    /// layer (transient I/O), as opposed to a structural/contract problem.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::DatabaseError(_) | Self::QueueError(_) => true,
            Self::UnknownJob { .. }
            | Self::UnknownTask { .. }
            | Self::InvalidTransition { .. }
            | Self::HandlerNotRegistered { .. }
            | Self::BlueprintNotRegistered { .. }
            | Self::ContractViolation(_)
            | Self::ConfigurationError(_)
            | Self::SerializationError(_)
            | Self::InvalidTaskSpec { .. } => false,
        }
    }
}
