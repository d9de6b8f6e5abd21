//! State store error type, `#[from]`-convertible into
//! `terraflow_shared::OrchestrationError` at the CoreMachine boundary.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },
}

impl StoreError {
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound {
            job_id: job_id.into(),
        }
    }

    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            task_id: task_id.into(),
        }
    }
}

impl From<StoreError> for terraflow_shared::OrchestrationError {
    fn from(e: StoreError) -> Self {
        use terraflow_shared::OrchestrationError as OE;
        match e {
            StoreError::Database(err) => OE::DatabaseError(err),
            StoreError::JobNotFound { job_id } => OE::unknown_job(job_id),
            StoreError::TaskNotFound { task_id } => OE::unknown_task(task_id),
            StoreError::InvalidTransition {
                entity,
                id,
                from,
                to,
            } => OE::invalid_transition(entity, id, from, to),
        }
    }
}
