//! # State Store (C1)
//!
//! Persists jobs and tasks, and exposes the three atomic server-side
//! procedures (spec §4.1) the orchestrator calls under per-job advisory
//! locks: `complete_task_and_check_stage`, `advance_job_stage`,
//! `check_job_completion`. Only the `app` schema is owned here; `catalog`
//! and `domain` are opaque external collaborators.

pub mod error;
mod jobs;
pub mod pool;
mod tasks;

pub use error::{StoreError, StoreResult};
pub use jobs::TerminalPayload;
pub use pool::MIGRATOR;

use sqlx::PgPool;

/// The Postgres-backed implementation of the State Store contract.
#[derive(Debug, Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
