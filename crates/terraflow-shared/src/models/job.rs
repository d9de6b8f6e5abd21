//! Job record and status enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{empty_object, JsonValue};

/// Job lifecycle status. QUEUED -> PROCESSING -> {COMPLETED, FAILED};
/// COMPLETED and FAILED are terminal (invariant 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Valid per invariant 3: Job: QUEUED->PROCESSING->{COMPLETED,FAILED}.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Completed)
                | (Queued, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// One row of `app.jobs` (§3.1, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRecord {
    pub job_id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub stage: i32,
    pub total_stages: i32,
    pub parameters: JsonValue,
    pub stage_results: JsonValue,
    pub result_data: JsonValue,
    pub error_details: Option<String>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Build a fresh QUEUED job row ready for insertion. `metadata` defaults
    /// to `{}` per invariant 6 when `None` is passed.
    pub fn new_queued(
        job_id: String,
        job_type: String,
        total_stages: i32,
        parameters: JsonValue,
        metadata: Option<JsonValue>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            job_type,
            status: JobStatus::Queued,
            stage: 1,
            total_stages,
            parameters,
            stage_results: empty_object(),
            result_data: empty_object(),
            error_details: None,
            metadata: metadata.unwrap_or_else(empty_object),
            created_at: now,
            updated_at: now,
        }
    }

    /// Terminal integrity (invariant 7 / P7).
    pub fn satisfies_terminal_integrity(&self) -> bool {
        match self.status {
            JobStatus::Completed => !matches!(&self.result_data, JsonValue::Object(m) if m.is_empty()),
            JobStatus::Failed => self
                .error_details
                .as_ref()
                .is_some_and(|d| !d.is_empty()),
            _ => true,
        }
    }
}
