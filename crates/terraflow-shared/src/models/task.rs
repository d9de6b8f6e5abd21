//! Task record, status enum, handler-facing context and result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{empty_object, JsonValue};

/// Task lifecycle status; same shape as `JobStatus` (invariant 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
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

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// One row of `app.tasks` (§3.1, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskRecord {
    pub task_id: String,
    pub parent_job_id: String,
    pub task_type: String,
    pub status: TaskStatus,
    pub stage: i32,
    pub task_index: String,
    pub parameters: JsonValue,
    pub result_data: JsonValue,
    pub next_stage_params: JsonValue,
    pub metadata: JsonValue,
    pub error_details: Option<String>,
    pub retry_count: i32,
    pub heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new_queued(
        task_id: String,
        parent_job_id: String,
        task_type: String,
        stage: i32,
        task_index: String,
        parameters: JsonValue,
        metadata: Option<JsonValue>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            parent_job_id,
            task_type,
            status: TaskStatus::Queued,
            stage,
            task_index,
            parameters,
            result_data: empty_object(),
            next_stage_params: empty_object(),
            metadata: metadata.unwrap_or_else(empty_object),
            error_details: None,
            retry_count: 0,
            heartbeat: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What the orchestrator hands a `TaskHandler` when invoking it (§4.4).
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: String,
    pub parent_job_id: String,
    pub stage: i32,
    pub task_index: String,
    pub correlation_id: Uuid,
    /// The predecessor task's (same semantic index, stage - 1) forwarded
    /// value, if the store has one: its `next_stage_params` when the
    /// predecessor set one, else its `result_data`. Populated eagerly by
    /// the worker loop via `context.loadPredecessor()` in the spec's terms
    /// — handlers MAY ignore it (§9 Open Question).
    pub predecessor_result: Option<JsonValue>,
}

/// What a `TaskHandler` returns (§4.4). Handlers must never raise across
/// this boundary silently; failures are `success: false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default = "empty_object")]
    pub result_data: JsonValue,
    pub error_details: Option<String>,
    pub next_stage_params: Option<JsonValue>,
}

impl TaskResult {
    pub fn ok(result_data: JsonValue) -> Self {
        Self {
            success: true,
            result_data,
            error_details: None,
            next_stage_params: None,
        }
    }

    pub fn ok_with_next_stage_params(result_data: JsonValue, next_stage_params: JsonValue) -> Self {
        Self {
            success: true,
            result_data,
            error_details: None,
            next_stage_params: Some(next_stage_params),
        }
    }

    pub fn err(error_details: impl Into<String>) -> Self {
        Self {
            success: false,
            result_data: empty_object(),
            error_details: Some(error_details.into()),
            next_stage_params: None,
        }
    }
}
