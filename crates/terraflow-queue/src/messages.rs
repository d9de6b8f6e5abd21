//! Queue wire formats (§6.1, bit-exact).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use terraflow_shared::JsonValue;
use uuid::Uuid;

/// Posted to the `jobs` queue by `JobBlueprint::enqueue_job` and by stage
/// advancement (§4.5.3 step 4). Drives `CoreMachine::process_job`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQueueMessage {
    pub job_id: String,
    pub job_type: String,
    pub stage: i32,
    pub parameters: JsonValue,
    pub stage_results: JsonValue,
    pub message_id: Uuid,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl JobQueueMessage {
    pub fn new(
        job_id: impl Into<String>,
        job_type: impl Into<String>,
        stage: i32,
        parameters: JsonValue,
        stage_results: JsonValue,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            job_type: job_type.into(),
            stage,
            parameters,
            stage_results,
            message_id: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// Posted to the `tasks` queue by `CoreMachine::process_job` when creating
/// tasks for a stage. Drives `CoreMachine::process_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueueMessage {
    pub task_id: String,
    pub parent_job_id: String,
    pub task_type: String,
    pub stage: i32,
    pub task_index: String,
    pub parameters: JsonValue,
    pub parent_task_id: Option<String>,
    pub message_id: Uuid,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl TaskQueueMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: impl Into<String>,
        parent_job_id: impl Into<String>,
        task_type: impl Into<String>,
        stage: i32,
        task_index: impl Into<String>,
        parameters: JsonValue,
        parent_task_id: Option<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            parent_job_id: parent_job_id.into(),
            task_type: task_type.into(),
            stage,
            task_index: task_index.into(),
            parameters,
            parent_task_id,
            message_id: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_queue_message_round_trips_through_json() {
        let msg = JobQueueMessage::new("a".repeat(64), "hello_world", 1, json!({}), json!({}));
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: JobQueueMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.job_id, msg.job_id);
        assert_eq!(decoded.message_id, msg.message_id);
    }

    #[test]
    fn task_queue_message_allows_null_parent_task_id() {
        let msg = TaskQueueMessage::new(
            "abcd1234-s1-0",
            "abcd1234".repeat(8),
            "reverse_string",
            1,
            "0",
            json!({"message": "hi"}),
            None,
        );
        let encoded = serde_json::to_value(&msg).unwrap();
        assert!(encoded["parent_task_id"].is_null());
    }
}
