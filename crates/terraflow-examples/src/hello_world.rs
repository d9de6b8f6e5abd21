//! `hello_world`: single-stage, single-task job (§8.3 seed scenario 1).
//! Submit `{"message": "hi"}`; the job completes with the message and its
//! reversal.

use std::sync::Arc;

use serde_json::json;
use terraflow_shared::canonical::make_task_id;
use terraflow_shared::models::{JobBlueprint, Parallelism, StageDefinition, TaskSpec};
use terraflow_shared::{OrchestrationError, OrchestrationResult};

pub fn blueprint() -> JobBlueprint {
    JobBlueprint {
        job_type: "hello_world".to_string(),
        description: "echoes a message and its reversal".to_string(),
        stages: vec![StageDefinition {
            number: 1,
            name: "reverse".to_string(),
            task_type: "reverse_string".to_string(),
            parallelism: Parallelism::Single,
            count: Some(1),
        }],
        validate_parameters: Arc::new(validate_parameters),
        generate_job_id: Arc::new(JobBlueprint::default_generate_job_id),
        create_job_record: Arc::new(JobBlueprint::default_create_job_record),
        create_tasks_for_stage: Arc::new(create_tasks_for_stage),
        aggregate_stage: Arc::new(JobBlueprint::default_aggregate),
        build_final_result: Arc::new(JobBlueprint::default_final_result),
    }
}

fn validate_parameters(raw: &serde_json::Value) -> OrchestrationResult<serde_json::Value> {
    let message = raw
        .get("message")
        .and_then(|v| v.as_str())
        .ok_or_else(|| OrchestrationError::contract_violation("'message' must be a string"))?;
    Ok(json!({ "message": message }))
}

fn create_tasks_for_stage(
    _stage: &StageDefinition,
    job_params: &serde_json::Value,
    job_id: &str,
    _previous_results: &[serde_json::Value],
) -> OrchestrationResult<Vec<TaskSpec>> {
    Ok(vec![TaskSpec {
        task_id: make_task_id(job_id, 1, "0"),
        task_type: "reverse_string".to_string(),
        task_index: "0".to_string(),
        parameters: job_params.clone(),
        metadata: terraflow_shared::models::empty_object(),
    }])
}
