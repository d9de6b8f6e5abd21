//! `fan_out_demo`: two-stage fan-out pipeline (§8.3 seed scenario 2).
//! Submit `{"n": 3}`; stage 1 creates `n` tasks doubling their index, stage
//! 2 fans out again, squaring each of stage 1's values.

use std::sync::Arc;

use serde_json::json;
use terraflow_shared::canonical::make_task_id;
use terraflow_shared::models::{JobBlueprint, Parallelism, StageDefinition, TaskSpec};
use terraflow_shared::{OrchestrationError, OrchestrationResult};

pub fn blueprint() -> JobBlueprint {
    JobBlueprint {
        job_type: "fan_out_demo".to_string(),
        description: "doubles n indices, then squares each result".to_string(),
        stages: vec![
            StageDefinition {
                number: 1,
                name: "double".to_string(),
                task_type: "double_value".to_string(),
                parallelism: Parallelism::FanOut,
                count: None,
            },
            StageDefinition {
                number: 2,
                name: "square".to_string(),
                task_type: "square_value".to_string(),
                parallelism: Parallelism::FanOut,
                count: None,
            },
        ],
        validate_parameters: Arc::new(validate_parameters),
        generate_job_id: Arc::new(JobBlueprint::default_generate_job_id),
        create_job_record: Arc::new(JobBlueprint::default_create_job_record),
        create_tasks_for_stage: Arc::new(create_tasks_for_stage),
        aggregate_stage: Arc::new(JobBlueprint::default_aggregate),
        build_final_result: Arc::new(JobBlueprint::default_final_result),
    }
}

fn validate_parameters(raw: &serde_json::Value) -> OrchestrationResult<serde_json::Value> {
    let n = raw
        .get("n")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| OrchestrationError::contract_violation("'n' must be a non-negative integer"))?;
    if n == 0 {
        return Err(OrchestrationError::contract_violation("'n' must be >= 1"));
    }
    Ok(json!({ "n": n }))
}

fn create_tasks_for_stage(
    stage: &StageDefinition,
    job_params: &serde_json::Value,
    job_id: &str,
    previous_results: &[serde_json::Value],
) -> OrchestrationResult<Vec<TaskSpec>> {
    match stage.number {
        1 => {
            let n = job_params
                .get("n")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| OrchestrationError::contract_violation("'n' missing at stage 1"))?;
            Ok((0..n)
                .map(|i| TaskSpec {
                    task_id: make_task_id(job_id, 1, &i.to_string()),
                    task_type: "double_value".to_string(),
                    task_index: i.to_string(),
                    parameters: json!({ "index": i }),
                    metadata: terraflow_shared::models::empty_object(),
                })
                .collect())
        }
        2 => Ok(previous_results
            .iter()
            .enumerate()
            .map(|(idx, result)| TaskSpec {
                task_id: make_task_id(job_id, 2, &idx.to_string()),
                task_type: "square_value".to_string(),
                task_index: idx.to_string(),
                parameters: json!({ "value": result.get("value").cloned().unwrap_or(json!(0)) }),
                metadata: terraflow_shared::models::empty_object(),
            })
            .collect()),
        other => Err(OrchestrationError::contract_violation(format!(
            "fan_out_demo has no stage {other}"
        ))),
    }
}
