//! `diamond_demo`: four-stage diamond with a fan-in stage (§8.3 seed
//! scenario 3). Stage 1 normalizes a raw number; stage 2 fans out into 5
//! independent classifications; stage 3 is `fan_in` — the orchestrator,
//! not this blueprint, generates its single aggregation task; stage 4
//! closes the job with a summary.

use std::sync::Arc;

use serde_json::json;
use terraflow_shared::canonical::make_task_id;
use terraflow_shared::models::{JobBlueprint, Parallelism, StageDefinition, TaskSpec};
use terraflow_shared::{OrchestrationError, OrchestrationResult};

const FAN_OUT_COUNT: u64 = 5;

pub fn blueprint() -> JobBlueprint {
    JobBlueprint {
        job_type: "diamond_demo".to_string(),
        description: "normalize -> classify x5 -> fan-in aggregate -> finalize".to_string(),
        stages: vec![
            StageDefinition {
                number: 1,
                name: "normalize".to_string(),
                task_type: "normalize".to_string(),
                parallelism: Parallelism::Single,
                count: Some(1),
            },
            StageDefinition {
                number: 2,
                name: "classify".to_string(),
                task_type: "classify".to_string(),
                parallelism: Parallelism::FanOut,
                count: Some(FAN_OUT_COUNT as i32),
            },
            StageDefinition {
                number: 3,
                name: "aggregate".to_string(),
                task_type: "aggregate_results".to_string(),
                parallelism: Parallelism::FanIn,
                count: Some(1),
            },
            StageDefinition {
                number: 4,
                name: "finalize".to_string(),
                task_type: "finalize".to_string(),
                parallelism: Parallelism::Single,
                count: Some(1),
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
        .and_then(|v| v.as_f64())
        .ok_or_else(|| OrchestrationError::contract_violation("'n' must be a number"))?;
    Ok(json!({ "n": n }))
}

fn create_tasks_for_stage(
    stage: &StageDefinition,
    job_params: &serde_json::Value,
    job_id: &str,
    previous_results: &[serde_json::Value],
) -> OrchestrationResult<Vec<TaskSpec>> {
    match stage.number {
        1 => Ok(vec![TaskSpec {
            task_id: make_task_id(job_id, 1, "0"),
            task_type: "normalize".to_string(),
            task_index: "0".to_string(),
            parameters: job_params.clone(),
            metadata: terraflow_shared::models::empty_object(),
        }]),
        2 => {
            let base = previous_results
                .first()
                .and_then(|r| r.get("normalized"))
                .cloned()
                .unwrap_or(json!(0.0));
            Ok((0..FAN_OUT_COUNT)
                .map(|i| TaskSpec {
                    task_id: make_task_id(job_id, 2, &i.to_string()),
                    task_type: "classify".to_string(),
                    task_index: i.to_string(),
                    parameters: json!({ "index": i, "base": base }),
                    metadata: terraflow_shared::models::empty_object(),
                })
                .collect())
        }
        4 => {
            let aggregate = previous_results.first().cloned().unwrap_or(json!({}));
            Ok(vec![TaskSpec {
                task_id: make_task_id(job_id, 4, "0"),
                task_type: "finalize".to_string(),
                task_index: "0".to_string(),
                parameters: json!({ "aggregate": aggregate }),
                metadata: terraflow_shared::models::empty_object(),
            }])
        }
        other => Err(OrchestrationError::contract_violation(format!(
            "diamond_demo stage {other} is orchestrator-generated or does not exist"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_two_fans_out_to_five_tasks_from_a_single_predecessor() {
        let job_id = "d".repeat(64);
        let bp = blueprint();
        let previous = vec![json!({"normalized": 0.5})];
        let specs = create_tasks_for_stage(&bp.stages[1], &json!({"n": 5.0}), &job_id, &previous).unwrap();
        assert_eq!(specs.len(), 5);
        assert_eq!(specs[0].parameters["base"], json!(0.5));
    }

    #[test]
    fn stage_three_is_never_generated_by_the_blueprint() {
        let job_id = "e".repeat(64);
        let bp = blueprint();
        let result = create_tasks_for_stage(&bp.stages[2], &json!({}), &job_id, &[]);
        assert!(result.is_err());
    }

    #[test]
    fn blueprint_registers_with_contiguous_stages() {
        assert!(blueprint().validate_registration().is_ok());
    }
}
