//! Job Registry data model (§3.1, §4.3): `JobBlueprint`, `StageDefinition`,
//! `TaskSpec`, and the `Parallelism` sum type.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::OrchestrationResult;

use super::{empty_object, JobRecord, JsonValue};

/// How a stage's task count is determined (§3.1, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parallelism {
    /// Exactly one task.
    Single,
    /// Task count determined by the blueprint's `create_tasks_for_stage`,
    /// typically from the previous stage's results.
    FanOut,
    /// Exactly one orchestrator-generated aggregation task; the blueprint
    /// does not author it.
    FanIn,
}

/// One entry in a `JobBlueprint`'s stage list (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    /// 1-based, contiguous across the blueprint's `stages`.
    pub number: i32,
    pub name: String,
    /// Key into the Handler Registry. Ignored for `fan_in` stages where the
    /// orchestrator supplies the handler task_type directly (it is still
    /// required here since fan-in also dispatches through the same
    /// Handler Registry by this task_type).
    pub task_type: String,
    pub parallelism: Parallelism,
    /// Only meaningful for `single`/informational use; fan-out counts come
    /// from `create_tasks_for_stage`'s actual output length.
    pub count: Option<i32>,
}

/// Output of `create_tasks_for_stage`. Required keys per §3.1: `task_id`,
/// `task_type`, `parameters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub task_type: String,
    pub task_index: String,
    pub parameters: JsonValue,
    #[serde(default = "empty_object")]
    pub metadata: JsonValue,
}

/// Pure function type: `(stage, job_params, job_id, previous_results) -> Vec<TaskSpec>`.
///
/// MUST be pure and MUST produce stable IDs — two calls with identical
/// inputs produce identical `TaskSpec` lists in identical order (§4.3).
pub type TaskGenerator = Arc<
    dyn Fn(&StageDefinition, &JsonValue, &str, &[JsonValue]) -> OrchestrationResult<Vec<TaskSpec>>
        + Send
        + Sync,
>;

/// Pure function type: validates a raw parameter map before job creation.
pub type ParameterValidator =
    Arc<dyn Fn(&JsonValue) -> OrchestrationResult<JsonValue> + Send + Sync>;

/// Pure function type: `(job_type, normalized_params) -> job_id`. Defaults
/// to the canonical SHA-256 scheme (§3.1, invariant 1, P1); a blueprint only
/// needs to override this if a `job_type` has its own idempotency key shape.
pub type JobIdGenerator = Arc<dyn Fn(&str, &JsonValue) -> String + Send + Sync>;

/// Pure function type: `(job_id, job_type, total_stages, normalized_params) -> JobRecord`.
/// Defaults to `JobRecord::new_queued` with no extra metadata.
pub type JobRecordBuilder = Arc<dyn Fn(&str, &str, i32, &JsonValue) -> JobRecord + Send + Sync>;

/// Pure function type: aggregates a completed stage's task `result_data`
/// list into the stage's contribution to `job.stage_results`. Defaults to
/// `{tasks: [result_data, ...]}` per §4.5.3 when a blueprint does not
/// override it.
pub type StageAggregator =
    Arc<dyn Fn(&StageDefinition, &[JsonValue]) -> JsonValue + Send + Sync>;

/// Pure function type: computes the job's final `result_data` from the
/// fully-populated `stage_results` map. Defaults to "echo stage_results".
pub type FinalResultBuilder = Arc<dyn Fn(&JsonValue) -> JsonValue + Send + Sync>;

/// Declarative description of a `job_type` (§3.1, §4.3): the stage list
/// plus the pure functions that generate tasks and aggregate results.
#[derive(Clone)]
pub struct JobBlueprint {
    pub job_type: String,
    pub description: String,
    pub stages: Vec<StageDefinition>,
    pub validate_parameters: ParameterValidator,
    pub generate_job_id: JobIdGenerator,
    pub create_job_record: JobRecordBuilder,
    pub create_tasks_for_stage: TaskGenerator,
    pub aggregate_stage: StageAggregator,
    pub build_final_result: FinalResultBuilder,
}

impl std::fmt::Debug for JobBlueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobBlueprint")
            .field("job_type", &self.job_type)
            .field("description", &self.description)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl JobBlueprint {
    pub fn total_stages(&self) -> i32 {
        self.stages.len() as i32
    }

    pub fn stage(&self, number: i32) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.number == number)
    }

    /// Validates the invariants §4.3 requires of a registered blueprint:
    /// non-empty, 1..N contiguous stage numbers.
    pub fn validate_registration(&self) -> OrchestrationResult<()> {
        use crate::errors::OrchestrationError;

        if self.stages.is_empty() {
            return Err(OrchestrationError::config_error(format!(
                "blueprint '{}' has no stages",
                self.job_type
            )));
        }
        for (idx, stage) in self.stages.iter().enumerate() {
            let expected = (idx + 1) as i32;
            if stage.number != expected {
                return Err(OrchestrationError::config_error(format!(
                    "blueprint '{}' stage numbers must be 1..N contiguous; expected {} got {} at position {}",
                    self.job_type, expected, stage.number, idx
                )));
            }
        }
        Ok(())
    }

    /// Default aggregation per §4.5.3: `{tasks: [result_data, ...]}`.
    pub fn default_aggregate(_stage: &StageDefinition, results: &[JsonValue]) -> JsonValue {
        serde_json::json!({ "tasks": results })
    }

    /// Default final result per §4.5.3/§8.3: nest the full `stage_results`
    /// map under a `stage_results` key, so callers index
    /// `result_data.stage_results["<stage>"].tasks[..]` rather than the
    /// stage-keyed map directly.
    pub fn default_final_result(stage_results: &JsonValue) -> JsonValue {
        serde_json::json!({ "stage_results": stage_results })
    }

    /// Default `generate_job_id` (§3.1): the canonical SHA-256 idempotency
    /// key, folding `job_type` into the hash.
    pub fn default_generate_job_id(job_type: &str, parameters: &JsonValue) -> String {
        crate::canonical::generate_job_id(job_type, parameters)
    }

    /// Default `create_job_record` (§3.1): a fresh QUEUED row with no extra
    /// metadata, via [`JobRecord::new_queued`].
    pub fn default_create_job_record(
        job_id: &str,
        job_type: &str,
        total_stages: i32,
        parameters: &JsonValue,
    ) -> JobRecord {
        JobRecord::new_queued(
            job_id.to_string(),
            job_type.to_string(),
            total_stages,
            parameters.clone(),
            None,
        )
    }
}
