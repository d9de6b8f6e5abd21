//! CoreMachine (§4.5): the two message handlers, `process_job` and
//! `process_task`, plus the stage-completion algorithm they share.
//!
//! The orchestrator is a pure message processor — it holds no state beyond
//! the store/queue connection handles and the two read-only registries
//! (§5: "no shared mutable state between handlers ... other than singleton
//! connection pools and the registries").

use serde_json::json;
use terraflow_queue::{JobQueueMessage, PgmqQueue, TaskQueueMessage};
use terraflow_registry::{HandlerRegistry, JobRegistry};
use terraflow_shared::canonical::{make_task_id, task_id_obeys_invariant};
use terraflow_shared::models::{
    JobStatus, JsonValue, Parallelism, TaskContext, TaskRecord, TaskStatus,
};
use terraflow_shared::{OrchestrationError, OrchestrationResult};
use terraflow_store::{PgStateStore, TerminalPayload};

/// What `process_job` did with the inbound message. The worker loop is the
/// only caller with a `msg_id` to act on, so it decides ack vs. DLQ based on
/// this — mirrors the teacher's two-phase "resolve an action enum, then
/// dispatch on it" shape (see `task_coordinator::CoordinatorAction`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Acknowledged,
    DeadLettered { reason: String },
}

/// CoreMachine (C5): wraps the State Store, Message Bus, and both
/// registries. Cheap to clone — every field is itself a handle around a
/// connection pool or an `Arc`-backed map.
#[derive(Debug, Clone)]
pub struct CoreMachine {
    store: PgStateStore,
    queue: PgmqQueue,
    jobs: JobRegistry,
    handlers: HandlerRegistry,
    jobs_queue_name: String,
    tasks_queue_name: String,
}

impl CoreMachine {
    pub fn new(
        store: PgStateStore,
        queue: PgmqQueue,
        jobs: JobRegistry,
        handlers: HandlerRegistry,
        jobs_queue_name: impl Into<String>,
        tasks_queue_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            queue,
            jobs,
            handlers,
            jobs_queue_name: jobs_queue_name.into(),
            tasks_queue_name: tasks_queue_name.into(),
        }
    }

    pub fn store(&self) -> &PgStateStore {
        &self.store
    }

    pub fn queue(&self) -> &PgmqQueue {
        &self.queue
    }

    pub fn jobs_queue_name(&self) -> &str {
        &self.jobs_queue_name
    }

    pub fn tasks_queue_name(&self) -> &str {
        &self.tasks_queue_name
    }

    /// §4.5.1 `processJob`.
    #[tracing::instrument(skip(self, msg), fields(job_id = %msg.job_id, stage = msg.stage))]
    pub async fn process_job(&self, msg: &JobQueueMessage) -> OrchestrationResult<JobOutcome> {
        // Step 1: load job; unknown -> DLQ with UNKNOWN_JOB.
        let Some(job) = self.store.try_get_job(&msg.job_id).await? else {
            return Ok(JobOutcome::DeadLettered {
                reason: "UNKNOWN_JOB".to_string(),
            });
        };

        // Step 2: terminal job -> idempotent no-op (P6, after-completion
        // redelivery).
        if job.status.is_terminal() {
            return Ok(JobOutcome::Acknowledged);
        }

        // Step 3: resolve blueprint. A job that exists with a `job_type`
        // that isn't registered is a contract violation, not a business
        // error — it can only happen if the registries drifted from what
        // was live when the job was submitted.
        let blueprint = match self.jobs.get(&msg.job_type) {
            Ok(bp) => bp,
            Err(e) => {
                self.fail_job(&msg.job_id, e.to_error_details()).await?;
                return Ok(JobOutcome::Acknowledged);
            }
        };

        let Some(stage_def) = blueprint.stage(msg.stage) else {
            self.fail_job(
                &msg.job_id,
                OrchestrationError::contract_violation(format!(
                    "job_type '{}' has no stage {}",
                    msg.job_type, msg.stage
                ))
                .to_error_details(),
            )
            .await?;
            return Ok(JobOutcome::Acknowledged);
        };

        // Step 4: branch on parallelism, build the TaskSpec list.
        let previous_results = self.completed_results(&msg.job_id, msg.stage - 1).await?;
        let task_specs = match stage_def.parallelism {
            Parallelism::Single | Parallelism::FanOut => {
                match (blueprint.create_tasks_for_stage)(
                    stage_def,
                    &msg.parameters,
                    &msg.job_id,
                    &previous_results,
                ) {
                    Ok(specs) => specs,
                    Err(e) => {
                        self.fail_job(&msg.job_id, e.to_error_details()).await?;
                        return Ok(JobOutcome::Acknowledged);
                    }
                }
            }
            Parallelism::FanIn => {
                let task_id = make_task_id(&msg.job_id, msg.stage, "fanin");
                vec![terraflow_shared::models::TaskSpec {
                    task_id,
                    task_type: stage_def.task_type.clone(),
                    task_index: "fanin".to_string(),
                    parameters: json!({ "previous_results": previous_results }),
                    metadata: terraflow_shared::models::empty_object(),
                }]
            }
        };

        if let Err(reason) = self.validate_task_specs(&msg.job_id, &task_specs) {
            self.fail_job(&msg.job_id, reason).await?;
            return Ok(JobOutcome::Acknowledged);
        }

        // Step 5: persist first, then enqueue. Bulk insert is idempotent on
        // PK, so a repeated processJob for the same (job_id, stage) is safe.
        let records: Vec<TaskRecord> = task_specs
            .iter()
            .map(|spec| {
                TaskRecord::new_queued(
                    spec.task_id.clone(),
                    msg.job_id.clone(),
                    spec.task_type.clone(),
                    msg.stage,
                    spec.task_index.clone(),
                    spec.parameters.clone(),
                    Some(spec.metadata.clone()),
                )
            })
            .collect();
        self.store.bulk_create_tasks(&records).await?;

        let messages: Vec<TaskQueueMessage> = task_specs
            .iter()
            .map(|spec| {
                TaskQueueMessage::new(
                    spec.task_id.clone(),
                    msg.job_id.clone(),
                    spec.task_type.clone(),
                    msg.stage,
                    spec.task_index.clone(),
                    spec.parameters.clone(),
                    None,
                )
                .with_correlation_id(msg.correlation_id)
            })
            .collect();

        if let Err(e) = self.queue.send_batch(&self.tasks_queue_name, &messages).await {
            let task_ids: Vec<String> = records.iter().map(|t| t.task_id.clone()).collect();
            self.store
                .batch_update_statuses(&task_ids, TaskStatus::Failed, Some("ENQUEUE_FAILED"))
                .await?;
            self.fail_job(&msg.job_id, format!("ENQUEUE_FAILED: {e}"))
                .await?;
            return Ok(JobOutcome::Acknowledged);
        }

        // Step 6: QUEUED -> PROCESSING.
        self.store.mark_job_processing_if_queued(&msg.job_id).await?;

        // Step 7: acknowledge (performed by the caller holding `msg_id`).
        Ok(JobOutcome::Acknowledged)
    }

    /// §4.5.2 `processTask`. Every reachable branch ends in "acknowledge" —
    /// the only way this returns `Err` is a genuine store/queue I/O failure,
    /// which the worker loop treats as a business error to leave unacked.
    #[tracing::instrument(skip(self, msg), fields(task_id = %msg.task_id, stage = msg.stage))]
    pub async fn process_task(&self, msg: &TaskQueueMessage) -> OrchestrationResult<()> {
        // Step 1: load task; unknown or already terminal -> acknowledge.
        let Some(task) = self.store.get_task(&msg.task_id).await? else {
            return Ok(());
        };
        if task.status.is_terminal() {
            return Ok(());
        }

        // Step 2: QUEUED -> PROCESSING. Idempotent: a prior delivery may
        // already have made this transition; the completion procedure below
        // is what actually enforces exactly-once stage advancement.
        self.store
            .update_task_status_to_processing(&msg.task_id)
            .await?;

        // Step 3: resolve handler.
        let handler = match self.handlers.get(&msg.task_type) {
            Ok(h) => h,
            Err(e) => {
                let is_last = self
                    .store
                    .complete_task_and_check_stage(
                        &msg.task_id,
                        &msg.parent_job_id,
                        msg.stage,
                        None,
                        Some(&e.to_error_details()),
                        None,
                    )
                    .await?;
                if is_last {
                    self.run_stage_completion(&msg.parent_job_id, msg.stage)
                        .await?;
                }
                return Ok(());
            }
        };

        // Step 4: build TaskContext, eagerly loading the predecessor result
        // (§9 Open Question: core supports `context.loadPredecessor()`,
        // handlers may ignore it). A predecessor that returned a
        // `next_stage_params` override hands that forward instead of its
        // raw `result_data`; otherwise `result_data` is the predecessor
        // result.
        let predecessor_result = if msg.stage > 1 {
            self.store
                .find_predecessor(&msg.parent_job_id, msg.stage, &msg.task_index)
                .await?
                .map(|t| {
                    if t.next_stage_params != terraflow_shared::models::empty_object() {
                        t.next_stage_params
                    } else {
                        t.result_data
                    }
                })
        } else {
            None
        };
        let context = TaskContext {
            task_id: msg.task_id.clone(),
            parent_job_id: msg.parent_job_id.clone(),
            stage: msg.stage,
            task_index: msg.task_index.clone(),
            correlation_id: msg.correlation_id,
            predecessor_result,
        };

        // Step 5: invoke the handler.
        let (result_data, error_details, next_stage_params) =
            match handler.handle(msg.parameters.clone(), context).await {
                Ok(result) if result.success => {
                    (Some(result.result_data), None, result.next_stage_params)
                }
                Ok(result) => (None, Some(result.error_details.unwrap_or_default()), None),
                Err(e) => (None, Some(e.to_error_details()), None),
            };

        let is_last = self
            .store
            .complete_task_and_check_stage(
                &msg.task_id,
                &msg.parent_job_id,
                msg.stage,
                result_data.as_ref(),
                error_details.as_deref(),
                next_stage_params.as_ref(),
            )
            .await?;

        // Step 6: the last sibling runs stage completion.
        if is_last {
            self.run_stage_completion(&msg.parent_job_id, msg.stage)
                .await?;
        }

        // Step 7: acknowledge (performed by the caller).
        Ok(())
    }

    /// §4.5.3 Stage completion. Called only by the single caller that
    /// observed `complete_task_and_check_stage` return `true` (P2).
    async fn run_stage_completion(&self, job_id: &str, stage: i32) -> OrchestrationResult<()> {
        let tasks = self.store.list_tasks_for_job_stage(job_id, stage).await?;

        // Step 1: any FAILED task fails the job outright.
        let failed: Vec<&str> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.task_id.as_str())
            .collect();
        if !failed.is_empty() {
            self.fail_job(
                job_id,
                format!("stage {stage} failed: tasks [{}]", failed.join(", ")),
            )
            .await?;
            return Ok(());
        }

        let job = self.store.get_job(job_id).await?;
        let blueprint = self.jobs.get(&job.job_type)?;
        let stage_def = blueprint.stage(stage).ok_or_else(|| {
            OrchestrationError::contract_violation(format!(
                "job_type '{}' has no stage {stage}",
                job.job_type
            ))
        })?;

        // Step 2: aggregate.
        let results: Vec<JsonValue> = tasks.into_iter().map(|t| t.result_data).collect();
        let aggregated = (blueprint.aggregate_stage)(stage_def, &results);
        let merged_stage_results = merge_stage_result(&job.stage_results, stage, aggregated.clone());

        // Step 3/4: terminal vs. advance.
        if stage >= job.total_stages {
            let final_result = (blueprint.build_final_result)(&merged_stage_results);
            self.store
                .set_job_terminal(job_id, JobStatus::Completed, TerminalPayload::Result(final_result))
                .await?;
        } else {
            let next_stage = stage + 1;
            self.store
                .advance_job_stage(job_id, next_stage, &json!({ stage.to_string(): aggregated }))
                .await?;
            let next_msg = JobQueueMessage::new(
                job_id.to_string(),
                job.job_type.clone(),
                next_stage,
                job.parameters.clone(),
                merged_stage_results,
            );
            self.queue.send(&self.jobs_queue_name, &next_msg).await?;
        }
        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error_details: impl Into<String>) -> OrchestrationResult<()> {
        self.store
            .set_job_terminal(
                job_id,
                JobStatus::Failed,
                TerminalPayload::Error(error_details.into()),
            )
            .await?;
        Ok(())
    }

    /// `result_data` of every COMPLETED task of `stage`, ordered by
    /// `task_id`. Empty for `stage < 1` (i.e. stage 1's "previous_results").
    async fn completed_results(&self, job_id: &str, stage: i32) -> OrchestrationResult<Vec<JsonValue>> {
        if stage < 1 {
            return Ok(Vec::new());
        }
        let tasks = self.store.list_tasks_for_job_stage(job_id, stage).await?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.result_data)
            .collect())
    }

    fn validate_task_specs(
        &self,
        job_id: &str,
        specs: &[terraflow_shared::models::TaskSpec],
    ) -> Result<(), String> {
        for spec in specs {
            if spec.task_id.is_empty() || spec.task_type.is_empty() {
                return Err(format!(
                    "CONTRACT_VIOLATION: task spec for job '{job_id}' missing task_id/task_type"
                ));
            }
            if !task_id_obeys_invariant(&spec.task_id, job_id) {
                return Err(format!(
                    "CONTRACT_VIOLATION: task_id '{}' violates the {{job_id[:8]}}-prefix/charset invariant",
                    spec.task_id
                ));
            }
        }
        Ok(())
    }
}

/// Insert/overwrite `stage_results[stage]` in a job's stage_results map
/// (client-side mirror of what `advance_job_stage`/`set_job_terminal` do
/// server-side, needed here only to feed `build_final_result`/the next
/// `JobQueueMessage.stage_results` without a round-trip).
fn merge_stage_result(existing: &JsonValue, stage: i32, addition: JsonValue) -> JsonValue {
    let mut merged = match existing {
        JsonValue::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    merged.insert(stage.to_string(), addition);
    JsonValue::Object(merged)
}
