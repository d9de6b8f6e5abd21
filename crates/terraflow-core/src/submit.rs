//! Submission/status API (§6.2, collaborator surface). An HTTP layer calls
//! `JobSubmitter::submit` then polls `JobSubmitter::status`; no other
//! CoreMachine surface is exposed to HTTP.
//!
//! The five blueprint functions named in §6.2 are `validate_parameters →
//! generate_job_id → create_job_record → enqueue_job → {200, job_id}`.
//! `enqueue_job` has no natural home as a blueprint closure field — it needs
//! a live store/queue handle a boot-time blueprint definition doesn't have —
//! so it's implemented here as the last step of `submit` instead (recorded
//! in the grounding ledger).

use terraflow_queue::{JobQueueMessage, PgmqQueue};
use terraflow_registry::JobRegistry;
use terraflow_shared::models::JsonValue;
use terraflow_shared::OrchestrationResult;
use terraflow_store::PgStateStore;

/// Outcome of a successful `submit` call: `{200, job_id}` per §6.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub job_id: String,
}

#[derive(Debug, Clone)]
pub struct JobSubmitter {
    store: PgStateStore,
    queue: PgmqQueue,
    jobs: JobRegistry,
    jobs_queue_name: String,
}

impl JobSubmitter {
    pub fn new(
        store: PgStateStore,
        queue: PgmqQueue,
        jobs: JobRegistry,
        jobs_queue_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            queue,
            jobs,
            jobs_queue_name: jobs_queue_name.into(),
        }
    }

    /// `validate_parameters → generate_job_id → create_job_record →
    /// enqueue_job → {200, job_id}` (§6.2). Idempotent per P1: two calls
    /// with parameters that canonicalize identically return the same
    /// `job_id` and leave exactly one job row.
    #[tracing::instrument(skip(self, raw_parameters), fields(job_type))]
    pub async fn submit(
        &self,
        job_type: &str,
        raw_parameters: JsonValue,
    ) -> OrchestrationResult<SubmitOutcome> {
        let blueprint = self.jobs.get(job_type)?;

        let normalized = (blueprint.validate_parameters)(&raw_parameters)?;
        let job_id = (blueprint.generate_job_id)(job_type, &normalized);
        let job_record =
            (blueprint.create_job_record)(&job_id, job_type, blueprint.total_stages(), &normalized);

        let persisted = self.store.create_job(&job_record).await?;

        let job_msg = JobQueueMessage::new(
            persisted.job_id.clone(),
            persisted.job_type.clone(),
            persisted.stage,
            persisted.parameters.clone(),
            persisted.stage_results.clone(),
        );
        self.queue.send(&self.jobs_queue_name, &job_msg).await?;

        Ok(SubmitOutcome {
            job_id: persisted.job_id,
        })
    }

    /// Status lookup: reads the JobRecord directly (§6.2).
    pub async fn status(&self, job_id: &str) -> OrchestrationResult<terraflow_shared::models::JobRecord> {
        Ok(self.store.get_job(job_id).await?)
    }
}
