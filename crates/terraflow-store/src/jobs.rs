use sqlx::Row;
use terraflow_shared::models::{JobRecord, JobStatus, JsonValue};

use crate::error::{StoreError, StoreResult};
use crate::PgStateStore;

impl PgStateStore {
    /// Insert a new job row. Constraint violations on the PK are
    /// idempotent-safe: inserting a pre-existing `job_id` is a no-op that
    /// returns the existing record (§4.1 failure semantics, P1).
    #[tracing::instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub async fn create_job(&self, job: &JobRecord) -> StoreResult<JobRecord> {
        sqlx::query(
            r#"
            INSERT INTO app.jobs
                (job_id, job_type, status, stage, total_stages, parameters,
                 stage_results, result_data, error_details, metadata,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.job_type)
        .bind(job.status)
        .bind(job.stage)
        .bind(job.total_stages)
        .bind(&job.parameters)
        .bind(&job.stage_results)
        .bind(&job.result_data)
        .bind(&job.error_details)
        .bind(&job.metadata)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        self.get_job(&job.job_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_job(&self, job_id: &str) -> StoreResult<JobRecord> {
        sqlx::query_as::<_, JobRecord>("SELECT * FROM app.jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::job_not_found(job_id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn try_get_job(&self, job_id: &str) -> StoreResult<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRecord>("SELECT * FROM app.jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Set job status to PROCESSING if currently QUEUED (§4.5.1 step 6).
    #[tracing::instrument(skip(self))]
    pub async fn mark_job_processing_if_queued(&self, job_id: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE app.jobs SET status = 'processing', updated_at = now() \
             WHERE job_id = $1 AND status = 'queued'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Calls `app.advance_job_stage` (§4.1.2). Idempotent on repeat calls
    /// with the same `next_stage`.
    #[tracing::instrument(skip(self, stage_results))]
    pub async fn advance_job_stage(
        &self,
        job_id: &str,
        next_stage: i32,
        stage_results: &JsonValue,
    ) -> StoreResult<bool> {
        let row = sqlx::query("SELECT app.advance_job_stage($1, $2, $3) AS advanced")
            .bind(job_id)
            .bind(next_stage)
            .bind(stage_results)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<bool, _>("advanced"))
    }

    /// Calls the read-only `app.check_job_completion` (§4.1.3).
    #[tracing::instrument(skip(self))]
    pub async fn check_job_completion(&self, job_id: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT app.check_job_completion($1) AS complete")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<bool, _>("complete"))
    }

    /// Marks a job terminal (§4.1 `set_job_terminal`). `status` MUST be
    /// `COMPLETED` or `FAILED`; `payload` is `result_data` for COMPLETED or
    /// `error_details` for FAILED.
    #[tracing::instrument(skip(self, payload))]
    pub async fn set_job_terminal(
        &self,
        job_id: &str,
        status: JobStatus,
        payload: TerminalPayload,
    ) -> StoreResult<()> {
        match (status, payload) {
            (JobStatus::Completed, TerminalPayload::Result(result_data)) => {
                sqlx::query(
                    "UPDATE app.jobs SET status = 'completed', result_data = $2, updated_at = now() \
                     WHERE job_id = $1 AND status NOT IN ('completed', 'failed')",
                )
                .bind(job_id)
                .bind(result_data)
                .execute(&self.pool)
                .await?;
            }
            (JobStatus::Failed, TerminalPayload::Error(error_details)) => {
                sqlx::query(
                    "UPDATE app.jobs SET status = 'failed', error_details = $2, updated_at = now() \
                     WHERE job_id = $1 AND status NOT IN ('completed', 'failed')",
                )
                .bind(job_id)
                .bind(error_details)
                .execute(&self.pool)
                .await?;
            }
            _ => {
                return Err(StoreError::InvalidTransition {
                    entity: "job",
                    id: job_id.to_string(),
                    from: "?".to_string(),
                    to: format!("{status} with mismatched payload"),
                })
            }
        }
        Ok(())
    }
}

/// Payload accompanying `set_job_terminal`.
pub enum TerminalPayload {
    Result(JsonValue),
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn create_job_is_idempotent_on_existing_pk(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let store = PgStateStore::new(pool);
        let job = JobRecord::new_queued(
            "a".repeat(64),
            "hello_world".into(),
            1,
            json!({"message": "hi"}),
            None,
        );

        let first = store.create_job(&job).await.unwrap();
        let second = store.create_job(&job).await.unwrap();

        assert_eq!(first.job_id, second.job_id);
        assert_eq!(first.created_at, second.created_at);
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn advance_job_stage_is_idempotent(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let store = PgStateStore::new(pool);
        let job = JobRecord::new_queued("b".repeat(64), "x".into(), 3, json!({}), None);
        store.create_job(&job).await.unwrap();

        let first = store
            .advance_job_stage(&job.job_id, 2, &json!({"stage": {"tasks": []}}))
            .await
            .unwrap();
        let second = store
            .advance_job_stage(&job.job_id, 2, &json!({"stage": {"tasks": []}}))
            .await
            .unwrap();

        assert!(first);
        assert!(second);

        let reloaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(reloaded.stage, 2);
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn check_job_completion_reflects_stage_vs_total(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let store = PgStateStore::new(pool);
        let job = JobRecord::new_queued("c".repeat(64), "x".into(), 1, json!({}), None);
        store.create_job(&job).await.unwrap();

        assert!(store.check_job_completion(&job.job_id).await.unwrap());
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn set_job_terminal_completed_requires_result_payload(
        pool: sqlx::PgPool,
    ) -> sqlx::Result<()> {
        let store = PgStateStore::new(pool);
        let job = JobRecord::new_queued("d".repeat(64), "x".into(), 1, json!({}), None);
        store.create_job(&job).await.unwrap();

        store
            .set_job_terminal(
                &job.job_id,
                JobStatus::Completed,
                TerminalPayload::Result(json!({"ok": true})),
            )
            .await
            .unwrap();

        let reloaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Completed);
        assert!(reloaded.satisfies_terminal_integrity());
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn set_job_terminal_is_a_no_op_on_already_terminal_job(
        pool: sqlx::PgPool,
    ) -> sqlx::Result<()> {
        let store = PgStateStore::new(pool);
        let job = JobRecord::new_queued("e".repeat(64), "x".into(), 1, json!({}), None);
        store.create_job(&job).await.unwrap();

        store
            .set_job_terminal(
                &job.job_id,
                JobStatus::Completed,
                TerminalPayload::Result(json!({"first": true})),
            )
            .await
            .unwrap();
        store
            .set_job_terminal(
                &job.job_id,
                JobStatus::Failed,
                TerminalPayload::Error("should not apply".into()),
            )
            .await
            .unwrap();

        let reloaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Completed);
        assert_eq!(reloaded.result_data, json!({"first": true}));
        Ok(())
    }
}
