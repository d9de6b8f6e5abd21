use sqlx::Row;
use terraflow_shared::models::{JsonValue, TaskRecord, TaskStatus};

use crate::error::StoreResult;
use crate::PgStateStore;

impl PgStateStore {
    /// Bulk-insert tasks, idempotent on PK (§4.5.1 step 5: "the subsequent
    /// bulk insert is idempotent on PK so repeated processJob for the same
    /// (job_id, stage) is safe").
    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub async fn bulk_create_tasks(&self, tasks: &[TaskRecord]) -> StoreResult<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for task in tasks {
            sqlx::query(
                r#"
                INSERT INTO app.tasks
                    (task_id, parent_job_id, task_type, status, stage, task_index,
                     parameters, result_data, next_stage_params, metadata,
                     error_details, retry_count, heartbeat, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (task_id) DO NOTHING
                "#,
            )
            .bind(&task.task_id)
            .bind(&task.parent_job_id)
            .bind(&task.task_type)
            .bind(task.status)
            .bind(task.stage)
            .bind(&task.task_index)
            .bind(&task.parameters)
            .bind(&task.result_data)
            .bind(&task.next_stage_params)
            .bind(&task.metadata)
            .bind(&task.error_details)
            .bind(task.retry_count)
            .bind(task.heartbeat)
            .bind(task.created_at)
            .bind(task.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_task(&self, task_id: &str) -> StoreResult<Option<TaskRecord>> {
        let row = sqlx::query_as::<_, TaskRecord>("SELECT * FROM app.tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_tasks_for_job_stage(
        &self,
        job_id: &str,
        stage: i32,
    ) -> StoreResult<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRecord>(
            "SELECT * FROM app.tasks WHERE parent_job_id = $1 AND stage = $2 ORDER BY task_id",
        )
        .bind(job_id)
        .bind(stage)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Find the predecessor task for `context.loadPredecessor()` (§9 Open
    /// Question): same semantic index, `stage - 1`.
    #[tracing::instrument(skip(self))]
    pub async fn find_predecessor(
        &self,
        job_id: &str,
        stage: i32,
        task_index: &str,
    ) -> StoreResult<Option<TaskRecord>> {
        let row = sqlx::query_as::<_, TaskRecord>(
            "SELECT * FROM app.tasks \
             WHERE parent_job_id = $1 AND stage = $2 AND task_index = $3",
        )
        .bind(job_id)
        .bind(stage - 1)
        .bind(task_index)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// QUEUED -> PROCESSING transition (§4.5.2 step 2). Validated: only
    /// applies if the task is currently QUEUED; returns `true` if it
    /// actually transitioned this call (idempotent on repeat delivery).
    #[tracing::instrument(skip(self))]
    pub async fn update_task_status_to_processing(&self, task_id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE app.tasks SET status = 'processing', updated_at = now() \
             WHERE task_id = $1 AND status = 'queued'",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a batch of tasks FAILED with the same `error_details`, used for
    /// the partial-enqueue-failure path (§4.5.1 step 5: "mark newly-created
    /// tasks FAILED with ENQUEUE_FAILED").
    #[tracing::instrument(skip(self, task_ids))]
    pub async fn batch_update_statuses(
        &self,
        task_ids: &[String],
        status: TaskStatus,
        error_details: Option<&str>,
    ) -> StoreResult<()> {
        if task_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE app.tasks SET status = $2, error_details = $3, updated_at = now() \
             WHERE task_id = ANY($1)",
        )
        .bind(task_ids)
        .bind(status)
        .bind(error_details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Calls `app.complete_task_and_check_stage` (§4.1.1). Returns `true`
    /// iff this call observed the last sibling task of the stage going
    /// terminal (P2: exactly one caller across all concurrent completions).
    /// `next_stage_params`, when a handler supplies one, is persisted onto
    /// the task row alongside `result_data`.
    #[tracing::instrument(skip(self, result_data, error_details, next_stage_params))]
    pub async fn complete_task_and_check_stage(
        &self,
        task_id: &str,
        job_id: &str,
        stage: i32,
        result_data: Option<&JsonValue>,
        error_details: Option<&str>,
        next_stage_params: Option<&JsonValue>,
    ) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT app.complete_task_and_check_stage($1, $2, $3, $4, $5, $6) AS is_last",
        )
        .bind(task_id)
        .bind(job_id)
        .bind(stage)
        .bind(result_data)
        .bind(error_details)
        .bind(next_stage_params)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<bool, _>("is_last"))
    }
}
