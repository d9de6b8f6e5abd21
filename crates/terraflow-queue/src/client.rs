//! PGMQ-backed message bus client.
//!
//! Talks to the `pgmq` Postgres extension via raw SQL rather than a
//! higher-level Rust client, the same way the teacher's
//! `PgmqMessagingService` wraps `tasker_pgmq::PgmqClient` — here the schema
//! functions (`pgmq.create`, `pgmq.send`, `pgmq.read`, `pgmq.archive`,
//! `pgmq.delete`, `pgmq.set_vt`, `pgmq.metrics`) are the contract directly.

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::{QueueError, QueueResult};

/// A message read off a PGMQ queue, not yet acknowledged.
#[derive(Debug, Clone)]
pub struct QueuedMessage<T> {
    pub message: T,
    pub msg_id: i64,
    pub read_count: i32,
}

/// Point-in-time queue depth/age, used for health reporting (§9, grounded
/// on the teacher's `MessagingService::queue_stats`).
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStats {
    pub queue_name: String,
    pub message_count: u64,
    pub oldest_message_age_seconds: Option<i64>,
}

/// Thin wrapper over a Postgres pool plus the PGMQ schema.
#[derive(Debug, Clone)]
pub struct PgmqQueue {
    pool: PgPool,
}

impl PgmqQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Idempotent: `pgmq.create` is safe to call against an existing queue.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_queue(&self, queue_name: &str) -> QueueResult<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, message))]
    pub async fn send<T: Serialize>(&self, queue_name: &str, message: &T) -> QueueResult<i64> {
        let payload = serde_json::to_value(message)?;
        let row = sqlx::query("SELECT * FROM pgmq.send($1, $2)")
            .bind(queue_name)
            .bind(payload)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    #[tracing::instrument(skip(self, messages), fields(count = messages.len()))]
    pub async fn send_batch<T: Serialize>(
        &self,
        queue_name: &str,
        messages: &[T],
    ) -> QueueResult<Vec<i64>> {
        let mut ids = Vec::with_capacity(messages.len());
        for message in messages {
            ids.push(self.send(queue_name, message).await?);
        }
        Ok(ids)
    }

    /// Reads up to `limit` messages, holding them invisible for
    /// `visibility_timeout`. Any message already redelivered beyond
    /// `max_delivery_count` is diverted to `app.dead_letters` and excluded
    /// from the returned batch (§4.2 retry/DLQ semantics).
    #[tracing::instrument(skip(self))]
    pub async fn read<T: DeserializeOwned>(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
        limit: i32,
        max_delivery_count: i32,
    ) -> QueueResult<Vec<QueuedMessage<T>>> {
        let vt_seconds = visibility_timeout.as_secs() as i32;
        let rows = sqlx::query("SELECT * FROM pgmq.read($1, $2, $3)")
            .bind(queue_name)
            .bind(vt_seconds)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let msg_id: i64 = row.try_get("msg_id")?;
            let read_count: i32 = row.try_get("read_ct")?;
            let payload: serde_json::Value = row.try_get("message")?;

            if read_count > max_delivery_count {
                self.dead_letter(queue_name, msg_id, &payload, read_count, "max_delivery_count_exceeded")
                    .await?;
                continue;
            }

            let message: T = serde_json::from_value(payload)?;
            result.push(QueuedMessage {
                message,
                msg_id,
                read_count,
            });
        }
        Ok(result)
    }

    /// Move a message to `app.dead_letters` and archive it off the live
    /// queue. Used internally by [`Self::read`] for redeliveries past
    /// `max_delivery_count`, and by callers (e.g. `processJob`'s `UNKNOWN_JOB`
    /// path, §4.5.1 step 1) who need to dead-letter a message for a reason
    /// the bus itself can't detect.
    #[tracing::instrument(skip(self, payload))]
    pub async fn dead_letter(
        &self,
        queue_name: &str,
        msg_id: i64,
        payload: &serde_json::Value,
        read_count: i32,
        reason: &str,
    ) -> QueueResult<()> {
        tracing::warn!(queue = queue_name, msg_id, read_count, reason, "moving message to DLQ");
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO app.dead_letters (queue_name, msg_id, message, read_count, reason) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(queue_name)
        .bind(msg_id)
        .bind(payload)
        .bind(read_count)
        .bind(reason)
        .execute(&mut *tx)
        .await?;
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Acknowledge (archive) a processed message.
    #[tracing::instrument(skip(self))]
    pub async fn ack(&self, queue_name: &str, msg_id: i64) -> QueueResult<bool> {
        let row = sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<bool, _>(0)?)
    }

    /// Negative-acknowledge. `requeue = true` makes the message immediately
    /// visible again (`set_vt` to 0); `requeue = false` deletes it outright.
    #[tracing::instrument(skip(self))]
    pub async fn nack(&self, queue_name: &str, msg_id: i64, requeue: bool) -> QueueResult<()> {
        if requeue {
            sqlx::query("SELECT pgmq.set_vt($1, $2, 0)")
                .bind(queue_name)
                .bind(msg_id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("SELECT pgmq.delete($1, $2)")
                .bind(queue_name)
                .bind(msg_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Extend the visibility timeout for an in-flight message (auto-renew,
    /// §4.2's `R` bound).
    #[tracing::instrument(skip(self))]
    pub async fn extend_visibility(
        &self,
        queue_name: &str,
        msg_id: i64,
        extension: Duration,
    ) -> QueueResult<()> {
        sqlx::query("SELECT pgmq.set_vt($1, $2, $3)")
            .bind(queue_name)
            .bind(msg_id)
            .bind(extension.as_secs() as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn queue_stats(&self, queue_name: &str) -> QueueResult<QueueStats> {
        let row: PgRow = sqlx::query("SELECT * FROM pgmq.metrics($1)")
            .bind(queue_name)
            .fetch_one(&self.pool)
            .await?;
        let message_count: i64 = row.try_get("queue_length")?;
        let oldest_message_age_seconds: Option<i64> = row.try_get("oldest_msg_age_sec").ok();
        Ok(QueueStats {
            queue_name: queue_name.to_string(),
            message_count: message_count.max(0) as u64,
            oldest_message_age_seconds,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn health_check(&self) -> QueueResult<bool> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::JobQueueMessage;
    use serde_json::json;

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn send_and_read_round_trips_a_job_message(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let queue = PgmqQueue::new(pool);
        queue.ensure_queue("test_jobs").await.unwrap();

        let msg = JobQueueMessage::new("a".repeat(64), "hello_world", 1, json!({}), json!({}));
        queue.send("test_jobs", &msg).await.unwrap();

        let received: Vec<QueuedMessage<JobQueueMessage>> = queue
            .read("test_jobs", Duration::from_secs(30), 10, 1)
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message.job_id, msg.job_id);
        assert_eq!(received[0].read_count, 1);
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn ack_removes_message_from_queue(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let queue = PgmqQueue::new(pool);
        queue.ensure_queue("test_ack").await.unwrap();
        let msg = JobQueueMessage::new("b".repeat(64), "hello_world", 1, json!({}), json!({}));
        queue.send("test_ack", &msg).await.unwrap();

        let received: Vec<QueuedMessage<JobQueueMessage>> = queue
            .read("test_ack", Duration::from_secs(30), 10, 1)
            .await
            .unwrap();
        assert!(queue.ack("test_ack", received[0].msg_id).await.unwrap());

        let after: Vec<QueuedMessage<JobQueueMessage>> = queue
            .read("test_ack", Duration::from_secs(30), 10, 1)
            .await
            .unwrap();
        assert!(after.is_empty());
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn nack_with_requeue_makes_message_immediately_visible(
        pool: sqlx::PgPool,
    ) -> sqlx::Result<()> {
        let queue = PgmqQueue::new(pool);
        queue.ensure_queue("test_nack").await.unwrap();
        let msg = JobQueueMessage::new("c".repeat(64), "hello_world", 1, json!({}), json!({}));
        queue.send("test_nack", &msg).await.unwrap();

        let first: Vec<QueuedMessage<JobQueueMessage>> = queue
            .read("test_nack", Duration::from_secs(60), 10, 2)
            .await
            .unwrap();
        queue.nack("test_nack", first[0].msg_id, true).await.unwrap();

        let second: Vec<QueuedMessage<JobQueueMessage>> = queue
            .read("test_nack", Duration::from_secs(30), 10, 2)
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].read_count, 2);
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn redelivery_past_max_delivery_count_is_dead_lettered(
        pool: sqlx::PgPool,
    ) -> sqlx::Result<()> {
        let queue = PgmqQueue::new(pool);
        queue.ensure_queue("test_dlq").await.unwrap();
        let msg = JobQueueMessage::new("d".repeat(64), "hello_world", 1, json!({}), json!({}));
        queue.send("test_dlq", &msg).await.unwrap();

        // First delivery: within max_delivery_count=1, returned normally.
        let first: Vec<QueuedMessage<JobQueueMessage>> = queue
            .read("test_dlq", Duration::from_secs(0), 10, 1)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // Visibility already elapsed (vt=0 above): second read sees read_ct=2,
        // which exceeds max_delivery_count=1, so it's dead-lettered instead
        // of returned.
        let second: Vec<QueuedMessage<JobQueueMessage>> = queue
            .read("test_dlq", Duration::from_secs(30), 10, 1)
            .await
            .unwrap();
        assert!(second.is_empty());

        let dlq_count: i64 = sqlx::query("SELECT count(*) FROM app.dead_letters WHERE queue_name = $1")
            .bind("test_dlq")
            .fetch_one(queue.pool())
            .await?
            .try_get(0)?;
        assert_eq!(dlq_count, 1);
        Ok(())
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn queue_stats_reports_message_count(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let queue = PgmqQueue::new(pool);
        queue.ensure_queue("test_stats").await.unwrap();
        for i in 0..3 {
            let msg = JobQueueMessage::new(format!("{i:0>64}"), "hello_world", 1, json!({}), json!({}));
            queue.send("test_stats", &msg).await.unwrap();
        }
        let stats = queue.queue_stats("test_stats").await.unwrap();
        assert_eq!(stats.message_count, 3);
        Ok(())
    }
}
