//! # Message Bus (C2)
//!
//! Durable, at-least-once delivery of `JobQueueMessage`/`TaskQueueMessage`
//! over two PGMQ-backed queues (`jobs`, `tasks`). The bus performs no
//! content-aware retries (`max_delivery_count = 1`, §4.2) — it is purely a
//! durable handoff; all orchestration semantics live in the CoreMachine.

mod client;
pub mod error;
pub mod messages;

pub use client::{PgmqQueue, QueueStats, QueuedMessage};
pub use error::{QueueError, QueueResult};
pub use messages::{JobQueueMessage, TaskQueueMessage};

/// Embedded migrations for the `pgmq` extension bootstrap and the
/// `app.dead_letters` table.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
