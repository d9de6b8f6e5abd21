//! Handler Registry data model (§4.4): the `TaskHandler` trait every
//! domain task_type implements.

use async_trait::async_trait;

use crate::models::{TaskContext, TaskResult};

/// `handle(params, context) -> TaskResult` (§4.4).
///
/// Implementations MUST NOT mutate registry/global state, and MUST return
/// failures as `TaskResult::err(..)` rather than panicking or returning
/// `Err` across this boundary — `Err` here is reserved for the narrow case
/// of a genuinely unrecoverable contract violation the caller should treat
/// as `CONTRACT_VIOLATION` (§7).
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(
        &self,
        params: serde_json::Value,
        context: TaskContext,
    ) -> crate::errors::OrchestrationResult<TaskResult>;
}

#[async_trait]
impl<F, Fut> TaskHandler for F
where
    F: Fn(serde_json::Value, TaskContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = crate::errors::OrchestrationResult<TaskResult>> + Send,
{
    async fn handle(
        &self,
        params: serde_json::Value,
        context: TaskContext,
    ) -> crate::errors::OrchestrationResult<TaskResult> {
        (self)(params, context).await
    }
}
