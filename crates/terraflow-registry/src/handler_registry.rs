//! Handler Registry (C4): explicit, boot-time composed map of `task_type`
//! to `TaskHandler`.

use std::collections::HashMap;
use std::sync::Arc;

use terraflow_shared::handler::TaskHandler;
use terraflow_shared::{OrchestrationError, OrchestrationResult};

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    /// Convenience for registering a plain async closure as a handler,
    /// matching `TaskHandler`'s blanket `Fn` impl.
    pub fn register_fn<F, Fut>(&mut self, task_type: impl Into<String>, handler: F)
    where
        F: Fn(serde_json::Value, terraflow_shared::models::TaskContext) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: std::future::Future<Output = OrchestrationResult<terraflow_shared::models::TaskResult>>
            + Send
            + 'static,
    {
        self.register(task_type, Arc::new(handler));
    }

    pub fn get(&self, task_type: &str) -> OrchestrationResult<Arc<dyn TaskHandler>> {
        self.handlers
            .get(task_type)
            .cloned()
            .ok_or_else(|| OrchestrationError::handler_not_registered(task_type))
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    pub fn task_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use terraflow_shared::models::TaskResult;
    use uuid::Uuid;

    fn context() -> terraflow_shared::models::TaskContext {
        terraflow_shared::models::TaskContext {
            task_id: "task-1".into(),
            parent_job_id: "a".repeat(64),
            stage: 1,
            task_index: "0".into(),
            correlation_id: Uuid::new_v4(),
            predecessor_result: None,
        }
    }

    #[tokio::test]
    async fn register_fn_and_invoke() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("greet", |params, _ctx| async move {
            Ok(TaskResult::ok(json!({"greeted": params["name"]})))
        });

        let handler = registry.get("greet").unwrap();
        let result = handler
            .handle(json!({"name": "world"}), context())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.result_data["greeted"], "world");
    }

    #[test]
    fn get_unknown_task_type_errors() {
        let registry = HandlerRegistry::new();
        let err = match registry.get("missing") {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, OrchestrationError::HandlerNotRegistered { .. }));
    }

    #[test]
    fn task_types_lists_registered_handlers() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("a", |_p, _c| async { Ok(TaskResult::ok(json!({}))) });
        registry.register_fn("b", |_p, _c| async { Ok(TaskResult::ok(json!({}))) });
        let mut types = registry.task_types();
        types.sort();
        assert_eq!(types, vec!["a", "b"]);
    }
}
