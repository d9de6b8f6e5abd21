pub mod blueprint;
pub mod job;
pub mod task;

pub use blueprint::{JobBlueprint, Parallelism, StageDefinition, TaskSpec};
pub use job::{JobRecord, JobStatus};
pub use task::{TaskContext, TaskRecord, TaskResult, TaskStatus};

/// The one JSON value type used for every heterogeneous column on the wire
/// and in the store: `parameters`, `result_data`, `stage_results`, `metadata`.
pub type JsonValue = serde_json::Value;

/// `{}` — the value every JSON column defaults to; never `null` (invariant 6).
pub fn empty_object() -> JsonValue {
    JsonValue::Object(serde_json::Map::new())
}
