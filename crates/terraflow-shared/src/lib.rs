//! Cross-cutting types shared by every orchestration core crate: the data
//! model, error taxonomy, configuration, logging bootstrap, and the
//! resilience primitives the worker loop wraps around the store/queue.

pub mod canonical;
pub mod config;
pub mod errors;
pub mod handler;
pub mod logging;
pub mod models;
pub mod resilience;

pub use errors::{OrchestrationError, OrchestrationResult};
pub use models::JsonValue;
