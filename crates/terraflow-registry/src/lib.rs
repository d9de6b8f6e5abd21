//! # Job Registry (C3) + Handler Registry (C4)
//!
//! Explicit, boot-time composed maps — `job_type -> JobBlueprint` and
//! `task_type -> TaskHandler`. No decorators, no import-time side effects
//! (§4.3, §4.4, §9): a binary builds both registries in `main()`/bootstrap
//! code, then hands them to the CoreMachine.

pub mod handler_registry;
pub mod job_registry;

pub use handler_registry::HandlerRegistry;
pub use job_registry::JobRegistry;
