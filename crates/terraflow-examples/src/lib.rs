//! # Illustrative job blueprints and task handlers
//!
//! Three small `job_type`s that exercise every branch of the orchestration
//! core: a single-stage single-task job (`hello_world`), a two-stage
//! fan-out pipeline (`fan_out_demo`), and a four-stage diamond with a
//! fan-in stage (`diamond_demo`, §8.3 seed scenarios 1-3). None of this is
//! part of the orchestration core itself — it plays the same "exercise the
//! engine end to end" role the teacher's own `tasker-example-rs` crate
//! plays for its handlers.

pub mod handlers;
pub mod hello_world;
pub mod fan_out_demo;
pub mod diamond_demo;

use terraflow_registry::{HandlerRegistry, JobRegistry};
use terraflow_shared::OrchestrationResult;

/// Builds the job and handler registries with all three example
/// `job_type`s wired in, the way a binary's `main()` composes the
/// registries at boot (§9: "explicit boot-time wiring").
pub fn build_registries() -> OrchestrationResult<(JobRegistry, HandlerRegistry)> {
    let mut jobs = JobRegistry::new();
    jobs.register(hello_world::blueprint())?;
    jobs.register(fan_out_demo::blueprint())?;
    jobs.register(diamond_demo::blueprint())?;

    let mut handlers = HandlerRegistry::new();
    handlers::register_all(&mut handlers);

    jobs.validate_against_handlers(&handlers)?;

    Ok((jobs, handlers))
}
