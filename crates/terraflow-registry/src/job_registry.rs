//! Job Registry (C3): explicit, boot-time composed map of `job_type` to
//! `JobBlueprint`. No decorators, no import-time side effects — callers
//! build one with `JobRegistry::new()` then `register()` each blueprint.

use std::collections::HashMap;
use std::sync::Arc;

use terraflow_shared::models::{JobBlueprint, Parallelism};
use terraflow_shared::{OrchestrationError, OrchestrationResult};

use crate::handler_registry::HandlerRegistry;

/// Boot-time registry of job blueprints, keyed by `job_type`.
#[derive(Debug, Default, Clone)]
pub struct JobRegistry {
    blueprints: HashMap<String, Arc<JobBlueprint>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blueprint. Rejects one that fails its own structural
    /// validation (non-empty, 1..N contiguous stage numbers, §4.3).
    pub fn register(&mut self, blueprint: JobBlueprint) -> OrchestrationResult<()> {
        blueprint.validate_registration()?;
        self.blueprints
            .insert(blueprint.job_type.clone(), Arc::new(blueprint));
        Ok(())
    }

    pub fn get(&self, job_type: &str) -> OrchestrationResult<Arc<JobBlueprint>> {
        self.blueprints
            .get(job_type)
            .cloned()
            .ok_or_else(|| OrchestrationError::BlueprintNotRegistered {
                job_type: job_type.to_string(),
            })
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.blueprints.contains_key(job_type)
    }

    pub fn job_types(&self) -> Vec<&str> {
        self.blueprints.keys().map(String::as_str).collect()
    }

    /// Cross-registry check (§4.3): every stage's `task_type` must be
    /// registered in the handler registry, except fan-in stages, whose
    /// tasks are orchestrator-generated rather than blueprint-authored.
    pub fn validate_against_handlers(&self, handlers: &HandlerRegistry) -> OrchestrationResult<()> {
        for blueprint in self.blueprints.values() {
            for stage in &blueprint.stages {
                if matches!(stage.parallelism, Parallelism::FanIn) {
                    continue;
                }
                if !handlers.contains(&stage.task_type) {
                    return Err(OrchestrationError::HandlerNotRegistered {
                        task_type: stage.task_type.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
