//! # Orchestration Configuration
//!
//! Layered configuration following the teacher's `config`-crate pattern: a
//! base TOML file, an optional environment-specific TOML file, then
//! `TERRAFLOW__`-prefixed environment variables, highest precedence last.

use serde::{Deserialize, Serialize};

use crate::errors::{OrchestrationError, OrchestrationResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// L: lock duration granted per dequeue, in seconds.
    pub lock_duration_secs: u64,
    /// R: the broker's maximum auto-renewal ceiling, in seconds. Must equal
    /// `handler_timeout_secs` (§4.2 harmonization invariant).
    pub auto_renew_max_secs: u64,
    /// MUST be 1 — the bus never drives retries (§4.2, §6.3).
    pub max_delivery_count: u32,
    pub jobs_name: String,
    pub tasks_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lock_duration_secs: 30,
            auto_renew_max_secs: 300,
            max_delivery_count: 1,
            jobs_name: "jobs".to_string(),
            tasks_name: "tasks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub connection: String,
    pub app_schema: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection: "postgres://localhost/terraflow".to_string(),
            app_schema: "app".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout_secs: 30,
        }
    }
}

/// Top-level orchestration configuration, covering every row of §6.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerraflowConfig {
    /// Per-task wall-clock timeout, in seconds. MUST be > 0 and MUST equal
    /// `queue.auto_renew_max_secs` (§4.2 harmonization invariant).
    pub handler_timeout_secs: u64,
    pub max_concurrent_calls: usize,
    pub worker_count: usize,
    pub instance_count: usize,
    pub queue: QueueConfig,
    pub retry: RetryConfig,
    pub db: DatabaseConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub log_format: LogFormat,
    pub log_filter: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for TerraflowConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: 300,
            max_concurrent_calls: 10,
            worker_count: 1,
            instance_count: 1,
            queue: QueueConfig::default(),
            retry: RetryConfig::default(),
            db: DatabaseConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            log_format: LogFormat::Pretty,
            log_filter: "info".to_string(),
        }
    }
}

impl TerraflowConfig {
    /// Load configuration the way the teacher's `ConfigManager` does: a base
    /// TOML (`config/base.toml`), an optional `config/{env}.toml` overlay
    /// selected by `TERRAFLOW_ENV` (default `development`), then
    /// `TERRAFLOW__`-prefixed environment variables (double underscore as
    /// the nesting separator, e.g. `TERRAFLOW__QUEUE__LOCK_DURATION_SECS`).
    pub fn load() -> OrchestrationResult<Self> {
        let _ = dotenvy::dotenv();
        let env = std::env::var("TERRAFLOW_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(
                config::File::with_name("config/base")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name(&format!("config/{env}"))
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("TERRAFLOW")
                    .separator("__")
                    .try_parsing(true),
            );

        let defaults = Self::default();
        let builder = builder
            .set_default("handler_timeout_secs", defaults.handler_timeout_secs)?
            .set_default("max_concurrent_calls", defaults.max_concurrent_calls as i64)?
            .set_default("worker_count", defaults.worker_count as i64)?
            .set_default("instance_count", defaults.instance_count as i64)?
            .set_default("queue.lock_duration_secs", defaults.queue.lock_duration_secs)?
            .set_default(
                "queue.auto_renew_max_secs",
                defaults.queue.auto_renew_max_secs,
            )?
            .set_default("queue.max_delivery_count", defaults.queue.max_delivery_count)?
            .set_default("queue.jobs_name", defaults.queue.jobs_name.clone())?
            .set_default("queue.tasks_name", defaults.queue.tasks_name.clone())?
            .set_default("retry.max", defaults.retry.max)?
            .set_default("retry.base_delay_ms", defaults.retry.base_delay_ms)?
            .set_default("retry.max_delay_ms", defaults.retry.max_delay_ms)?
            .set_default("db.connection", defaults.db.connection.clone())?
            .set_default("db.app_schema", defaults.db.app_schema.clone())?
            .set_default("db.max_connections", defaults.db.max_connections)?
            .set_default(
                "circuit_breaker.failure_threshold",
                defaults.circuit_breaker.failure_threshold,
            )?
            .set_default(
                "circuit_breaker.success_threshold",
                defaults.circuit_breaker.success_threshold,
            )?
            .set_default(
                "circuit_breaker.recovery_timeout_secs",
                defaults.circuit_breaker.recovery_timeout_secs,
            )?
            .set_default("log_format", "pretty")?
            .set_default("log_filter", defaults.log_filter.clone())?;

        let settled = builder
            .build()
            .map_err(|e| OrchestrationError::config_error(e.to_string()))?;

        let cfg: TerraflowConfig = settled
            .try_deserialize()
            .map_err(|e| OrchestrationError::config_error(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Enforces the §4.2 harmonization invariant (`L <= R == handler_timeout`)
    /// and the §6.3 `max_delivery_count == 1` constraint. Startup MUST fail
    /// loud if violated.
    pub fn validate(&self) -> OrchestrationResult<()> {
        if self.queue.lock_duration_secs > self.queue.auto_renew_max_secs {
            return Err(OrchestrationError::config_error(format!(
                "queue.lock_duration_secs ({}) must be <= queue.auto_renew_max_secs ({})",
                self.queue.lock_duration_secs, self.queue.auto_renew_max_secs
            )));
        }
        if self.queue.auto_renew_max_secs != self.handler_timeout_secs {
            return Err(OrchestrationError::config_error(format!(
                "queue.auto_renew_max_secs ({}) must equal handler_timeout_secs ({})",
                self.queue.auto_renew_max_secs, self.handler_timeout_secs
            )));
        }
        if self.queue.max_delivery_count != 1 {
            return Err(OrchestrationError::config_error(format!(
                "queue.max_delivery_count must be 1, got {}",
                self.queue.max_delivery_count
            )));
        }
        if self.handler_timeout_secs == 0 {
            return Err(OrchestrationError::config_error(
                "handler_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.max_concurrent_calls == 0 {
            return Err(OrchestrationError::config_error(
                "max_concurrent_calls must be >= 1".to_string(),
            ));
        }
        if self.queue.jobs_name.is_empty() || self.queue.tasks_name.is_empty() {
            return Err(OrchestrationError::config_error(
                "queue.jobs_name and queue.tasks_name must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<config::ConfigError> for OrchestrationError {
    fn from(e: config::ConfigError) -> Self {
        OrchestrationError::config_error(e.to_string())
    }
}
