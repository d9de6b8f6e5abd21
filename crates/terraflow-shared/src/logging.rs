//! Structured logging bootstrap, mirroring the teacher's
//! `EnvFilter`-driven `tracing_subscriber` initialization.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogFormat;

/// Initialize the global tracing subscriber. Safe to call once at process
/// start; subsequent calls are no-ops (`try_init` swallows the "already set"
/// error, matching the teacher's idempotent boot sequence).
pub fn init_tracing(filter: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let result = match format {
        LogFormat::Json => fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(true)
            .try_init(),
        LogFormat::Pretty => fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already initialized: {e}");
    }
}

/// Convenience used by tests and small binaries that don't read config.
pub fn init_test_tracing() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
