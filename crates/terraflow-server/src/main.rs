//! # Terraflow Orchestration Server
//!
//! Thin bootstrap binary: load and validate configuration, connect to
//! Postgres, wire the State Store / Message Bus / registries into a
//! `CoreMachine`, then run the worker loop until Ctrl+C or SIGTERM.
//!
//! Grounded on the teacher's `tasker-orchestration/src/bin/server.rs`
//! bootstrap shape — config/logging first, fail loud on startup errors,
//! shutdown on the first of Ctrl+C or SIGTERM.

use terraflow_core::{CoreMachine, WorkerLoop};
use terraflow_shared::config::TerraflowConfig;
use terraflow_shared::logging;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match TerraflowConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    logging::init_tracing(&config.log_filter, config.log_format);

    info!("Starting Terraflow orchestration server...");
    info!(version = env!("CARGO_PKG_VERSION"), "   Version");
    info!(
        build_mode = if cfg!(debug_assertions) { "debug" } else { "release" },
        "   Build mode"
    );

    let pool = terraflow_store::pool::connect(&config.db.connection, config.db.max_connections)
        .await
        .map_err(|e| format!("failed to connect to database: {e}"))?;

    terraflow_store::MIGRATOR.run(&pool).await.map_err(|e| format!("store migration failed: {e}"))?;
    terraflow_queue::MIGRATOR.run(&pool).await.map_err(|e| format!("queue migration failed: {e}"))?;

    let store = terraflow_store::PgStateStore::new(pool.clone());
    let queue = terraflow_queue::PgmqQueue::new(pool);
    queue.ensure_queue(&config.queue.jobs_name).await?;
    queue.ensure_queue(&config.queue.tasks_name).await?;

    // §9: explicit boot-time wiring. The illustrative example job types are
    // the default registry composition for this binary; a deployment with
    // its own blueprints would swap this call for one that registers them
    // instead.
    let (jobs, handlers) = terraflow_examples::build_registries()
        .map_err(|e| format!("failed to build registries: {e}"))?;

    let machine = CoreMachine::new(
        store,
        queue,
        jobs,
        handlers,
        config.queue.jobs_name.as_str(),
        config.queue.tasks_name.as_str(),
    );

    info!(
        worker_count = config.worker_count,
        max_concurrent_calls = config.max_concurrent_calls,
        "Orchestration server started successfully"
    );
    info!("   Press Ctrl+C to shut down gracefully");

    let worker = WorkerLoop::new(machine, config);
    worker.run(shutdown_signal()).await;

    info!("Shutdown signal received, worker loop stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
