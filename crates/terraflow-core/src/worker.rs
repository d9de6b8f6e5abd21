//! Worker loop (§5 "Scheduling model"): one polling task per queue, each
//! dequeued message handled by its own lightweight Tokio task, bounded by a
//! semaphore sized to `max_concurrent_calls`. The Message Bus's own
//! scheduling is the only parallelism source — no in-process job/task
//! scheduler sits on top of it.
//!
//! Store/queue polling is wrapped in a [`CircuitBreaker`], the same ambient
//! resilience layer the teacher wraps its own polling loops in, so a
//! struggling database backs the worker off instead of hammering it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use terraflow_queue::QueuedMessage;
use terraflow_shared::config::TerraflowConfig;
use terraflow_shared::resilience::{CircuitBreaker, CircuitBreakerConfig};
use tokio::sync::Semaphore;

use crate::machine::{CoreMachine, JobOutcome};

/// Polls both queues until `shutdown` resolves. Grounded on the teacher's
/// `server.rs` bootstrap: `tokio::select!` between the work loops and a
/// cancellation signal, no unbounded spawning.
pub struct WorkerLoop {
    machine: Arc<CoreMachine>,
    config: Arc<TerraflowConfig>,
    job_breaker: Arc<CircuitBreaker>,
    task_breaker: Arc<CircuitBreaker>,
}

impl WorkerLoop {
    pub fn new(machine: CoreMachine, config: TerraflowConfig) -> Self {
        let breaker_cfg = CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker.failure_threshold,
            timeout: Duration::from_secs(config.circuit_breaker.recovery_timeout_secs),
            success_threshold: config.circuit_breaker.success_threshold,
        };
        Self {
            machine: Arc::new(machine),
            config: Arc::new(config),
            job_breaker: Arc::new(CircuitBreaker::new("jobs_queue".to_string(), breaker_cfg)),
            task_breaker: Arc::new(CircuitBreaker::new("tasks_queue".to_string(), breaker_cfg)),
        }
    }

    /// Runs until `shutdown` completes. Intended to be raced against
    /// `tokio::signal::ctrl_c()`/SIGTERM by the caller (terraflow-server).
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_calls));

        tokio::select! {
            _ = self.poll_jobs(semaphore.clone()) => {}
            _ = self.poll_tasks(semaphore.clone()) => {}
            _ = shutdown => {
                tracing::info!("worker loop shutting down");
            }
        }
    }

    async fn poll_jobs(&self, semaphore: Arc<Semaphore>) {
        let queue_name = self.machine.jobs_queue_name().to_string();
        loop {
            if !self.job_breaker.should_allow() {
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }

            let visibility = Duration::from_secs(self.config.queue.lock_duration_secs);
            let started = Instant::now();
            let batch = self
                .machine
                .queue()
                .read::<terraflow_queue::JobQueueMessage>(
                    &queue_name,
                    visibility,
                    self.config.max_concurrent_calls as i32,
                    self.config.queue.max_delivery_count as i32,
                )
                .await;

            let messages = match batch {
                Ok(messages) => {
                    self.job_breaker.record_success_manual(started.elapsed());
                    messages
                }
                Err(e) => {
                    self.job_breaker.record_failure_manual(started.elapsed());
                    tracing::error!(error = %e, "failed to poll jobs queue");
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    continue;
                }
            };

            if messages.is_empty() {
                tokio::time::sleep(Duration::from_millis(200)).await;
                continue;
            }

            for QueuedMessage { message, msg_id, read_count } in messages {
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                let machine = self.machine.clone();
                let queue_name = queue_name.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    match machine.process_job(&message).await {
                        Ok(JobOutcome::Acknowledged) => {
                            if let Err(e) = machine.queue().ack(&queue_name, msg_id).await {
                                tracing::error!(error = %e, msg_id, "failed to ack job message");
                            }
                        }
                        Ok(JobOutcome::DeadLettered { reason }) => {
                            let payload = serde_json::to_value(&message)
                                .unwrap_or_else(|_| serde_json::json!({}));
                            if let Err(e) = machine
                                .queue()
                                .dead_letter(&queue_name, msg_id, &payload, read_count, &reason)
                                .await
                            {
                                tracing::error!(error = %e, msg_id, "failed to dead-letter job message");
                            }
                        }
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                job_id = %message.job_id,
                                recoverable = e.is_recoverable(),
                                "processJob failed; leaving message for redelivery"
                            );
                        }
                    }
                });
            }
        }
    }

    async fn poll_tasks(&self, semaphore: Arc<Semaphore>) {
        let queue_name = self.machine.tasks_queue_name().to_string();
        loop {
            if !self.task_breaker.should_allow() {
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }

            let visibility = Duration::from_secs(self.config.queue.lock_duration_secs);
            let started = Instant::now();
            let batch = self
                .machine
                .queue()
                .read::<terraflow_queue::TaskQueueMessage>(
                    &queue_name,
                    visibility,
                    self.config.max_concurrent_calls as i32,
                    self.config.queue.max_delivery_count as i32,
                )
                .await;

            let messages = match batch {
                Ok(messages) => {
                    self.task_breaker.record_success_manual(started.elapsed());
                    messages
                }
                Err(e) => {
                    self.task_breaker.record_failure_manual(started.elapsed());
                    tracing::error!(error = %e, "failed to poll tasks queue");
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    continue;
                }
            };

            if messages.is_empty() {
                tokio::time::sleep(Duration::from_millis(200)).await;
                continue;
            }

            for QueuedMessage { message, msg_id, .. } in messages {
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                let machine = self.machine.clone();
                let queue_name = queue_name.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    match machine.process_task(&message).await {
                        Ok(()) => {
                            if let Err(e) = machine.queue().ack(&queue_name, msg_id).await {
                                tracing::error!(error = %e, msg_id, "failed to ack task message");
                            }
                        }
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                task_id = %message.task_id,
                                recoverable = e.is_recoverable(),
                                "processTask failed; leaving message for redelivery"
                            );
                        }
                    }
                });
            }
        }
    }
}
