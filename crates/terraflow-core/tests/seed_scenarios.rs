//! Integration tests for the generic §8.3 seed scenarios that don't need a
//! specific example blueprint: concurrency stress (4), partial failure (5),
//! and post-completion redelivery (6). Scenarios 1-3 (hello_world,
//! fan_out_demo, diamond_demo) live in `terraflow-examples/tests` alongside
//! the blueprints they exercise.

use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;
use terraflow_core::CoreMachine;
use terraflow_queue::{PgmqQueue, TaskQueueMessage};
use terraflow_registry::{HandlerRegistry, JobRegistry};
use terraflow_shared::models::{
    JobBlueprint, JobStatus, Parallelism, StageDefinition, TaskResult, TaskSpec, TaskStatus,
};
use terraflow_store::PgStateStore;

const JOBS_QUEUE: &str = "jobs";
const TASKS_QUEUE: &str = "tasks";

async fn migrate(pool: &PgPool) {
    terraflow_store::MIGRATOR.run(pool).await.unwrap();
    terraflow_queue::MIGRATOR.run(pool).await.unwrap();
}

/// A single fan-out stage whose count is fixed by `count_key` in job
/// parameters. Tasks either all succeed, or the task whose index equals
/// `fail_index` (if set in params) fails with a business error.
fn fan_out_blueprint(job_type: &str) -> JobBlueprint {
    JobBlueprint {
        job_type: job_type.to_string(),
        description: "test-only fixed fan-out stage".to_string(),
        stages: vec![StageDefinition {
            number: 1,
            name: "work".to_string(),
            task_type: "stress_task".to_string(),
            parallelism: Parallelism::FanOut,
            count: None,
        }],
        validate_parameters: Arc::new(|p| Ok(p.clone())),
        generate_job_id: Arc::new(JobBlueprint::default_generate_job_id),
        create_job_record: Arc::new(JobBlueprint::default_create_job_record),
        create_tasks_for_stage: Arc::new(|_stage, job_params, job_id, _prev| {
            let count = job_params.get("count").and_then(|v| v.as_u64()).unwrap_or(1);
            Ok((0..count)
                .map(|i| TaskSpec {
                    task_id: terraflow_shared::canonical::make_task_id(job_id, 1, &i.to_string()),
                    task_type: "stress_task".to_string(),
                    task_index: i.to_string(),
                    parameters: json!({ "index": i, "fail_index": job_params.get("fail_index") }),
                    metadata: terraflow_shared::models::empty_object(),
                })
                .collect())
        }),
        aggregate_stage: Arc::new(JobBlueprint::default_aggregate),
        build_final_result: Arc::new(JobBlueprint::default_final_result),
    }
}

async fn build_machine(pool: PgPool, job_type: &str) -> CoreMachine {
    let store = PgStateStore::new(pool.clone());
    let queue = PgmqQueue::new(pool);
    queue.ensure_queue(JOBS_QUEUE).await.unwrap();
    queue.ensure_queue(TASKS_QUEUE).await.unwrap();
    let mut jobs = JobRegistry::new();
    jobs.register(fan_out_blueprint(job_type)).unwrap();

    let mut handlers = HandlerRegistry::new();
    handlers.register_fn("stress_task", |params, _ctx| async move {
        let fail_index = params.get("fail_index").and_then(|v| v.as_u64());
        let index = params.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
        if fail_index == Some(index) {
            Ok(TaskResult::err(format!("simulated failure at index {index}")))
        } else {
            Ok(TaskResult::ok(json!({ "index": index })))
        }
    });

    CoreMachine::new(store, queue, jobs, handlers, JOBS_QUEUE, TASKS_QUEUE)
}

fn task_message(task: &terraflow_shared::models::TaskRecord) -> TaskQueueMessage {
    TaskQueueMessage::new(
        task.task_id.clone(),
        task.parent_job_id.clone(),
        task.task_type.clone(),
        task.stage,
        task.task_index.clone(),
        task.parameters.clone(),
        None,
    )
}

#[sqlx::test]
async fn scenario_4_concurrency_stress_advances_stage_exactly_once(pool: PgPool) -> sqlx::Result<()> {
    migrate(&pool).await;
    let machine = Arc::new(build_machine(pool.clone(), "stress_100").await);

    let job_id = terraflow_shared::canonical::generate_job_id("stress_100", &json!({"count": 100}));
    let job = terraflow_shared::models::JobRecord::new_queued(
        job_id.clone(),
        "stress_100".to_string(),
        1,
        json!({"count": 100}),
        None,
    );
    machine.store().create_job(&job).await.unwrap();

    let job_msg = terraflow_queue::JobQueueMessage::new(
        job_id.clone(),
        "stress_100".to_string(),
        1,
        json!({"count": 100}),
        json!({}),
    );
    machine.process_job(&job_msg).await.unwrap();

    let tasks = machine.store().list_tasks_for_job_stage(&job_id, 1).await.unwrap();
    assert_eq!(tasks.len(), 100);

    // Every task message, replayed 3 times each, dispatched concurrently.
    let mut handles = Vec::new();
    for task in &tasks {
        for _ in 0..3 {
            let machine = machine.clone();
            let msg = task_message(task);
            handles.push(tokio::spawn(async move { machine.process_task(&msg).await }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let job = machine.store().get_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.satisfies_terminal_integrity());

    let tasks = machine.store().list_tasks_for_job_stage(&job_id, 1).await.unwrap();
    assert_eq!(tasks.len(), 100);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    Ok(())
}

#[sqlx::test]
async fn scenario_5_partial_failure_fails_the_job_without_advancing(pool: PgPool) -> sqlx::Result<()> {
    migrate(&pool).await;
    let machine = build_machine(pool.clone(), "stress_partial").await;

    let params = json!({"count": 10, "fail_index": 3});
    let job_id = terraflow_shared::canonical::generate_job_id("stress_partial", &params);
    let job = terraflow_shared::models::JobRecord::new_queued(
        job_id.clone(),
        "stress_partial".to_string(),
        1,
        params.clone(),
        None,
    );
    machine.store().create_job(&job).await.unwrap();

    let job_msg = terraflow_queue::JobQueueMessage::new(
        job_id.clone(),
        "stress_partial".to_string(),
        1,
        params,
        json!({}),
    );
    machine.process_job(&job_msg).await.unwrap();

    let tasks = machine.store().list_tasks_for_job_stage(&job_id, 1).await.unwrap();
    assert_eq!(tasks.len(), 10);
    for task in &tasks {
        let msg = task_message(task);
        machine.process_task(&msg).await.unwrap();
    }

    let job = machine.store().get_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let failing_task_id = terraflow_shared::canonical::make_task_id(&job_id, 1, "3");
    assert!(job
        .error_details
        .as_deref()
        .unwrap()
        .contains(&failing_task_id));
    assert!(job.satisfies_terminal_integrity());
    Ok(())
}

#[sqlx::test]
async fn scenario_6_redelivery_after_completion_is_a_no_op(pool: PgPool) -> sqlx::Result<()> {
    migrate(&pool).await;
    let machine = build_machine(pool.clone(), "stress_single").await;

    let params = json!({"count": 1});
    let job_id = terraflow_shared::canonical::generate_job_id("stress_single", &params);
    let job = terraflow_shared::models::JobRecord::new_queued(
        job_id.clone(),
        "stress_single".to_string(),
        1,
        params.clone(),
        None,
    );
    machine.store().create_job(&job).await.unwrap();

    let job_msg = terraflow_queue::JobQueueMessage::new(
        job_id.clone(),
        "stress_single".to_string(),
        1,
        params,
        json!({}),
    );
    machine.process_job(&job_msg).await.unwrap();

    let tasks = machine.store().list_tasks_for_job_stage(&job_id, 1).await.unwrap();
    let msg = task_message(&tasks[0]);
    machine.process_task(&msg).await.unwrap();

    let completed = machine.store().get_job(&job_id).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);

    // Replay: no exception escapes, no state change.
    machine.process_task(&msg).await.unwrap();
    let after_replay = machine.store().get_job(&job_id).await.unwrap();
    assert_eq!(after_replay.status, JobStatus::Completed);
    assert_eq!(after_replay.result_data, completed.result_data);
    assert_eq!(after_replay.updated_at, completed.updated_at);

    // Replay the job message too (after-completion redelivery, §4.5.1 step 2).
    machine.process_job(&job_msg).await.unwrap();
    let after_job_replay = machine.store().get_job(&job_id).await.unwrap();
    assert_eq!(after_job_replay.status, JobStatus::Completed);
    Ok(())
}
