//! Task handlers backing the example blueprints. Each is a plain async
//! function registered via `HandlerRegistry::register_fn` — the "pure
//! function of `(params, context)`" shape §4.4 requires, with no access to
//! registry/global state.

use serde_json::json;
use terraflow_registry::HandlerRegistry;
use terraflow_shared::models::{TaskContext, TaskResult};
use terraflow_shared::{OrchestrationError, OrchestrationResult};

pub fn register_all(handlers: &mut HandlerRegistry) {
    handlers.register_fn("reverse_string", reverse_string);
    handlers.register_fn("double_value", double_value);
    handlers.register_fn("square_value", square_value);
    handlers.register_fn("normalize", normalize);
    handlers.register_fn("classify", classify);
    handlers.register_fn("aggregate_results", aggregate_results);
    handlers.register_fn("finalize", finalize);
}

fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> OrchestrationResult<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| OrchestrationError::contract_violation(format!("missing string field '{key}'")))
}

fn require_f64(params: &serde_json::Value, key: &str) -> OrchestrationResult<f64> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| OrchestrationError::contract_violation(format!("missing numeric field '{key}'")))
}

/// `hello_world` stage 1: echoes the message and its reversal.
async fn reverse_string(
    params: serde_json::Value,
    _ctx: TaskContext,
) -> OrchestrationResult<TaskResult> {
    let message = match require_str(&params, "message") {
        Ok(m) => m,
        Err(e) => return Ok(TaskResult::err(e.to_error_details())),
    };
    let reversed: String = message.chars().rev().collect();
    Ok(TaskResult::ok(
        json!({ "message": message, "reversed": reversed }),
    ))
}

/// `fan_out_demo` stage 1: one task per unit of fan-out, doubling its index.
async fn double_value(
    params: serde_json::Value,
    _ctx: TaskContext,
) -> OrchestrationResult<TaskResult> {
    let index = match require_f64(&params, "index") {
        Ok(i) => i,
        Err(e) => return Ok(TaskResult::err(e.to_error_details())),
    };
    Ok(TaskResult::ok(json!({ "value": index * 2.0 })))
}

/// `fan_out_demo` stage 2: squares the value handed down from stage 1.
async fn square_value(
    params: serde_json::Value,
    _ctx: TaskContext,
) -> OrchestrationResult<TaskResult> {
    let value = match require_f64(&params, "value") {
        Ok(v) => v,
        Err(e) => return Ok(TaskResult::err(e.to_error_details())),
    };
    Ok(TaskResult::ok(json!({ "value": value * value })))
}

/// `diamond_demo` stage 1: normalizes the raw input.
async fn normalize(params: serde_json::Value, _ctx: TaskContext) -> OrchestrationResult<TaskResult> {
    let n = match require_f64(&params, "n") {
        Ok(n) => n,
        Err(e) => return Ok(TaskResult::err(e.to_error_details())),
    };
    Ok(TaskResult::ok(json!({ "normalized": n / 10.0 })))
}

/// `diamond_demo` stage 2 (fan_out=5): one classification per branch.
async fn classify(params: serde_json::Value, _ctx: TaskContext) -> OrchestrationResult<TaskResult> {
    let index = match require_f64(&params, "index") {
        Ok(i) => i,
        Err(e) => return Ok(TaskResult::err(e.to_error_details())),
    };
    let base = match require_f64(&params, "base") {
        Ok(b) => b,
        Err(e) => return Ok(TaskResult::err(e.to_error_details())),
    };
    Ok(TaskResult::ok(json!({ "index": index, "score": base + index })))
}

/// `diamond_demo` stage 3: the orchestrator-generated fan-in task.
/// `params.previous_results` is the full list of stage 2's `result_data`
/// (§4.5.1 step 4 "fan_in" branch).
async fn aggregate_results(
    params: serde_json::Value,
    _ctx: TaskContext,
) -> OrchestrationResult<TaskResult> {
    let previous_results = params
        .get("previous_results")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let sum: f64 = previous_results
        .iter()
        .filter_map(|r| r.get("score").and_then(|s| s.as_f64()))
        .sum();
    Ok(TaskResult::ok(json!({
        "count": previous_results.len(),
        "sum": sum,
    })))
}

/// `diamond_demo` stage 4: single closing task.
async fn finalize(params: serde_json::Value, _ctx: TaskContext) -> OrchestrationResult<TaskResult> {
    let aggregate = params.get("aggregate").cloned().unwrap_or_else(|| json!({}));
    Ok(TaskResult::ok(json!({ "summary": aggregate })))
}
