//! # Canonical JSON and Job Identity
//!
//! `job_id` is the idempotency key for the whole system (invariant 1, P1):
//! two submissions whose parameters canonicalize to the same bytes must
//! produce the same `job_id`. Canonicalization here means: recursively sort
//! object keys, preserve array order and number/string representation as
//! `serde_json` already normalizes them.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Produce a canonical JSON byte representation of `value`: object keys
/// sorted recursively, no insignificant whitespace.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    let sorted = sort_keys(value);
    serde_json::to_vec(&sorted).expect("serde_json::Value always serializes")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Generate the stable 64-hex `job_id` for a normalized parameter set.
///
/// `job_type` is folded into the hash so that two different job types
/// submitted with identical parameters do not collide.
pub fn generate_job_id(job_type: &str, parameters: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonicalize(parameters));
    hex::encode(hasher.finalize())
}

/// Build a task_id of the form `{job_id[:8]}-s{stage}-{semantic_index}`,
/// sanitizing `semantic_index` to `[A-Za-z0-9-]+` per invariant 2.
pub fn make_task_id(job_id: &str, stage: i32, semantic_index: &str) -> String {
    let prefix = &job_id[..8.min(job_id.len())];
    let sanitized = sanitize_index(semantic_index);
    format!("{prefix}-s{stage}-{sanitized}")
}

fn sanitize_index(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "0".to_string()
    } else {
        cleaned
    }
}

/// `true` iff `task_id` begins with `job_id`'s first 8 hex chars and is
/// otherwise composed only of `[A-Za-z0-9-]` (P5).
pub fn task_id_obeys_invariant(task_id: &str, job_id: &str) -> bool {
    let prefix = &job_id[..8.min(job_id.len())];
    task_id.starts_with(prefix)
        && !task_id.is_empty()
        && task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn generate_job_id_is_deterministic_under_key_reordering() {
        let p1 = json!({"raster": "a.tif", "bands": [1, 2, 3]});
        let p2 = json!({"bands": [1, 2, 3], "raster": "a.tif"});
        assert_eq!(
            generate_job_id("hello_world", &p1),
            generate_job_id("hello_world", &p2)
        );
    }

    #[test]
    fn generate_job_id_differs_on_job_type() {
        let p = json!({"n": 3});
        assert_ne!(
            generate_job_id("fan_out_demo", &p),
            generate_job_id("diamond_demo", &p)
        );
    }

    #[test]
    fn generate_job_id_differs_on_value_change() {
        let p1 = json!({"n": 3});
        let p2 = json!({"n": 4});
        assert_ne!(
            generate_job_id("fan_out_demo", &p1),
            generate_job_id("fan_out_demo", &p2)
        );
    }

    #[test]
    fn make_task_id_sanitizes_semantic_index() {
        let job_id = generate_job_id("hello_world", &json!({}));
        let task_id = make_task_id(&job_id, 2, "tile x5/y10");
        assert!(task_id.starts_with(&job_id[..8]));
        assert_eq!(task_id, format!("{}-s2-tile-x5-y10", &job_id[..8]));
        assert!(task_id_obeys_invariant(&task_id, &job_id));
    }

    #[test]
    fn make_task_id_handles_empty_semantic_index() {
        let job_id = generate_job_id("hello_world", &json!({}));
        let task_id = make_task_id(&job_id, 1, "");
        assert!(task_id_obeys_invariant(&task_id, &job_id));
    }
}
