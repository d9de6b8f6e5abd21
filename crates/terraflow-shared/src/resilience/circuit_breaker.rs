//! # Generic Circuit Breaker
//!
//! Protects the worker polling loop's store/queue calls from hammering a
//! struggling database — the kind of ambient resilience layer the teacher's
//! own polling loops always carry (see `tasker_shared::resilience`, wrapped
//! by `WebDatabaseCircuitBreaker`/`TaskReadinessCircuitBreaker`). Closed ->
//! Open -> HalfOpen -> Closed, with configurable failure/success thresholds
//! and a recovery timeout.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::behavior::CircuitBreakerBehavior;
use super::metrics::CircuitBreakerMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            // Invalid values default to Open (safest).
            _ => CircuitState::Open,
        }
    }
}

impl From<CircuitState> for u8 {
    fn from(value: CircuitState) -> Self {
        match value {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct Counters {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    consecutive_failures: AtomicU64,
    half_open_successes: AtomicU64,
    total_duration_micros: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            half_open_successes: AtomicU64::new(0),
            total_duration_micros: AtomicU64::new(0),
        }
    }
}

/// Generic closed/open/half-open circuit breaker, safe to share via `Arc`
/// across worker tasks.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    counters: Counters,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            state: AtomicU8::new(CircuitState::Closed.into()),
            counters: Counters::default(),
            opened_at: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, new_state: CircuitState) {
        self.state.store(new_state.into(), Ordering::SeqCst);
        if new_state == CircuitState::Open {
            *self.opened_at.lock().unwrap() = Some(Instant::now());
        }
    }

    /// `true` if a call may proceed. Transitions Open -> HalfOpen once the
    /// recovery timeout has elapsed.
    pub fn should_allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .lock()
                    .unwrap()
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.timeout {
                    self.set_state(CircuitState::HalfOpen);
                    self.counters.half_open_successes.store(0, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success_manual(&self, duration: Duration) {
        self.counters.total_calls.fetch_add(1, Ordering::SeqCst);
        self.counters.success_count.fetch_add(1, Ordering::SeqCst);
        self.counters
            .total_duration_micros
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
        self.counters.consecutive_failures.store(0, Ordering::SeqCst);

        if self.state() == CircuitState::HalfOpen {
            let successes = self
                .counters
                .half_open_successes
                .fetch_add(1, Ordering::SeqCst)
                + 1;
            if successes >= self.config.success_threshold as u64 {
                self.set_state(CircuitState::Closed);
            }
        }
    }

    pub fn record_failure_manual(&self, duration: Duration) {
        self.counters.total_calls.fetch_add(1, Ordering::SeqCst);
        self.counters.failure_count.fetch_add(1, Ordering::SeqCst);
        self.counters
            .total_duration_micros
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
        let consecutive = self
            .counters
            .consecutive_failures
            .fetch_add(1, Ordering::SeqCst)
            + 1;

        match self.state() {
            CircuitState::HalfOpen => self.set_state(CircuitState::Open),
            CircuitState::Closed if consecutive >= self.config.failure_threshold as u64 => {
                self.set_state(CircuitState::Open)
            }
            _ => {}
        }
    }

    pub fn force_open(&self) {
        self.set_state(CircuitState::Open);
    }

    pub fn force_closed(&self) {
        self.set_state(CircuitState::Closed);
        self.counters.consecutive_failures.store(0, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.metrics().is_healthy()
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let total_calls = self.counters.total_calls.load(Ordering::SeqCst);
        let success_count = self.counters.success_count.load(Ordering::SeqCst);
        let failure_count = self.counters.failure_count.load(Ordering::SeqCst);
        let total_duration =
            Duration::from_micros(self.counters.total_duration_micros.load(Ordering::SeqCst));

        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            consecutive_failures: self.counters.consecutive_failures.load(Ordering::SeqCst),
            half_open_calls: self.counters.half_open_successes.load(Ordering::SeqCst),
            total_duration,
            current_state: self.state(),
            failure_rate: if total_calls == 0 {
                0.0
            } else {
                failure_count as f64 / total_calls as f64
            },
            success_rate: if total_calls == 0 {
                0.0
            } else {
                success_count as f64 / total_calls as f64
            },
            average_duration: if total_calls == 0 {
                Duration::ZERO
            } else {
                total_duration / total_calls as u32
            },
        }
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        self.name()
    }

    fn state(&self) -> CircuitState {
        self.state()
    }

    fn should_allow(&self) -> bool {
        self.should_allow()
    }

    fn record_success(&self, duration: Duration) {
        self.record_success_manual(duration);
    }

    fn record_failure(&self, duration: Duration) {
        self.record_failure_manual(duration);
    }

    fn is_healthy(&self) -> bool {
        self.is_healthy()
    }

    fn force_open(&self) {
        self.force_open();
    }

    fn force_closed(&self) {
        self.force_closed();
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        self.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::new("test".into(), CircuitBreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.should_allow());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(
            "test".into(),
            CircuitBreakerConfig {
                failure_threshold: 3,
                ..Default::default()
            },
        );
        cb.record_failure_manual(Duration::ZERO);
        cb.record_failure_manual(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure_manual(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow());
    }

    #[test]
    fn half_open_recovers_to_closed_after_success_threshold() {
        let cb = CircuitBreaker::new(
            "test".into(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::ZERO,
                success_threshold: 2,
            },
        );
        cb.record_failure_manual(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(cb.should_allow()); // zero timeout -> transitions to half-open
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success_manual(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success_manual(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_circuit() {
        let cb = CircuitBreaker::new(
            "test".into(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::ZERO,
                success_threshold: 2,
            },
        );
        cb.record_failure_manual(Duration::ZERO);
        assert!(cb.should_allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure_manual(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new("test".into(), CircuitBreakerConfig::default());
        cb.record_failure_manual(Duration::ZERO);
        cb.record_failure_manual(Duration::ZERO);
        assert_eq!(cb.metrics().consecutive_failures, 2);
        cb.record_success_manual(Duration::ZERO);
        assert_eq!(cb.metrics().consecutive_failures, 0);
    }

    #[test]
    fn force_open_and_force_closed() {
        let cb = CircuitBreaker::new("test".into(), CircuitBreakerConfig::default());
        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.force_closed();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn circuit_state_from_u8_defaults_invalid_to_open() {
        assert_eq!(CircuitState::from(0), CircuitState::Closed);
        assert_eq!(CircuitState::from(2), CircuitState::HalfOpen);
        assert_eq!(CircuitState::from(99), CircuitState::Open);
    }

    #[test]
    fn behavior_trait_object_dispatch() {
        let cb = CircuitBreaker::new("trait_test".into(), CircuitBreakerConfig::default());
        let behavior: &dyn CircuitBreakerBehavior = &cb;
        assert_eq!(behavior.name(), "trait_test");
        assert!(behavior.should_allow());
    }
}
