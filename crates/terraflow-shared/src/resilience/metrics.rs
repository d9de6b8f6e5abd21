//! Circuit breaker metrics, grounded on the teacher's
//! `tasker_shared::resilience::metrics` module.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::CircuitState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub half_open_calls: u64,
    pub total_duration: Duration,
    pub current_state: CircuitState,
    pub failure_rate: f64,
    pub success_rate: f64,
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            half_open_calls: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }

    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "state={:?} calls={} success_rate={:.1}% failures={} avg_duration_ms={}",
            self.current_state,
            self.total_calls,
            self.success_rate * 100.0,
            self.failure_count,
            self.average_duration.as_millis()
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metrics_are_healthy_and_closed() {
        let m = CircuitBreakerMetrics::new();
        assert_eq!(m.current_state, CircuitState::Closed);
        assert!(m.is_healthy());
    }

    #[test]
    fn open_state_is_never_healthy() {
        let mut m = CircuitBreakerMetrics::new();
        m.current_state = CircuitState::Open;
        assert!(!m.is_healthy());
    }

    #[test]
    fn high_failure_rate_marks_closed_state_unhealthy() {
        let mut m = CircuitBreakerMetrics::new();
        m.failure_rate = 0.2;
        assert!(!m.is_healthy());
    }
}
