//! # Circuit Breaker Module
//!
//! Fails completion requests fast after repeated failures of the completion
//! service, instead of making every waiting customer sit through the timeout.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure: Option<Instant>,
    /// A half-open trial request is in flight
    trial_pending: bool,
}

/// Circuit breaker for completion requests
///
/// # State Machine
///
/// - **Closed**: requests pass through
/// - **Open**: `circuit_breaker_threshold` consecutive failures, requests fail fast
/// - **Half-Open**: after `circuit_breaker_reset_secs` the first caller is let through
///   as a trial while every other caller is still rejected; the trial's failure
///   reopens the circuit, its success closes it
///
/// Every caller that [`CircuitBreaker::is_open`] lets through must report back with
/// `record_success` or `record_failure`.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    /// `true` while requests should be rejected without calling the service.
    /// Once half-open, a `false` answer hands the caller the single trial slot.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.failure_count < self.config.circuit_breaker_threshold {
            return false;
        }
        let reset_after = Duration::from_secs(self.config.circuit_breaker_reset_secs);
        let cooling_down = state
            .last_failure
            .is_some_and(|last| last.elapsed() < reset_after);
        if cooling_down || state.trial_pending {
            return true;
        }
        state.trial_pending = true;
        false
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());
        state.trial_pending = false;
        if state.failure_count == self.config.circuit_breaker_threshold {
            warn!(
                failures = state.failure_count,
                reset_secs = self.config.circuit_breaker_reset_secs,
                "Completion circuit breaker opened"
            );
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.failure_count >= self.config.circuit_breaker_threshold {
            info!("Completion circuit breaker closed");
        }
        *state = BreakerState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(RecoveryConfig {
            circuit_breaker_threshold: threshold,
            circuit_breaker_reset_secs: reset_secs,
        })
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = breaker(3, 60);
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_success_resets() {
        let breaker = breaker(2, 60);
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.is_open());
        breaker.record_success();
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_half_open_lets_one_trial_through() {
        let breaker = breaker(1, 0);
        breaker.record_failure();
        // Zero reset window: the trial request is allowed immediately
        assert!(!breaker.is_open());
        // Concurrent callers wait for the trial's outcome
        assert!(breaker.is_open());
        assert!(breaker.is_open());

        breaker.record_success();
        assert!(!breaker.is_open());
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_failed_trial_reopens() {
        let breaker = breaker(1, 0);
        breaker.record_failure();
        assert!(!breaker.is_open());
        assert!(breaker.is_open());

        breaker.record_failure();
        // A new trial once the (zero) reset window has passed again
        assert!(!breaker.is_open());
        assert!(breaker.is_open());
    }
}
