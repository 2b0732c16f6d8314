//! Circuit breaker for server protection.
//!
//! # States
//! - Closed: successive tripping failures below threshold, server selectable
//! - Tripped: threshold reached and the blackout since the last failure has not elapsed
//!
//! # State Transitions
//! ```text
//! Closed  → Tripped: successive failures >= threshold
//! Tripped → Closed:  any success (successive count cleared)
//! Tripped → Closed:  blackout elapsed, even without a success
//! ```
//!
//! The blackout grows with the failure streak and is capped:
//! `min(timeout_factor * successive_failures, max_timeout)`.

use std::time::Duration;
use crate::config::ClientConfig;

/// Threshold and backoff parameters of a per-server circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerPolicy {
    /// Successive tripping failures before the circuit opens.
    pub threshold: u32,
    /// Blackout added per successive failure.
    pub timeout_factor: Duration,
    /// Upper bound on the blackout.
    pub max_timeout: Duration,
}

impl CircuitBreakerPolicy {
    pub fn new(threshold: u32, timeout_factor: Duration, max_timeout: Duration) -> Self {
        Self {
            threshold,
            timeout_factor,
            max_timeout,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.connection_failure_threshold,
            config.circuit_tripped_timeout_factor(),
            config.circuit_trip_max_timeout(),
        )
    }

    /// Blackout period for a failure streak of the given length.
    pub fn blackout(&self, successive_failures: u32) -> Duration {
        if successive_failures < self.threshold {
            return Duration::ZERO;
        }
        self.timeout_factor
            .saturating_mul(successive_failures)
            .min(self.max_timeout)
    }

    /// Whether a streak whose last failure happened `since_last_failure` ago
    /// keeps the circuit open.
    pub fn is_tripped(&self, successive_failures: u32, since_last_failure: Duration) -> bool {
        successive_failures >= self.threshold && since_last_failure < self.blackout(successive_failures)
    }
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}
