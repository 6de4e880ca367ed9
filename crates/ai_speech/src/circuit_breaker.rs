//! Circuit breaker for the synthesis backend
//!
//! Counts consecutive failed calls. Once the count reaches the threshold the
//! circuit opens for a fixed cooldown, during which calls fail fast without
//! touching the network. When the cooldown has elapsed the next call goes
//! through normally; any success closes the circuit again.
//!
//! The breaker is a plain state machine without interior locking. The
//! synthesis client keeps it behind the same mutex as its statistics and
//! passes the current instant in explicitly.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Configuration for a circuit breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 4,
            cooldown: Duration::from_secs(15),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a custom configuration
    #[must_use]
    pub const fn custom(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
        }
    }
}

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Backend is considered down, requests fail fast
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Consecutive-failure circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    failure_count: u32,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                cooldown: config.cooldown,
            },
            failure_count: 0,
            open_until: None,
        }
    }

    /// Gate a call
    ///
    /// Returns the remaining cooldown if the circuit is open. An expired
    /// cooldown closes the circuit and lets the call through.
    pub fn check(&mut self, now: Instant) -> Result<(), Duration> {
        match self.open_until {
            Some(until) if now < until => Err(until - now),
            Some(_) => {
                info!(service = %self.name, "Circuit breaker cooldown elapsed, closing");
                self.reset();
                Ok(())
            },
            None => Ok(()),
        }
    }

    /// Record a successful call
    pub fn record_success(&mut self) {
        if self.open_until.is_some() || self.failure_count > 0 {
            info!(service = %self.name, "Circuit breaker reset after success");
        }
        self.reset();
    }

    /// Record a failed call, returning true if this failure opened the circuit
    pub fn record_failure(&mut self, now: Instant) -> bool {
        self.failure_count += 1;
        if self.failure_count < self.config.failure_threshold {
            return false;
        }

        self.failure_count = 0;
        self.open_until = Some(now + self.config.cooldown);
        warn!(
            service = %self.name,
            cooldown_ms = u64::try_from(self.config.cooldown.as_millis()).unwrap_or(u64::MAX),
            "Circuit breaker opened, suspending backend calls"
        );
        true
    }

    /// Close the circuit and forget past failures
    pub fn reset(&mut self) {
        self.failure_count = 0;
        self.open_until = None;
    }

    /// State as of `now`
    pub fn state(&self, now: Instant) -> CircuitState {
        match self.open_until {
            Some(until) if now < until => CircuitState::Open,
            _ => CircuitState::Closed,
        }
    }

    /// Consecutive failures recorded since the last reset
    pub const fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Configuration in effect
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::custom(threshold, Duration::from_secs(15)),
        )
    }

    #[test]
    fn starts_closed() {
        let mut cb = breaker(3);
        let now = Instant::now();
        assert_eq!(cb.state(now), CircuitState::Closed);
        assert!(cb.check(now).is_ok());
    }

    #[test]
    fn opens_at_threshold() {
        let mut cb = breaker(3);
        let now = Instant::now();

        assert!(!cb.record_failure(now));
        assert!(!cb.record_failure(now));
        assert!(cb.record_failure(now));

        assert_eq!(cb.state(now), CircuitState::Open);
        let remaining = cb.check(now).unwrap_err();
        assert_eq!(remaining, Duration::from_secs(15));
    }

    #[test]
    fn remaining_shrinks_over_time() {
        let mut cb = breaker(1);
        let now = Instant::now();
        cb.record_failure(now);

        let later = now + Duration::from_secs(10);
        assert_eq!(cb.check(later).unwrap_err(), Duration::from_secs(5));
    }

    #[test]
    fn closes_after_cooldown() {
        let mut cb = breaker(1);
        let now = Instant::now();
        cb.record_failure(now);

        let after = now + Duration::from_secs(15);
        assert!(cb.check(after).is_ok());
        assert_eq!(cb.state(after), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn success_resets_failure_count() {
        let mut cb = breaker(3);
        let now = Instant::now();

        cb.record_failure(now);
        cb.record_failure(now);
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);

        assert!(!cb.record_failure(now));
        assert!(!cb.record_failure(now));
        assert_eq!(cb.state(now), CircuitState::Closed);
    }

    #[test]
    fn zero_threshold_is_treated_as_one() {
        let mut cb = breaker(0);
        assert!(cb.record_failure(Instant::now()));
    }

    #[test]
    fn state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
    }
}
