//! Retry with exponential backoff
//!
//! # Example
//!
//! ```rust,ignore
//! use ai_speech::retry::{RetryPolicy, with_retry};
//!
//! let policy = RetryPolicy::default();
//! let outcome = with_retry(&policy, || async { backend.call().await }).await;
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use crate::config::SynthesisClientConfig;
use crate::error::SynthesisError;

/// Backoff schedule for a fallible operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Cap for any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Random fraction of the delay added on top of it (0.0 disables jitter)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl From<&SynthesisClientConfig> for RetryPolicy {
    fn from(config: &SynthesisClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(
                config.retry_max_delay_ms.max(config.retry_base_delay_ms),
            ),
            jitter_factor: config.retry_jitter.clamp(0.0, 1.0),
            ..Self::default()
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failed attempt `attempt` (0-indexed)
    ///
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`, then
    /// lengthened by a random share of up to `jitter_factor`. Jitter never
    /// shortens the delay.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.jitter_factor > 0.0 {
            let spread = capped * self.jitter_factor;
            capped + rand::rng().random_range(0.0..=spread)
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }
}

/// Errors that can be checked for retryability
pub trait Retryable {
    /// Returns true if another attempt may succeed
    fn is_retryable(&self) -> bool;
}

impl Retryable for SynthesisError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

/// Final result of a retried operation
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The result of the last attempt
    pub result: Result<T, E>,
    /// Number of attempts made (1 = no retries)
    pub attempts: u32,
}

impl<T, E> RetryResult<T, E> {
    /// Number of attempts beyond the first
    pub const fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Execute an async operation with retry logic
///
/// `operation` is invoked with the 0-indexed attempt number and whether it
/// is the final attempt.
#[allow(clippy::cast_possible_truncation)]
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32, bool) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        let is_last = attempt + 1 >= max_attempts;
        let result = operation(attempt, is_last).await;
        attempt += 1;

        match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        attempts = attempt,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Operation succeeded after retries"
                    );
                }
                return RetryResult {
                    result: Ok(value),
                    attempts: attempt,
                };
            },
            Err(err) => {
                if !err.is_retryable() {
                    debug!(attempts = attempt, error = %err, "Operation failed with non-retryable error");
                    return RetryResult {
                        result: Err(err),
                        attempts: attempt,
                    };
                }

                if is_last {
                    warn!(attempts = attempt, error = %err, "Operation failed after max attempts");
                    return RetryResult {
                        result: Err(err),
                        attempts: attempt,
                    };
                }

                let delay = policy.delay_for_attempt(attempt - 1);
                warn!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            },
        }
    }
}
