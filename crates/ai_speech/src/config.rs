//! Configuration for the synthesis client

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the synthesis backend connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisClientConfig {
    /// Synthesis endpoint URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Total attempts per call, including the first one
    #[serde(default = "default_max_attempts", alias = "max_retries")]
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds, doubled each retry
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound for a single backoff delay in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Extra random fraction added on top of each backoff delay (0.0 disables)
    #[serde(default)]
    pub retry_jitter: f64,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Base read timeout in milliseconds, extended for long texts
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Ceiling for the extended read timeout in milliseconds
    #[serde(default = "default_max_read_timeout_ms")]
    pub max_read_timeout_ms: u64,

    /// Budget for sending the request body in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Time to wait for a free connection slot in milliseconds
    #[serde(default = "default_pool_timeout_ms")]
    pub pool_timeout_ms: u64,

    /// Maximum concurrent connections to the backend
    #[serde(default = "default_pool_max_connections")]
    pub pool_max_connections: usize,

    /// Idle connections kept alive per host
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle: usize,

    /// Idle connection expiry in milliseconds
    #[serde(default = "default_pool_idle_timeout_ms")]
    pub pool_idle_timeout_ms: u64,

    /// Consecutive failed calls that open the circuit
    #[serde(default = "default_circuit_break_threshold")]
    pub circuit_break_threshold: u32,

    /// How long the circuit stays open in milliseconds
    #[serde(default = "default_circuit_break_cooldown_ms")]
    pub circuit_break_cooldown_ms: u64,

    /// Timeout of the health probe in milliseconds
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
}

fn default_api_url() -> String {
    "http://127.0.0.1:9880/tts".to_string()
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_retry_base_delay_ms() -> u64 {
    1000
}

const fn default_retry_max_delay_ms() -> u64 {
    8000
}

const fn default_connect_timeout_ms() -> u64 {
    10_000
}

const fn default_read_timeout_ms() -> u64 {
    30_000
}

const fn default_max_read_timeout_ms() -> u64 {
    60_000
}

const fn default_write_timeout_ms() -> u64 {
    30_000
}

const fn default_pool_timeout_ms() -> u64 {
    30_000
}

const fn default_pool_max_connections() -> usize {
    10
}

const fn default_pool_max_idle() -> usize {
    5
}

const fn default_pool_idle_timeout_ms() -> u64 {
    30_000
}

const fn default_circuit_break_threshold() -> u32 {
    4
}

const fn default_circuit_break_cooldown_ms() -> u64 {
    15_000
}

const fn default_health_timeout_ms() -> u64 {
    5000
}

impl Default for SynthesisClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_jitter: 0.0,
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            max_read_timeout_ms: default_max_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            pool_timeout_ms: default_pool_timeout_ms(),
            pool_max_connections: default_pool_max_connections(),
            pool_max_idle: default_pool_max_idle(),
            pool_idle_timeout_ms: default_pool_idle_timeout_ms(),
            circuit_break_threshold: default_circuit_break_threshold(),
            circuit_break_cooldown_ms: default_circuit_break_cooldown_ms(),
            health_timeout_ms: default_health_timeout_ms(),
        }
    }
}

impl SynthesisClientConfig {
    /// Create a config pointing at `api_url` with defaults otherwise
    pub fn with_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Default::default()
        }
    }

    /// Per-request deadline for a text of `chars` characters
    ///
    /// The read budget grows by one second per hundred characters, capped
    /// at `max_read_timeout_ms`.
    #[must_use]
    pub fn request_timeout(&self, chars: usize) -> Duration {
        let extra_ms = u64::try_from(chars).unwrap_or(u64::MAX).saturating_mul(10);
        let read_ms = self
            .read_timeout_ms
            .saturating_add(extra_ms)
            .min(self.max_read_timeout_ms.max(self.read_timeout_ms));
        Duration::from_millis(
            self.connect_timeout_ms
                .saturating_add(self.write_timeout_ms)
                .saturating_add(read_ms),
        )
    }

    /// Longest silence tolerated between two reads of one response
    ///
    /// Covers the wait for the first byte as well, so it allows the longest
    /// read budget any text can get. `request_timeout` still bounds the call.
    #[must_use]
    pub fn read_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.max_read_timeout_ms.max(self.read_timeout_ms))
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(format!(
                "API URL must start with http:// or https://, got '{}'",
                self.api_url
            ));
        }

        if self.max_attempts == 0 {
            return Err("Max attempts must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(format!(
                "Retry jitter must be between 0.0 and 1.0, got {}",
                self.retry_jitter
            ));
        }

        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err("Timeouts must be greater than 0".to_string());
        }

        if self.pool_max_connections == 0 {
            return Err("Pool must allow at least one connection".to_string());
        }

        if self.circuit_break_threshold == 0 {
            return Err("Circuit break threshold must be greater than 0".to_string());
        }

        if self.circuit_break_cooldown_ms == 0 {
            return Err("Circuit break cooldown must be greater than 0".to_string());
        }

        Ok(())
    }
}
