//! HTTP client for the synthesis backend
//!
//! One `SynthesisClient` serves one backend endpoint. It keeps a pooled
//! `reqwest::Client`, bounds concurrent connections with a semaphore, retries
//! transient failures with exponential backoff and trips a circuit breaker
//! when the backend keeps failing.
//!
//! # Example
//!
//! ```rust,ignore
//! use ai_speech::{SynthesisClient, SynthesisClientConfig};
//! use domain::SynthesisRequest;
//!
//! let client = SynthesisClient::new(SynthesisClientConfig::default())?;
//! let wav = client.synthesize(&SynthesisRequest::new("你好")).await?;
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use domain::SynthesisRequest;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::config::SynthesisClientConfig;
use crate::error::SynthesisError;
use crate::retry::{RetryPolicy, with_retry};
use crate::stats::ClientStats;

/// Breaker and counters, guarded together
#[derive(Debug)]
struct ClientState {
    breaker: CircuitBreaker,
    stats: ClientStats,
}

/// Resilient client for the synthesis backend
pub struct SynthesisClient {
    config: SynthesisClientConfig,
    retry: RetryPolicy,
    http: Mutex<Option<Client>>,
    slots: Semaphore,
    state: Mutex<ClientState>,
}

impl fmt::Debug for SynthesisClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesisClient")
            .field("api_url", &self.config.api_url)
            .field("connected", &self.http.lock().is_some())
            .field("available_slots", &self.slots.available_permits())
            .field("circuit", &self.circuit_state())
            .finish_non_exhaustive()
    }
}

impl SynthesisClient {
    /// Create a new synthesis client
    ///
    /// The HTTP connection pool is created lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns `SynthesisError::Configuration` if the configuration is invalid.
    pub fn new(config: SynthesisClientConfig) -> Result<Self, SynthesisError> {
        config.validate().map_err(SynthesisError::Configuration)?;

        let breaker = CircuitBreaker::new(
            config.api_url.clone(),
            CircuitBreakerConfig::custom(
                config.circuit_break_threshold,
                Duration::from_millis(config.circuit_break_cooldown_ms),
            ),
        );

        Ok(Self {
            retry: RetryPolicy::from(&config),
            slots: Semaphore::new(config.pool_max_connections),
            http: Mutex::new(None),
            state: Mutex::new(ClientState {
                breaker,
                stats: ClientStats::default(),
            }),
            config,
        })
    }

    /// Configuration in effect
    pub const fn config(&self) -> &SynthesisClientConfig {
        &self.config
    }

    /// Synthesize `request` into audio bytes
    ///
    /// Transient failures are retried with exponential backoff. After all
    /// attempts fail, the failure counts once toward the circuit breaker.
    ///
    /// # Errors
    ///
    /// - `SynthesisError::EmptyText` for blank text, without a network call
    /// - `SynthesisError::CircuitOpen` while the breaker is open
    /// - the last attempt's error otherwise
    #[instrument(skip(self, request), fields(text_len = request.char_count()))]
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<Bytes, SynthesisError> {
        if request.text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        {
            let mut state = self.state.lock();
            if let Err(remaining) = state.breaker.check(Instant::now()) {
                state.stats.circuit_short_circuits += 1;
                return Err(SynthesisError::CircuitOpen {
                    remaining_ms: duration_ms(remaining),
                });
            }
            state.stats.total_requests += 1;
        }

        let mut call = PendingCall::new(&self.state);
        let started = Instant::now();
        let timeout = self.config.request_timeout(request.char_count());
        let payload = request.to_payload();

        let outcome = with_retry(&self.retry, |_, is_last| {
            self.attempt(&payload, timeout, is_last)
        })
        .await;
        call.finish();

        let latency_ms = duration_ms(started.elapsed());
        let mut state = self.state.lock();
        state.stats.total_retries += u64::from(outcome.retries());

        match outcome.result {
            Ok(audio) => {
                state.stats.record_success(latency_ms);
                state.breaker.record_success();
                debug!(
                    audio_size = audio.len(),
                    latency_ms,
                    attempts = outcome.attempts,
                    "Speech synthesis complete"
                );
                Ok(audio)
            },
            Err(err) => {
                state.stats.failed_requests += 1;
                if state.breaker.record_failure(Instant::now()) {
                    state.stats.circuit_open_events += 1;
                }
                warn!(error = %err, attempts = outcome.attempts, "Speech synthesis failed");
                Err(err)
            },
        }
    }

    /// Probe the backend with a lightweight request
    ///
    /// Uses its own short timeout and no connection slot. A 200 answer
    /// closes the circuit breaker.
    #[instrument(skip(self, probe))]
    pub async fn check_health(&self, probe: &SynthesisRequest) -> bool {
        let http = match self.http() {
            Ok(http) => http,
            Err(err) => {
                debug!(error = %err, "Health check could not build HTTP client");
                return false;
            },
        };

        let response = http
            .post(&self.config.api_url)
            .json(&probe.to_payload())
            .timeout(Duration::from_millis(self.config.health_timeout_ms))
            .send()
            .await;

        match response {
            Ok(response) if response.status() == StatusCode::OK => {
                self.state.lock().breaker.record_success();
                true
            },
            Ok(response) => {
                debug!(status = %response.status(), "Health check got non-success status");
                false
            },
            Err(err) => {
                debug!(error = %err, "Health check failed");
                false
            },
        }
    }

    /// Drop pooled connections and reset the circuit breaker
    ///
    /// The client stays usable; a new pool is created on the next call.
    pub fn close(&self) {
        self.http.lock().take();
        self.state.lock().breaker.reset();
        debug!(api_url = %self.config.api_url, "Synthesis client closed");
    }

    /// Snapshot of the client's counters
    pub fn stats(&self) -> ClientStats {
        self.state.lock().stats
    }

    /// Zero all counters
    pub fn reset_stats(&self) {
        self.state.lock().stats = ClientStats::default();
    }

    /// Current circuit breaker state
    pub fn circuit_state(&self) -> CircuitState {
        self.state.lock().breaker.state(Instant::now())
    }

    async fn attempt(
        &self,
        payload: &Map<String, Value>,
        timeout: Duration,
        is_last: bool,
    ) -> Result<Bytes, SynthesisError> {
        let pool_timeout = Duration::from_millis(self.config.pool_timeout_ms);
        let _slot = tokio::time::timeout(pool_timeout, self.slots.acquire())
            .await
            .map_err(|_| SynthesisError::PoolTimeout(self.config.pool_timeout_ms))?
            .map_err(|_| SynthesisError::Configuration("connection pool closed".to_string()))?;

        let http = self.http()?;
        let result = self.send(&http, payload, timeout).await;

        if let Err(err) = &result {
            let stale = err.invalidates_connection()
                || (is_last && matches!(err, SynthesisError::Read(_)));
            if stale {
                debug!(error = %err, "Discarding pooled connections");
                self.invalidate();
            }
        }

        result
    }

    async fn send(
        &self,
        http: &Client,
        payload: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Bytes, SynthesisError> {
        let response = http
            .post(&self.config.api_url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| SynthesisError::from_send(&e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::http_status(status.as_u16(), &body));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::from_body(&e))?;

        if audio.is_empty() {
            return Err(SynthesisError::EmptyResponse);
        }

        Ok(audio)
    }

    /// Pooled HTTP client, built on first use
    fn http(&self) -> Result<Client, SynthesisError> {
        let mut slot = self.http.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(self.config.connect_timeout_ms))
            .read_timeout(self.config.read_idle_timeout())
            .pool_max_idle_per_host(self.config.pool_max_idle)
            .pool_idle_timeout(Duration::from_millis(self.config.pool_idle_timeout_ms))
            .build()
            .map_err(|e| {
                SynthesisError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        *slot = Some(client.clone());
        Ok(client)
    }

    fn invalidate(&self) {
        self.http.lock().take();
    }
}

/// Counts a call as cancelled if it is dropped before finishing
struct PendingCall<'a> {
    state: &'a Mutex<ClientState>,
    finished: bool,
}

impl<'a> PendingCall<'a> {
    const fn new(state: &'a Mutex<ClientState>) -> Self {
        Self {
            state,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.lock().stats.cancelled_requests += 1;
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_invalid_config() {
        let config = SynthesisClientConfig {
            pool_max_connections: 0,
            ..Default::default()
        };
        assert!(matches!(
            SynthesisClient::new(config),
            Err(SynthesisError::Configuration(_))
        ));
    }

    #[test]
    fn starts_closed_with_zero_stats() {
        let client = SynthesisClient::new(SynthesisClientConfig::default()).unwrap();
        assert_eq!(client.circuit_state(), CircuitState::Closed);
        assert_eq!(client.stats(), ClientStats::default());
    }

    #[tokio::test]
    async fn blank_text_is_rejected_locally() {
        let client = SynthesisClient::new(SynthesisClientConfig::default()).unwrap();
        let result = client.synthesize(&SynthesisRequest::new("  \n ")).await;

        assert_eq!(result.unwrap_err(), SynthesisError::EmptyText);
        assert_eq!(client.stats().total_requests, 0);
    }

    #[test]
    fn debug_output_hides_internals() {
        let client = SynthesisClient::new(SynthesisClientConfig::default()).unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("SynthesisClient"));
        assert!(debug.contains("127.0.0.1:9880"));
    }
}
