//! Synthesis port - Interface to the text-to-speech backend

use async_trait::async_trait;
use bytes::Bytes;
use domain::SynthesisRequest;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;

use crate::error::ApplicationError;

/// Traffic counters reported by a synthesis backend adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendStats {
    /// Calls that reached the backend
    pub total_requests: u64,
    /// Calls that returned audio
    pub successful_requests: u64,
    /// Calls that failed after all attempts
    pub failed_requests: u64,
    /// Calls abandoned by the caller
    pub cancelled_requests: u64,
    /// Extra attempts made by retries
    pub total_retries: u64,
    /// Mean latency of successful calls
    pub average_latency_ms: f64,
    /// Latency of the most recent successful call
    pub last_latency_ms: u64,
    /// Times the circuit breaker opened
    pub circuit_open_events: u64,
    /// Calls rejected while the circuit was open
    pub circuit_short_circuits: u64,
    /// Whether the circuit is open right now
    pub circuit_open: bool,
}

/// Port for speech synthesis
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SynthesisPort: Send + Sync {
    /// Synthesize a request into encoded audio (WAV)
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Bytes, ApplicationError>;

    /// Check whether the backend answers `probe`
    async fn check_health(&self, probe: &SynthesisRequest) -> bool;

    /// Release connections and reset failure tracking
    async fn close(&self);

    /// Traffic counters
    fn stats(&self) -> BackendStats;
}
