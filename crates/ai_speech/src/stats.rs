//! Synthesis client statistics

use serde::Serialize;

/// Counters describing the client's traffic so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    /// Calls that passed the circuit breaker
    pub total_requests: u64,
    /// Calls that returned audio
    pub successful_requests: u64,
    /// Calls that failed after all attempts
    pub failed_requests: u64,
    /// Calls dropped by the caller before finishing
    pub cancelled_requests: u64,
    /// Attempts made beyond the first one of each call
    pub total_retries: u64,
    /// Sum of latencies of successful calls
    pub total_latency_ms: u64,
    /// Latency of the most recent successful call
    pub last_latency_ms: u64,
    /// Times the circuit opened
    pub circuit_open_events: u64,
    /// Calls rejected because the circuit was open
    pub circuit_short_circuits: u64,
}

impl ClientStats {
    /// Mean latency over successful calls
    #[allow(clippy::cast_precision_loss)]
    pub fn average_latency_ms(&self) -> f64 {
        if self.successful_requests == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.successful_requests as f64
        }
    }

    pub(crate) fn record_success(&mut self, latency_ms: u64) {
        self.successful_requests += 1;
        self.total_latency_ms = self.total_latency_ms.saturating_add(latency_ms);
        self.last_latency_ms = latency_ms;
    }
}
