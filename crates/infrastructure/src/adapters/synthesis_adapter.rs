//! Synthesis adapter - Implements SynthesisPort using the ai_speech crate

use std::sync::Arc;

use ai_speech::{CircuitState, SynthesisClient, SynthesisClientConfig, SynthesisError};
use application::error::ApplicationError;
use application::ports::{BackendStats, SynthesisPort};
use async_trait::async_trait;
use bytes::Bytes;
use domain::{DomainError, SynthesisRequest};
use tracing::{debug, instrument};

/// Adapter for the HTTP synthesis backend
pub struct SynthesisAdapter {
    client: Arc<SynthesisClient>,
}

impl std::fmt::Debug for SynthesisAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisAdapter")
            .field("client", &"SynthesisClient")
            .finish()
    }
}

impl SynthesisAdapter {
    /// Create a new synthesis adapter
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SynthesisClientConfig) -> Result<Self, ApplicationError> {
        let client = SynthesisClient::new(config).map_err(Self::map_error)?;
        Ok(Self::with_client(Arc::new(client)))
    }

    /// Wrap an existing client
    pub const fn with_client(client: Arc<SynthesisClient>) -> Self {
        Self { client }
    }

    /// The underlying client
    pub fn client(&self) -> &SynthesisClient {
        &self.client
    }

    /// Map synthesis error to application error
    fn map_error(err: SynthesisError) -> ApplicationError {
        match err {
            SynthesisError::HttpStatus { status, body } if (400..500).contains(&status) => {
                ApplicationError::BackendRejected {
                    status,
                    message: body,
                }
            },
            SynthesisError::CircuitOpen { remaining_ms } => {
                ApplicationError::CircuitOpen { remaining_ms }
            },
            SynthesisError::EmptyText => ApplicationError::Domain(DomainError::EmptyText),
            SynthesisError::Configuration(e) => ApplicationError::Configuration(e),
            other => ApplicationError::ExternalService(other.to_string()),
        }
    }
}

#[async_trait]
impl SynthesisPort for SynthesisAdapter {
    #[instrument(skip(self, request), fields(text_len = request.char_count()))]
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Bytes, ApplicationError> {
        let audio = self
            .client
            .synthesize(request)
            .await
            .map_err(Self::map_error)?;
        debug!(size = audio.len(), "Synthesis adapter received audio");
        Ok(audio)
    }

    async fn check_health(&self, probe: &SynthesisRequest) -> bool {
        self.client.check_health(probe).await
    }

    async fn close(&self) {
        self.client.close();
    }

    fn stats(&self) -> BackendStats {
        let stats = self.client.stats();
        BackendStats {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            cancelled_requests: stats.cancelled_requests,
            total_retries: stats.total_retries,
            average_latency_ms: stats.average_latency_ms(),
            last_latency_ms: stats.last_latency_ms,
            circuit_open_events: stats.circuit_open_events,
            circuit_short_circuits: stats.circuit_short_circuits,
            circuit_open: self.client.circuit_state() == CircuitState::Open,
        }
    }
}
