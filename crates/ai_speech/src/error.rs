//! Synthesis client errors

use thiserror::Error;

/// Maximum number of bytes of an error body kept in `HttpStatus`
const MAX_ERROR_BODY: usize = 200;

/// Errors that can occur while talking to the synthesis backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SynthesisError {
    /// The request did not finish within its deadline
    #[error("Request timed out")]
    Timeout,

    /// Could not establish a connection
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Sending the request failed
    #[error("Sending request failed: {0}")]
    Write(String),

    /// Reading the response failed
    #[error("Reading response failed: {0}")]
    Read(String),

    /// No connection slot became free in time
    #[error("Timed out after {0}ms waiting for a connection slot")]
    PoolTimeout(u64),

    /// Backend answered with a non-success status
    #[error("Backend returned HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Beginning of the response body
        body: String,
    },

    /// Backend answered 200 with no audio
    #[error("Backend returned an empty audio body")]
    EmptyResponse,

    /// Circuit breaker is open
    #[error("Circuit open, backend calls suspended for another {remaining_ms}ms")]
    CircuitOpen {
        /// Time until the circuit closes again
        remaining_ms: u64,
    },

    /// Nothing to synthesize
    #[error("Text cannot be empty")]
    EmptyText,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SynthesisError {
    /// Create an HTTP status error, truncating the body
    pub fn http_status(status: u16, body: &str) -> Self {
        let body = match body.char_indices().nth(MAX_ERROR_BODY) {
            Some((idx, _)) => body[..idx].to_string(),
            None => body.to_string(),
        };
        Self::HttpStatus { status, body }
    }

    /// Whether another attempt may succeed
    ///
    /// Transport failures, server errors and empty bodies are retried;
    /// client errors and local rejections are not.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout
            | Self::Connect(_)
            | Self::Write(_)
            | Self::Read(_)
            | Self::PoolTimeout(_)
            | Self::EmptyResponse => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::CircuitOpen { .. } | Self::EmptyText | Self::Configuration(_) => false,
        }
    }

    /// Whether the pooled HTTP client should be discarded after this error
    pub const fn invalidates_connection(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Write(_))
    }

    /// Map an error raised while sending a request
    pub fn from_send(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Read(err.to_string())
        } else if err.is_builder() {
            Self::Configuration(err.to_string())
        } else {
            Self::Write(err.to_string())
        }
    }

    /// Map an error raised while reading a response body
    pub fn from_body(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Read(err.to_string())
        }
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_send(&err)
    }
}
