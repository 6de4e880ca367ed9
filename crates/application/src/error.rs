//! Application-level errors

use domain::DomainError;
use thiserror::Error;

/// Errors that can occur in the application layer
///
/// Cloneable so that one synthesis outcome can be handed to every caller
/// waiting on the same request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplicationError {
    /// Domain-level error
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Backend refused the request; retrying will not help
    #[error("Speech backend rejected the request (HTTP {status}): {message}")]
    BackendRejected {
        /// HTTP status code
        status: u16,
        /// Backend error message
        message: String,
    },

    /// Backend calls are suspended by the circuit breaker
    #[error("Speech backend unavailable, retry in {remaining_ms}ms")]
    CircuitOpen {
        /// Time until calls are allowed again
        remaining_ms: u64,
    },

    /// External service error
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Cache read or write failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Audio could not be decoded or played
    #[error("Playback error: {0}")]
    Playback(String),

    /// The request was abandoned before it finished
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService(_) | Self::CircuitOpen { .. })
    }

    /// Whether the input text itself was the problem
    pub const fn is_empty_text(&self) -> bool {
        matches!(self, Self::Domain(DomainError::EmptyText))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_convert() {
        let err: ApplicationError = DomainError::EmptyText.into();
        assert!(err.is_empty_text());
        assert_eq!(err.to_string(), "Text is empty after normalization");
    }

    #[test]
    fn retryable_classification() {
        assert!(ApplicationError::ExternalService("timeout".into()).is_retryable());
        assert!(ApplicationError::CircuitOpen { remaining_ms: 5 }.is_retryable());
        assert!(
            !ApplicationError::BackendRejected {
                status: 400,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!ApplicationError::Cancelled.is_retryable());
    }

    #[test]
    fn errors_are_cloneable() {
        let err = ApplicationError::ExternalService("down".into());
        assert_eq!(err.clone(), err);
    }
}
