//! Domain-level errors

use thiserror::Error;

/// Errors that can occur in the domain layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Text contained nothing speakable after normalization
    #[error("Text is empty after normalization")]
    EmptyText,

    /// A sampling parameter was outside its valid range
    #[error("Invalid sampling parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Audio buffer could not be represented as a playback item
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    /// Validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl DomainError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameter_creates_correct_error() {
        let err = DomainError::invalid_parameter("top_p", "must be in (0, 1]");
        match err {
            DomainError::InvalidParameter { name, reason } => {
                assert_eq!(name, "top_p");
                assert_eq!(reason, "must be in (0, 1]");
            },
            _ => unreachable!("Expected InvalidParameter error"),
        }
    }

    #[test]
    fn error_messages_are_readable() {
        assert_eq!(
            DomainError::EmptyText.to_string(),
            "Text is empty after normalization"
        );
        assert_eq!(
            DomainError::invalid_parameter("top_k", "must be at least 1").to_string(),
            "Invalid sampling parameter top_k: must be at least 1"
        );
        assert_eq!(
            DomainError::InvalidAudio("zero channels".to_string()).to_string(),
            "Invalid audio: zero channels"
        );
    }
}
