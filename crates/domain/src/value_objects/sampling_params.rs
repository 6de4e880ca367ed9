//! Sampling parameters passed to the synthesis backend
//!
//! # Examples
//!
//! ```
//! use domain::value_objects::SamplingParams;
//!
//! let params = SamplingParams::default();
//! assert_eq!(params.top_k, 5);
//! assert!(params.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Decoding parameters for one synthesis call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Top-k sampling cutoff
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Nucleus sampling probability mass
    #[serde(default = "default_unit")]
    pub top_p: f64,
    /// Sampling temperature
    #[serde(default = "default_unit")]
    pub temperature: f64,
    /// Playback speed multiplier applied by the backend
    #[serde(default = "default_unit")]
    pub speed_factor: f64,
}

const fn default_top_k() -> u32 {
    5
}

const fn default_unit() -> f64 {
    1.0
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            top_p: default_unit(),
            temperature: default_unit(),
            speed_factor: default_unit(),
        }
    }
}

impl SamplingParams {
    /// Check every parameter against the range the backend accepts
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidParameter` naming the first offending field.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.top_k == 0 {
            return Err(DomainError::invalid_parameter("top_k", "must be at least 1"));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(DomainError::invalid_parameter(
                "top_p",
                format!("must be in (0, 1], got {}", self.top_p),
            ));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(DomainError::invalid_parameter(
                "temperature",
                format!("must be positive, got {}", self.temperature),
            ));
        }
        if !(self.speed_factor.is_finite() && self.speed_factor > 0.0) {
            return Err(DomainError::invalid_parameter(
                "speed_factor",
                format!("must be positive, got {}", self.speed_factor),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_defaults() {
        let params = SamplingParams::default();
        assert_eq!(params.top_k, 5);
        assert!((params.top_p - 1.0).abs() < f64::EPSILON);
        assert!((params.temperature - 1.0).abs() < f64::EPSILON);
        assert!((params.speed_factor - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_rejects_zero_top_k() {
        let params = SamplingParams {
            top_k: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_top_p() {
        let mut params = SamplingParams {
            top_p: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
        params.top_p = 1.5;
        assert!(params.validate().is_err());
    }

    #[test]
    fn validate_rejects_nan_temperature() {
        let params = SamplingParams {
            temperature: f64::NAN,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let params: SamplingParams = serde_json::from_str(r#"{"top_k": 7}"#).unwrap();
        assert_eq!(params.top_k, 7);
        assert!((params.speed_factor - 1.0).abs() < f64::EPSILON);
    }
}
