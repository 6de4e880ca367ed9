//! Ordered audio playback
//!
//! A [`PlaybackQueue`] owns one worker thread that plays decoded clips
//! strictly in enqueue order through an [`AudioSink`].

mod queue;
mod sink;
mod wav;

use application::error::ApplicationError;
use domain::DomainError;
use serde::{Deserialize, Serialize};

pub use queue::{PlaybackObserver, PlaybackQueue, PlaybackStart};
#[cfg(feature = "rodio-output")]
pub use sink::RodioSink;
pub use sink::{AudioSink, Interrupt, SilentSink, open_sink};
pub use wav::decode_wav;

/// Envelope values per second handed to playback observers
pub const ENVELOPE_RATE: u32 = 60;

/// Errors raised by decoding or playing audio
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// Audio bytes are not a readable WAV file
    #[error("Failed to decode WAV: {0}")]
    Decode(#[from] hound::Error),

    /// Decoded audio has an unusable format
    #[error(transparent)]
    InvalidAudio(#[from] DomainError),

    /// Output device could not be opened or failed while playing
    #[error("Audio output error: {0}")]
    Device(String),

    /// The queue no longer accepts audio
    #[error("Playback queue is shut down")]
    ShutDown,
}

impl From<PlaybackError> for ApplicationError {
    fn from(err: PlaybackError) -> Self {
        Self::Playback(err.to_string())
    }
}

/// Where audio goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Wait out each clip without producing sound
    #[default]
    Silent,
    /// The default system output device
    System,
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Output gain in [0, 1]
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Pending clips kept before the oldest are dropped (0 = unbounded)
    #[serde(default)]
    pub max_queue_size: usize,

    /// Output device
    #[serde(default)]
    pub output: OutputKind,
}

const fn default_volume() -> f32 {
    1.0
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            max_queue_size: 0,
            output: OutputKind::default(),
        }
    }
}

impl PlaybackConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(format!("volume must be within [0, 1], got {}", self.volume));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PlaybackConfig::default();
        assert!((config.volume - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.output, OutputKind::Silent);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn volume_out_of_range_is_rejected() {
        let config = PlaybackConfig {
            volume: 1.5,
            ..PlaybackConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn output_kind_deserializes_lowercase() {
        let config: PlaybackConfig = toml::from_str(r#"output = "system""#).unwrap();
        assert_eq!(config.output, OutputKind::System);
    }

    #[test]
    fn errors_convert_to_application_errors() {
        let err: ApplicationError = PlaybackError::ShutDown.into();
        assert_eq!(
            err,
            ApplicationError::Playback("Playback queue is shut down".to_string())
        );
    }
}
