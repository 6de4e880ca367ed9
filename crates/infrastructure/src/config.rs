//! Application configuration

use std::path::Path;

use ai_speech::SynthesisClientConfig;
use application::{SpeakerConfig, SpeechServiceConfig};
use serde::{Deserialize, Serialize};

use crate::cache::DiskCacheConfig;
use crate::playback::PlaybackConfig;
use crate::telemetry::TelemetryConfig;

/// Config file looked up in the working directory (any supported extension)
pub const DEFAULT_CONFIG_NAME: &str = "cadence";

/// Prefix of environment overrides, e.g. `CADENCE__SYNTHESIS__API_URL`
pub const ENV_PREFIX: &str = "CADENCE";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Synthesis backend connection
    #[serde(default)]
    pub synthesis: SynthesisClientConfig,

    /// Request defaults, memory cache and concurrency
    #[serde(default)]
    pub speech: SpeechServiceConfig,

    /// Live text segmentation
    #[serde(default)]
    pub speaker: SpeakerConfig,

    /// Persistent audio cache
    #[serde(default)]
    pub disk_cache: DiskCacheConfig,

    /// Audio output
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Logging
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from `cadence.{toml,json,...}` if present and the
    /// environment
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from `path` (or the default file) and the environment
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load_from(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let builder = config::Config::builder()
            .add_source(file)
            // Override with environment variables (e.g., CADENCE__SPEECH__SEED=42)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate every section, naming the first one that fails
    pub fn validate(&self) -> Result<(), String> {
        self.synthesis
            .validate()
            .map_err(|e| format!("synthesis: {e}"))?;
        self.speech.validate().map_err(|e| format!("speech: {e}"))?;
        if self.speaker.segmenter.max_buffer_chars == 0 {
            return Err("speaker: segmenter.max_buffer_chars must be at least 1".to_string());
        }
        self.disk_cache
            .validate()
            .map_err(|e| format!("disk_cache: {e}"))?;
        self.playback
            .validate()
            .map_err(|e| format!("playback: {e}"))?;
        self.telemetry
            .validate()
            .map_err(|e| format!("telemetry: {e}"))?;
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
