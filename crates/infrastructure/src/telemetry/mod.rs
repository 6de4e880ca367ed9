//! Logging setup
//!
//! Installs a `tracing` subscriber writing human-readable or JSON lines.
//! `RUST_LOG` overrides the configured filter.

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration for logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "application=debug,ai_speech=trace")
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit JSON lines instead of plain text
    #[serde(default)]
    pub json: bool,

    /// Include source file and line in each event
    #[serde(default)]
    pub with_source_location: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            json: false,
            with_source_location: false,
        }
    }
}

impl TelemetryConfig {
    /// Config using `filter` with every other setting at its default
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            log_filter: filter.into(),
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        EnvFilter::try_new(&self.log_filter)
            .map(|_| ())
            .map_err(|e| format!("invalid log_filter '{}': {e}", self.log_filter))
    }
}

/// Install the global tracing subscriber
///
/// Logs go to stderr so that stdout stays free for command output.
///
/// # Example
///
/// ```ignore
/// use infrastructure::telemetry::{TelemetryConfig, init_tracing};
///
/// init_tracing(&TelemetryConfig::with_filter("debug"))?;
/// ```
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| TelemetryError::Filter(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(config.with_source_location)
                    .with_line_number(config.with_source_location),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(config.with_source_location)
                    .with_line_number(config.with_source_location),
            )
            .try_init()
    };
    result.map_err(|e| TelemetryError::Init(e.to_string()))?;

    info!(filter = %config.log_filter, json = config.json, "Logging initialized");
    Ok(())
}

/// Error type for logging initialization
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Filter directive could not be parsed
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// Failed to initialize tracing subscriber
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}
