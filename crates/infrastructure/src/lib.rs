//! Infrastructure layer - Adapters for external systems
//!
//! Implements ports defined in the application layer: the HTTP synthesis
//! backend, both audio cache tiers and ordered audio playback. Also loads
//! configuration and sets up logging.

pub mod adapters;
pub mod cache;
pub mod config;
pub mod playback;
pub mod telemetry;

pub use adapters::*;
pub use cache::{
    CacheError, Clock, DiskCacheConfig, ManualClock, MokaAudioCache, PersistentAudioCache,
    SystemClock,
};
pub use config::AppConfig;
pub use playback::{
    AudioSink, OutputKind, PlaybackConfig, PlaybackError, PlaybackQueue, PlaybackStart,
    SilentSink, decode_wav,
};
pub use telemetry::{TelemetryConfig, TelemetryError, init_tracing};
