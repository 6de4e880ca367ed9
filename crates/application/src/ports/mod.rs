//! Port definitions for application layer
//!
//! Ports are interfaces that define how the application interacts with
//! external systems. Adapters in the infrastructure layer implement these ports.

mod audio_cache_port;
mod playback_port;
mod synthesis_port;

pub use audio_cache_port::{AudioCachePort, AudioCacheStats};
#[cfg(test)]
pub use playback_port::MockPlaybackPort;
pub use playback_port::PlaybackPort;
#[cfg(test)]
pub use synthesis_port::MockSynthesisPort;
pub use synthesis_port::{BackendStats, SynthesisPort};
