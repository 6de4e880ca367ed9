//! Application services - Use case implementations

mod inflight;
mod speech_service;
mod streaming_speaker;
#[cfg(test)]
mod testing;

pub use inflight::{InflightLease, InflightRegistry, Joined, SharedResult};
pub use speech_service::{
    SpeechService, SpeechServiceConfig, SpeechServiceStats, SynthesisOptions,
};
pub use streaming_speaker::{SpeakReport, SpeakerConfig, StreamingSpeaker};
