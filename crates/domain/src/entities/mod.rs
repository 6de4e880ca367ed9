//! Domain entities - Objects with identity and lifecycle

mod playback_item;
mod synthesis_request;

pub use playback_item::{AmplitudeEnvelope, PlaybackItem};
pub use synthesis_request::{DEFAULT_TEXT_SPLIT_METHOD, SynthesisRequest};
