//! Value Objects - Immutable, identity-less domain primitives

mod cache_key;
mod language_pair;
mod sampling_params;
mod speech_profile;

pub use cache_key::CacheKey;
pub use language_pair::LanguagePair;
pub use sampling_params::SamplingParams;
pub use speech_profile::SpeechProfile;
