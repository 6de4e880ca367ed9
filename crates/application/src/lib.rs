//! Application layer - Use cases and orchestration
//!
//! Contains the speech pipeline's use cases and the ports they depend on:
//! sentence segmentation, cached and deduplicated synthesis, and streaming
//! playback. Infrastructure adapters implement the ports.

pub mod error;
pub mod ports;
pub mod sentence_segmenter;
pub mod services;
pub mod speakable_text;

pub use error::ApplicationError;
pub use ports::*;
pub use sentence_segmenter::{SegmenterConfig, SegmenterStats, SentenceSegmenter};
pub use services::*;
