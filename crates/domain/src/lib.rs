//! Domain layer for Cadence
//!
//! Contains the core vocabulary of the speech pipeline: synthesis requests,
//! sampling parameters, speech profiles, cache keys and playback items.
//! This layer performs no I/O.

pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::*;
pub use errors::DomainError;
pub use value_objects::*;
