//! Infrastructure adapters
//!
//! Adapters connect application ports to concrete implementations.

mod synthesis_adapter;

pub use synthesis_adapter::SynthesisAdapter;
