//! AI Speech - client for the speech synthesis backend
//!
//! Talks to an HTTP text-to-speech backend that accepts a JSON request and
//! answers with WAV audio. The client is built to survive a backend that is
//! slow, occasionally down and limited in how many requests it can serve at
//! once:
//!
//! - `retry` retries transient failures with exponential backoff
//! - `circuit_breaker` stops calling a backend that keeps failing
//! - `client` bounds concurrent connections and reuses pooled ones
//!
//! # Example
//!
//! ```ignore
//! use ai_speech::{SynthesisClient, SynthesisClientConfig};
//! use domain::SynthesisRequest;
//!
//! let client = SynthesisClient::new(SynthesisClientConfig::default())?;
//! let request = SynthesisRequest::new("今天天气真好。").with_reference("ref.wav", "参考");
//! let wav = client.synthesize(&request).await?;
//! ```

pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod stats;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::SynthesisClient;
pub use config::SynthesisClientConfig;
pub use error::SynthesisError;
pub use retry::{RetryPolicy, Retryable};
pub use stats::ClientStats;
