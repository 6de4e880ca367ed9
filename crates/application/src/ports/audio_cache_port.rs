//! Audio cache port definition
//!
//! Both cache tiers of the speech pipeline implement this port: the bounded
//! in-memory LRU and the persistent disk cache.

use async_trait::async_trait;
use bytes::Bytes;
use domain::CacheKey;
use serde::Serialize;

use crate::error::ApplicationError;

/// Cache for synthesized audio keyed by request identity
#[async_trait]
pub trait AudioCachePort: Send + Sync + std::fmt::Debug {
    /// Get cached audio
    ///
    /// Returns `None` if the key is unknown, expired or unreadable.
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, ApplicationError>;

    /// Store audio, evicting older entries if the cache is full
    async fn set(&self, key: &CacheKey, audio: Bytes) -> Result<(), ApplicationError>;

    /// Remove a single entry
    async fn remove(&self, key: &CacheKey) -> Result<(), ApplicationError>;

    /// Remove every entry and reset counters
    async fn clear(&self) -> Result<(), ApplicationError>;

    /// Cache statistics
    fn stats(&self) -> AudioCacheStats;
}

/// Audio cache statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AudioCacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Current number of entries
    pub entries: u64,
    /// Configured entry limit
    pub max_entries: u64,
    /// Size of the cached audio in bytes
    pub bytes: u64,
    /// Bytes occupied on disk (equal to `bytes` for memory caches)
    pub stored_bytes: u64,
    /// Entries evicted to make room
    pub evictions: u64,
    /// Entries dropped because their TTL passed
    pub expired: u64,
    /// Whether payloads are compressed
    pub compressed: bool,
}

impl AudioCacheStats {
    /// Calculate the hit rate (0.0 - 1.0)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_handles_empty_stats() {
        assert!(AudioCacheStats::default().hit_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn hit_rate_is_ratio_of_hits() {
        let stats = AudioCacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
