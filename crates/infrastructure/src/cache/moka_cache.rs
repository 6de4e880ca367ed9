//! Moka in-memory audio cache
//!
//! Bounded, thread-safe first cache tier. Capacity is counted in entries and
//! the least recently used entry is evicted first.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use application::{
    error::ApplicationError,
    ports::{AudioCachePort, AudioCacheStats},
};
use async_trait::async_trait;
use bytes::Bytes;
use domain::CacheKey;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use tracing::{debug, instrument};

/// Default number of cached clips
const DEFAULT_MAX_ENTRIES: u64 = 100;

/// Moka-based in-memory audio cache
pub struct MokaAudioCache {
    cache: Cache<CacheKey, Bytes>,
    max_entries: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: Arc<AtomicU64>,
}

impl std::fmt::Debug for MokaAudioCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaAudioCache")
            .field("entries", &self.cache.entry_count())
            .field("max_entries", &self.max_entries)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MokaAudioCache {
    /// Create a cache holding at most `max_entries` clips
    #[must_use]
    pub fn new(max_entries: u64) -> Self {
        let max_entries = max_entries.max(1);
        let evictions = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&evictions);

        let cache = Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |_key, _value, cause| {
                if cause.was_evicted() {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();

        Self {
            cache,
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions,
        }
    }

    /// Apply pending evictions so that counts are exact
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }

    fn stored_bytes(&self) -> u64 {
        self.cache.iter().map(|(_, audio)| audio.len() as u64).sum()
    }
}

impl Default for MokaAudioCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl AudioCachePort for MokaAudioCache {
    #[instrument(skip(self), level = "debug")]
    #[allow(clippy::option_if_let_else)]
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, ApplicationError> {
        if let Some(audio) = self.cache.get(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Memory cache hit");
            Ok(Some(audio))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            Ok(None)
        }
    }

    #[instrument(skip(self, audio), level = "debug", fields(size = audio.len()))]
    async fn set(&self, key: &CacheKey, audio: Bytes) -> Result<(), ApplicationError> {
        if audio.is_empty() {
            return Ok(());
        }
        self.cache.insert(key.clone(), audio).await;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), ApplicationError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<(), ApplicationError> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Memory cache cleared");
        Ok(())
    }

    fn stats(&self) -> AudioCacheStats {
        let bytes = self.stored_bytes();
        AudioCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
            max_entries: self.max_entries,
            bytes,
            stored_bytes: bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
            expired: 0,
            compressed: false,
        }
    }
}
