//! Audio cache implementations
//!
//! Provides the two cache tiers used by the speech service:
//! - `MokaAudioCache`: bounded in-memory LRU
//! - `PersistentAudioCache`: gzip-compressed files with a JSON index, TTL
//!   expiry and LRU eviction by count and size

mod clock;
mod disk_cache;
mod moka_cache;

pub use clock::{Clock, ManualClock, SystemClock};
pub use disk_cache::{CacheEntry, CacheError, DiskCacheConfig, INDEX_VERSION, PersistentAudioCache};
pub use moka_cache::MokaAudioCache;
