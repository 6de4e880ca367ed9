//! Persistent audio cache
//!
//! Second cache tier, surviving restarts. Layout under the cache root:
//!
//! ```text
//! <root>/cache_index.json   {"version": 3, "entries": {...}, "updated_at": <unix secs>}
//! <root>/audio/<key>.bin    one clip per entry, gzip-compressed if flagged
//! ```
//!
//! Files and the index are written to a temporary name and renamed into
//! place, so a crash never leaves a half-written file under a live name.
//! Entries are evicted least recently used first, by count and then by size.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use application::{
    error::ApplicationError,
    ports::{AudioCachePort, AudioCacheStats},
};
use async_trait::async_trait;
use bytes::Bytes;
use domain::CacheKey;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};

/// Index format understood by this version
pub const INDEX_VERSION: u32 = 3;

const INDEX_FILE: &str = "cache_index.json";
const AUDIO_DIR: &str = "audio";
const MAX_KEY_LEN: usize = 128;

/// Errors raised inside the disk cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// File system operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Index could not be encoded or decoded
    #[error("Cache index error: {0}")]
    Index(#[from] serde_json::Error),

    /// Key contains characters that are unsafe in file names
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    /// Blocking task failed
    #[error("Cache task failed: {0}")]
    Task(String),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<CacheError> for ApplicationError {
    fn from(err: CacheError) -> Self {
        Self::Cache(err.to_string())
    }
}

/// Disk cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCacheConfig {
    /// Whether the disk tier is used at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cache root directory
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Maximum number of entries (0 = unbounded)
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// Maximum bytes on disk (0 = unbounded)
    #[serde(default)]
    pub max_bytes: u64,

    /// Entry lifetime in seconds (0 = forever)
    #[serde(default)]
    pub ttl_secs: u64,

    /// Gzip clips before writing them
    #[serde(default = "default_compress")]
    pub compress: bool,
}

const fn default_enabled() -> bool {
    true
}

fn default_dir() -> PathBuf {
    PathBuf::from("data/tts_cache")
}

const fn default_max_entries() -> u64 {
    400
}

const fn default_compress() -> bool {
    true
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            dir: default_dir(),
            max_entries: default_max_entries(),
            max_bytes: 0,
            ttl_secs: 0,
            compress: default_compress(),
        }
    }
}

impl DiskCacheConfig {
    /// Config rooted at `dir` with every other setting at its default
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.dir.as_os_str().is_empty() {
            return Err("disk cache dir must not be empty".to_string());
        }
        Ok(())
    }
}

/// One cached clip as recorded in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key
    pub key: String,
    /// File name under the audio directory
    pub filename: String,
    /// Size of the clip in bytes
    pub size: u64,
    /// Size of the file on disk
    pub disk_size: u64,
    /// Last access, Unix seconds
    pub timestamp: f64,
    /// Number of reads served
    pub hits: u64,
    /// Whether the file is gzip-compressed
    pub compressed: bool,
    /// Expiry, Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<f64>,
}

impl CacheEntry {
    fn is_expired(&self, now: f64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
    #[serde(default)]
    updated_at: f64,
}

#[derive(Debug, Default)]
struct IndexState {
    entries: BTreeMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expired: u64,
}

impl IndexState {
    fn disk_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.disk_size).sum()
    }

    fn least_recently_used(&self) -> Option<String> {
        self.entries
            .values()
            .min_by(|a, b| a.timestamp.total_cmp(&b.timestamp))
            .map(|e| e.key.clone())
    }
}

struct Inner {
    config: DiskCacheConfig,
    audio_dir: PathBuf,
    index_path: PathBuf,
    clock: Arc<dyn Clock>,
    state: Mutex<IndexState>,
}

/// Disk-backed audio cache
#[derive(Clone)]
pub struct PersistentAudioCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PersistentAudioCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentAudioCache")
            .field("dir", &self.inner.config.dir)
            .field("entries", &self.inner.state.lock().entries.len())
            .field("compress", &self.inner.config.compress)
            .finish_non_exhaustive()
    }
}

impl PersistentAudioCache {
    /// Open (or create) the cache described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directories cannot be created.
    pub fn open(config: DiskCacheConfig) -> Result<Self, CacheError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Open the cache with a custom time source
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directories cannot be created.
    pub fn with_clock(config: DiskCacheConfig, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        let audio_dir = config.dir.join(AUDIO_DIR);
        fs::create_dir_all(&audio_dir).map_err(|e| CacheError::io(&audio_dir, e))?;

        let inner = Inner {
            index_path: config.dir.join(INDEX_FILE),
            audio_dir,
            config,
            clock,
            state: Mutex::new(IndexState::default()),
        };
        inner.load_index()?;

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Configuration in effect
    pub fn config(&self) -> &DiskCacheConfig {
        &self.inner.config
    }

    /// Snapshot of the index entry for `key`
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.inner.state.lock().entries.get(key).cloned()
    }

    /// Read a clip, blocking the calling thread
    pub fn get_blocking(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.inner.get(key)
    }

    /// Store a clip, blocking the calling thread
    pub fn set_blocking(&self, key: &str, audio: &[u8]) -> Result<(), CacheError> {
        self.inner.set(key, audio)
    }

    /// Remove a clip, blocking the calling thread
    pub fn remove_blocking(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(key)
    }

    /// Remove every clip, blocking the calling thread
    pub fn clear_blocking(&self) -> Result<(), CacheError> {
        self.inner.clear()
    }

    async fn run<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, CacheError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

impl Inner {
    fn path_for(&self, filename: &str) -> PathBuf {
        self.audio_dir.join(filename)
    }

    fn load_index(&self) -> Result<(), CacheError> {
        let raw = match fs::read(&self.index_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CacheError::io(&self.index_path, e)),
        };

        let index: IndexFile = match serde_json::from_slice(&raw) {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %self.index_path.display(), error = %e, "Unreadable cache index, starting empty");
                return Ok(());
            },
        };
        if index.version != INDEX_VERSION {
            warn!(
                found = index.version,
                expected = INDEX_VERSION,
                "Cache index version mismatch, starting empty"
            );
            return Ok(());
        }

        let now = self.clock.now();
        let total = index.entries.len();
        let mut state = self.state.lock();
        for (key, entry) in index.entries {
            let path = self.path_for(&entry.filename);
            if entry.is_expired(now) {
                state.expired += 1;
                remove_file_quietly(&path);
            } else if path.is_file() {
                state.entries.insert(key, entry);
            }
        }

        let kept = state.entries.len();
        debug!(kept, dropped = total - kept, "Cache index loaded");
        if kept != total {
            self.save_index(&state)?;
        }
        Ok(())
    }

    fn save_index(&self, state: &IndexState) -> Result<(), CacheError> {
        let index = IndexFile {
            version: INDEX_VERSION,
            entries: state.entries.clone(),
            updated_at: self.clock.now(),
        };
        let encoded = serde_json::to_vec_pretty(&index)?;
        write_atomically(&self.index_path, &encoded)
    }

    /// Save the index on a path whose result does not depend on it
    fn save_index_quietly(&self, state: &IndexState) {
        if let Err(e) = self.save_index(state) {
            warn!(path = %self.index_path.display(), error = %e, "Failed to save cache index");
        }
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let Some(entry) = state.entries.get(key).cloned() else {
            state.misses += 1;
            return Ok(None);
        };

        if entry.is_expired(now) {
            debug!(key, "Disk cache entry expired");
            self.purge(&mut state, &entry);
            state.expired += 1;
            state.misses += 1;
            self.save_index_quietly(&state);
            return Ok(None);
        }

        let path = self.path_for(&entry.filename);
        let audio = fs::read(&path).and_then(|raw| {
            if entry.compressed {
                decompress(&raw)
            } else {
                Ok(raw)
            }
        });

        match audio {
            Ok(audio) => {
                state.hits += 1;
                if let Some(live) = state.entries.get_mut(key) {
                    live.timestamp = now;
                    live.hits += 1;
                }
                self.save_index_quietly(&state);
                Ok(Some(audio))
            },
            Err(e) => {
                warn!(key, error = %e, "Unreadable cache file, dropping entry");
                self.purge(&mut state, &entry);
                state.misses += 1;
                self.save_index_quietly(&state);
                Ok(None)
            },
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn set(&self, key: &str, audio: &[u8]) -> Result<(), CacheError> {
        if audio.is_empty() {
            return Ok(());
        }
        validate_key(key)?;

        let payload = if self.config.compress {
            compress(audio).map_err(|e| CacheError::io(&self.audio_dir, e))?
        } else {
            audio.to_vec()
        };
        let disk_size = payload.len() as u64;
        let now = self.clock.now();

        let mut state = self.state.lock();
        if let Some(previous) = state.entries.remove(key) {
            remove_file_quietly(&self.path_for(&previous.filename));
        }
        self.make_room(&mut state, disk_size);

        let filename = format!("{key}.bin");
        let path = self.path_for(&filename);
        if let Err(e) = write_atomically(&path, &payload) {
            self.save_index_quietly(&state);
            return Err(e);
        }

        state.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                filename,
                size: audio.len() as u64,
                disk_size,
                timestamp: now,
                hits: 0,
                compressed: self.config.compress,
                expires_at: (self.config.ttl_secs > 0).then(|| now + self.config.ttl_secs as f64),
            },
        );
        self.save_index(&state)?;

        debug!(key, size = audio.len(), disk_size, "Disk cache set");
        Ok(())
    }

    /// Evict until an entry of `incoming` bytes fits both limits
    fn make_room(&self, state: &mut IndexState, incoming: u64) {
        let max_entries = self.config.max_entries;
        while max_entries > 0 && state.entries.len() as u64 >= max_entries {
            if !self.evict_one(state) {
                break;
            }
        }

        let max_bytes = self.config.max_bytes;
        while max_bytes > 0 && state.disk_bytes() + incoming > max_bytes {
            if !self.evict_one(state) {
                break;
            }
        }
    }

    fn evict_one(&self, state: &mut IndexState) -> bool {
        let Some(victim) = state.least_recently_used() else {
            return false;
        };
        if let Some(entry) = state.entries.remove(&victim) {
            remove_file_quietly(&self.path_for(&entry.filename));
            state.evictions += 1;
            debug!(key = %victim, "Disk cache entry evicted");
        }
        true
    }

    fn purge(&self, state: &mut IndexState, entry: &CacheEntry) {
        state.entries.remove(&entry.key);
        remove_file_quietly(&self.path_for(&entry.filename));
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get(key).cloned() {
            self.purge(&mut state, &entry);
            self.save_index(&state)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock();
        let dir = fs::read_dir(&self.audio_dir).map_err(|e| CacheError::io(&self.audio_dir, e))?;
        for file in dir.flatten() {
            remove_file_quietly(&file.path());
        }
        *state = IndexState::default();
        self.save_index(&state)?;
        info!(dir = %self.audio_dir.display(), "Disk cache cleared");
        Ok(())
    }

    fn stats(&self) -> AudioCacheStats {
        let state = self.state.lock();
        AudioCacheStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.entries.len() as u64,
            max_entries: self.config.max_entries,
            bytes: state.entries.values().map(|e| e.size).sum(),
            stored_bytes: state.disk_bytes(),
            evictions: state.evictions,
            expired: state.expired,
            compressed: self.config.compress,
        }
    }
}

#[async_trait]
impl AudioCachePort for PersistentAudioCache {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, ApplicationError> {
        let key = key.as_str().to_string();
        let audio = self.run(move |inner| inner.get(&key)).await?;
        Ok(audio.map(Bytes::from))
    }

    #[instrument(skip(self, audio), level = "debug", fields(size = audio.len()))]
    async fn set(&self, key: &CacheKey, audio: Bytes) -> Result<(), ApplicationError> {
        let key = key.as_str().to_string();
        self.run(move |inner| inner.set(&key, &audio)).await?;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), ApplicationError> {
        let key = key.as_str().to_string();
        self.run(move |inner| inner.remove(&key)).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), ApplicationError> {
        self.run(Inner::clear).await?;
        Ok(())
    }

    fn stats(&self) -> AudioCacheStats {
        self.inner.stats()
    }
}

fn validate_key(key: &str) -> Result<(), CacheError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

fn write_atomically(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).map_err(|e| CacheError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        remove_file_quietly(&tmp);
        CacheError::io(path, e)
    })
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}
