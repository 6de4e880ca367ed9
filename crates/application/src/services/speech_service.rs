//! Speech service - Cached, deduplicated text-to-speech orchestration
//!
//! Every call goes through the same pipeline:
//!
//! 1. normalize the text and reject it if nothing speakable remains
//! 2. build the backend request from configured defaults and per-call options
//! 3. look the request up in the memory cache, then the disk cache
//! 4. join an identical request that is already running, if any
//! 5. otherwise take a concurrency permit, call the backend and store the
//!    audio in both cache tiers
//!
//! Cache failures never fail a call; they are logged and treated as misses.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use domain::{CacheKey, DomainError, LanguagePair, SamplingParams, SpeechProfile, SynthesisRequest};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::{AudioCachePort, AudioCacheStats, BackendStats, SynthesisPort};
use crate::sentence_segmenter::{SegmenterConfig, SentenceSegmenter};
use crate::services::inflight::{InflightRegistry, Joined};
use crate::speakable_text::normalize_text;

/// Text used to probe the backend
const HEALTH_PROBE_TEXT: &str = "测试";

/// Defaults applied to every synthesis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechServiceConfig {
    /// Reference audio path on the backend host
    #[serde(default)]
    pub ref_audio_path: String,

    /// Transcript of the reference audio
    #[serde(default)]
    pub ref_text: String,

    /// Language of the synthesized text
    #[serde(default = "default_lang")]
    pub text_lang: String,

    /// Language of the reference transcript
    #[serde(default = "default_lang")]
    pub prompt_lang: String,

    /// Default sampling parameters
    #[serde(flatten)]
    pub params: SamplingParams,

    /// Backend text split method
    #[serde(default = "default_text_split_method")]
    pub text_split_method: String,

    /// Backend batch size
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Backend random seed (-1 picks a random seed per call)
    #[serde(default = "default_seed")]
    pub seed: i64,

    /// Entries kept by the in-memory cache
    #[serde(default = "default_memory_cache_size")]
    pub memory_cache_size: u64,

    /// Backend calls allowed to run at the same time
    #[serde(default = "default_max_parallel_requests")]
    pub max_parallel_requests: usize,

    /// Strong minimum sentence length when splitting paragraphs
    #[serde(default = "default_paragraph_min_sentence_length")]
    pub paragraph_min_sentence_length: usize,
}

fn default_lang() -> String {
    "zh".to_string()
}

fn default_text_split_method() -> String {
    domain::DEFAULT_TEXT_SPLIT_METHOD.to_string()
}

const fn default_batch_size() -> u32 {
    1
}

const fn default_seed() -> i64 {
    -1
}

const fn default_memory_cache_size() -> u64 {
    100
}

const fn default_max_parallel_requests() -> usize {
    2
}

const fn default_paragraph_min_sentence_length() -> usize {
    8
}

impl Default for SpeechServiceConfig {
    fn default() -> Self {
        Self {
            ref_audio_path: String::new(),
            ref_text: String::new(),
            text_lang: default_lang(),
            prompt_lang: default_lang(),
            params: SamplingParams::default(),
            text_split_method: default_text_split_method(),
            batch_size: default_batch_size(),
            seed: default_seed(),
            memory_cache_size: default_memory_cache_size(),
            max_parallel_requests: default_max_parallel_requests(),
            paragraph_min_sentence_length: default_paragraph_min_sentence_length(),
        }
    }
}

impl SpeechServiceConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        self.params.validate().map_err(|e| e.to_string())?;
        if self.max_parallel_requests == 0 {
            return Err("max_parallel_requests must be at least 1".to_string());
        }
        if self.memory_cache_size == 0 {
            return Err("memory_cache_size must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.text_lang.trim().is_empty() || self.prompt_lang.trim().is_empty() {
            return Err("text_lang and prompt_lang must not be empty".to_string());
        }
        Ok(())
    }

    /// Configured language pair
    pub fn languages(&self) -> LanguagePair {
        LanguagePair::new(&self.text_lang, &self.prompt_lang)
    }
}

/// Per-call overrides of the configured defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisOptions {
    /// Reference audio path
    pub ref_audio_path: Option<String>,
    /// Reference transcript
    pub ref_text: Option<String>,
    /// Language pair
    pub languages: Option<LanguagePair>,
    /// Sampling parameters before profile shaping
    pub params: Option<SamplingParams>,
    /// Backend text split method
    pub text_split_method: Option<String>,
    /// Extra wire fields, overriding configured `batch_size` and `seed`
    pub extras: BTreeMap<String, Value>,
    /// Mood, energy and style of the speaker
    pub profile: Option<SpeechProfile>,
}

impl SynthesisOptions {
    /// Options that use every configured default
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different reference voice
    #[must_use]
    pub fn with_reference(mut self, audio_path: impl Into<String>, text: impl Into<String>) -> Self {
        self.ref_audio_path = Some(audio_path.into());
        self.ref_text = Some(text.into());
        self
    }

    /// Override the language pair
    #[must_use]
    pub fn with_languages(mut self, languages: LanguagePair) -> Self {
        self.languages = Some(languages);
        self
    }

    /// Override the sampling parameters
    #[must_use]
    pub const fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Add an extra wire field
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Shape the request with a speech profile
    #[must_use]
    pub fn with_profile(mut self, profile: SpeechProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

/// Counters of the speech service and its collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpeechServiceStats {
    /// Calls to `synthesize_text`, including batch members
    pub total_requests: u64,
    /// Calls answered from either cache tier
    pub cache_hits: u64,
    /// Calls that missed both cache tiers
    pub cache_misses: u64,
    /// Calls that waited on an identical running request
    pub inflight_waits: u64,
    /// Distinct requests running right now
    pub active_inflight: usize,
    /// Memory cache counters
    pub memory: AudioCacheStats,
    /// Disk cache counters, if a disk cache is attached
    pub disk: Option<AudioCacheStats>,
    /// Backend counters
    pub backend: BackendStats,
}

impl SpeechServiceStats {
    /// Share of calls answered from cache (0.0 - 1.0)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Text-to-speech orchestrator
pub struct SpeechService {
    config: SpeechServiceConfig,
    synthesizer: Arc<dyn SynthesisPort>,
    memory: Arc<dyn AudioCachePort>,
    disk: Option<Arc<dyn AudioCachePort>>,
    inflight: InflightRegistry,
    permits: Semaphore,
    closing: Notify,
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    inflight_waits: AtomicU64,
}

impl fmt::Debug for SpeechService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechService")
            .field("config", &self.config)
            .field("memory", &self.memory)
            .field("disk", &self.disk)
            .field("inflight", &self.inflight)
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl SpeechService {
    /// Create a speech service with a memory cache only
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Configuration` if the configuration is invalid.
    pub fn new(
        config: SpeechServiceConfig,
        synthesizer: Arc<dyn SynthesisPort>,
        memory: Arc<dyn AudioCachePort>,
    ) -> Result<Self, ApplicationError> {
        config.validate().map_err(ApplicationError::Configuration)?;

        Ok(Self {
            permits: Semaphore::new(config.max_parallel_requests),
            config,
            synthesizer,
            memory,
            disk: None,
            inflight: InflightRegistry::new(),
            closing: Notify::new(),
            total_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            inflight_waits: AtomicU64::new(0),
        })
    }

    /// Attach a persistent second cache tier
    #[must_use]
    pub fn with_disk_cache(mut self, disk: Arc<dyn AudioCachePort>) -> Self {
        self.disk = Some(disk);
        self
    }

    /// Configuration in effect
    pub const fn config(&self) -> &SpeechServiceConfig {
        &self.config
    }

    /// Synthesize one piece of text into encoded audio
    ///
    /// # Errors
    ///
    /// - `Domain(EmptyText)` if nothing speakable remains after normalization
    /// - `Domain(InvalidParameter)` for out-of-range sampling parameters
    /// - `Cancelled` if the request that this call waited on was abandoned
    /// - the backend error otherwise, shared with every caller of the same request
    #[instrument(skip(self, text, options), fields(text_len = text.len()))]
    pub async fn synthesize_text(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<Bytes, ApplicationError> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let text = normalize_text(text);
        if text.is_empty() {
            return Err(DomainError::EmptyText.into());
        }

        let request = self.build_request(text, options)?;
        let key = request.cache_key();

        if let Some(audio) = self.cached(&key).await {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Speech cache hit");
            return Ok(audio);
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        match self.inflight.join(&key) {
            Joined::Follower(shared) => {
                self.inflight_waits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Waiting on identical request in flight");
                shared.await
            },
            Joined::Leader(lease) => {
                let result = self.synthesize_uncached(&key, &request).await;
                lease.complete(result.clone());
                result
            },
        }
    }

    /// Synthesize several texts concurrently
    ///
    /// Results come back in input order; each slot fails independently.
    #[instrument(skip(self, texts, options), fields(count = texts.len()))]
    pub async fn synthesize_sentences<S>(
        &self,
        texts: &[S],
        options: &SynthesisOptions,
    ) -> Vec<Result<Bytes, ApplicationError>>
    where
        S: AsRef<str> + Sync,
    {
        let mut slots: Vec<Option<Result<Bytes, ApplicationError>>> =
            (0..texts.len()).map(|_| None).collect();

        let mut jobs: FuturesUnordered<_> = texts
            .iter()
            .enumerate()
            .map(|(idx, text)| async move { (idx, self.synthesize_text(text.as_ref(), options).await) })
            .collect();

        while let Some((idx, result)) = jobs.next().await {
            slots[idx] = Some(result);
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(ApplicationError::Internal("batch slot left empty".into())))
            })
            .collect()
    }

    /// Split a paragraph into sentences and synthesize them concurrently
    ///
    /// Uses a stricter sentence minimum than live streaming so that short
    /// fragments are merged into their neighbours.
    #[instrument(skip(self, text, options), fields(text_len = text.len()))]
    pub async fn synthesize_paragraph(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Vec<Result<Bytes, ApplicationError>> {
        let mut segmenter = SentenceSegmenter::new(SegmenterConfig::for_min_length(
            self.config.paragraph_min_sentence_length,
        ));
        let mut sentences = segmenter.feed(text);
        sentences.extend(segmenter.flush());

        debug!(sentences = sentences.len(), "Paragraph split");
        self.synthesize_sentences(&sentences, options).await
    }

    /// Probe the backend with a tiny request
    #[instrument(skip(self))]
    pub async fn check_service(&self) -> bool {
        let options = SynthesisOptions::new().with_params(SamplingParams {
            top_k: 1,
            ..self.config.params
        });
        match self.build_request(HEALTH_PROBE_TEXT.to_string(), &options) {
            Ok(probe) => self.synthesizer.check_health(&probe).await,
            Err(err) => {
                warn!(error = %err, "Could not build health probe");
                false
            },
        }
    }

    /// Empty both cache tiers
    ///
    /// # Errors
    ///
    /// Returns the first cache error encountered.
    pub async fn clear_cache(&self) -> Result<(), ApplicationError> {
        self.memory.clear().await?;
        if let Some(disk) = &self.disk {
            disk.clear().await?;
        }
        info!("Speech caches cleared");
        Ok(())
    }

    /// Abandon running requests, release backend connections and drop the
    /// memory cache
    ///
    /// The service stays usable afterwards.
    pub async fn close(&self) {
        self.closing.notify_waiters();
        self.synthesizer.close().await;
        if let Err(err) = self.memory.clear().await {
            warn!(error = %err, "Failed to clear memory cache on close");
        }
        debug!("Speech service closed");
    }

    /// Snapshot of all counters
    pub fn stats(&self) -> SpeechServiceStats {
        SpeechServiceStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            inflight_waits: self.inflight_waits.load(Ordering::Relaxed),
            active_inflight: self.inflight.len(),
            memory: self.memory.stats(),
            disk: self.disk.as_ref().map(|disk| disk.stats()),
            backend: self.synthesizer.stats(),
        }
    }

    fn build_request(
        &self,
        text: String,
        options: &SynthesisOptions,
    ) -> Result<SynthesisRequest, ApplicationError> {
        let defaults = &self.config;
        let mut request = SynthesisRequest::new(text)
            .with_reference(
                options
                    .ref_audio_path
                    .clone()
                    .unwrap_or_else(|| defaults.ref_audio_path.clone()),
                options
                    .ref_text
                    .clone()
                    .unwrap_or_else(|| defaults.ref_text.clone()),
            )
            .with_languages(
                options
                    .languages
                    .clone()
                    .unwrap_or_else(|| defaults.languages()),
            )
            .with_params(options.params.unwrap_or(defaults.params))
            .with_split_method(
                options
                    .text_split_method
                    .clone()
                    .unwrap_or_else(|| defaults.text_split_method.clone()),
            )
            .with_extra("batch_size", defaults.batch_size)
            .with_extra("seed", defaults.seed);

        for (key, value) in &options.extras {
            request = request.with_extra(key.clone(), value.clone());
        }
        if let Some(profile) = &options.profile {
            request = request.with_profile(profile);
        }

        request.params.validate()?;
        Ok(request)
    }

    /// Look `key` up in memory, then on disk, promoting disk hits
    async fn cached(&self, key: &CacheKey) -> Option<Bytes> {
        match self.memory.get(key).await {
            Ok(Some(audio)) => return Some(audio),
            Ok(None) => {},
            Err(err) => warn!(error = %err, "Memory cache read failed"),
        }

        let disk = self.disk.as_ref()?;
        match disk.get(key).await {
            Ok(Some(audio)) => {
                if let Err(err) = self.memory.set(key, audio.clone()).await {
                    warn!(error = %err, "Failed to promote disk cache hit");
                }
                Some(audio)
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "Disk cache read failed");
                None
            },
        }
    }

    async fn synthesize_uncached(
        &self,
        key: &CacheKey,
        request: &SynthesisRequest,
    ) -> Result<Bytes, ApplicationError> {
        // A previous leader may have finished between our lookup and join
        if let Ok(Some(audio)) = self.memory.get(key).await {
            return Ok(audio);
        }

        let _permit = tokio::select! {
            permit = self.permits.acquire() => permit
                .map_err(|_| ApplicationError::Internal("synthesis permits closed".into()))?,
            () = self.closing.notified() => return Err(ApplicationError::Cancelled),
        };

        let audio = tokio::select! {
            result = self.synthesizer.synthesize(request) => result?,
            () = self.closing.notified() => return Err(ApplicationError::Cancelled),
        };

        self.store(key, &audio).await;
        Ok(audio)
    }

    async fn store(&self, key: &CacheKey, audio: &Bytes) {
        if let Err(err) = self.memory.set(key, audio.clone()).await {
            warn!(error = %err, "Memory cache write failed");
        }
        if let Some(disk) = &self.disk {
            if let Err(err) = disk.set(key, audio.clone()).await {
                warn!(error = %err, "Disk cache write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ports::MockSynthesisPort;
    use crate::services::testing::{FakeBackend, FakeCache};

    fn service(backend: Arc<FakeBackend>) -> (SpeechService, Arc<FakeCache>) {
        let memory = Arc::new(FakeCache::default());
        let service =
            SpeechService::new(SpeechServiceConfig::default(), backend, memory.clone()).unwrap();
        (service, memory)
    }

    // ============ Config ============

    #[test]
    fn default_config_is_valid() {
        let config = SpeechServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.params.top_k, 5);
        assert_eq!(config.memory_cache_size, 100);
        assert_eq!(config.max_parallel_requests, 2);
        assert_eq!(config.paragraph_min_sentence_length, 8);
        assert_eq!(config.seed, -1);
    }

    #[test]
    fn config_rejects_zero_parallelism() {
        let config = SpeechServiceConfig {
            max_parallel_requests: 0,
            ..SpeechServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_reads_flattened_params() {
        let config: SpeechServiceConfig =
            serde_json::from_str(r#"{"top_k": 7, "speed_factor": 1.2}"#).unwrap();
        assert_eq!(config.params.top_k, 7);
        assert!((config.params.speed_factor - 1.2).abs() < f64::EPSILON);
        assert!((config.params.top_p - 1.0).abs() < f64::EPSILON);
    }

    // ============ Single requests ============

    #[tokio::test]
    async fn second_identical_call_is_served_from_memory() {
        let backend = Arc::new(FakeBackend::default());
        let (service, _) = service(backend.clone());
        let options = SynthesisOptions::new();

        let first = service.synthesize_text("你好。", &options).await.unwrap();
        let second = service.synthesize_text(" 你好。\u{200b}", &options).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.call_count(), 1);
        let stats = service.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn blank_text_never_reaches_backend() {
        let backend = Arc::new(FakeBackend::default());
        let (service, _) = service(backend.clone());

        let err = service
            .synthesize_text(" \u{3000}\u{200b} ", &SynthesisOptions::new())
            .await
            .unwrap_err();

        assert!(err.is_empty_text());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn request_carries_defaults_and_extras() {
        let backend = Arc::new(FakeBackend::default());
        let (service, _) = service(backend.clone());
        let options = SynthesisOptions::new()
            .with_reference("ref.wav", "参考")
            .with_extra("seed", 42);

        service.synthesize_text("你好", &options).await.unwrap();

        let request = backend.calls.lock()[0].clone();
        assert_eq!(request.ref_audio_path, "ref.wav");
        assert_eq!(request.prompt_text, "参考");
        assert_eq!(request.extras["seed"], 42);
        assert_eq!(request.extras["batch_size"], 1);
        assert_eq!(request.text_split_method, "cut0");
    }

    #[tokio::test]
    async fn profile_changes_cache_identity() {
        let backend = Arc::new(FakeBackend::default());
        let (service, memory) = service(backend.clone());

        service
            .synthesize_text("你好", &SynthesisOptions::new())
            .await
            .unwrap();
        service
            .synthesize_text(
                "你好",
                &SynthesisOptions::new().with_profile(SpeechProfile::new(1.0, 1.0)),
            )
            .await
            .unwrap();

        assert_eq!(backend.call_count(), 2);
        assert_eq!(memory.len(), 2);
        let shaped = backend.calls.lock()[1].params;
        assert!((shaped.speed_factor - 1.2).abs() < 1e-9);
        assert_eq!(shaped.top_k, 7);
    }

    #[tokio::test]
    async fn invalid_params_are_rejected() {
        let backend = Arc::new(FakeBackend::default());
        let (service, _) = service(backend.clone());
        let options = SynthesisOptions::new().with_params(SamplingParams {
            top_k: 0,
            ..SamplingParams::default()
        });

        let err = service.synthesize_text("你好", &options).await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::InvalidParameter { name: "top_k", .. })
        ));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn backend_failure_is_not_cached() {
        let backend = Arc::new(FakeBackend::failing(ApplicationError::ExternalService(
            "timeout".into(),
        )));
        let (service, memory) = service(backend.clone());

        for _ in 0..2 {
            let err = service
                .synthesize_text("你好", &SynthesisOptions::new())
                .await
                .unwrap_err();
            assert!(err.is_retryable());
        }

        assert_eq!(backend.call_count(), 2);
        assert_eq!(memory.len(), 0);
    }

    // ============ Cache tiers ============

    #[tokio::test]
    async fn disk_hit_is_promoted_to_memory() {
        let backend = Arc::new(FakeBackend::default());
        let (service, memory) = service(backend.clone());
        let disk = Arc::new(FakeCache::default());
        let service = service.with_disk_cache(disk.clone());

        service
            .synthesize_text("你好", &SynthesisOptions::new())
            .await
            .unwrap();
        assert_eq!(disk.len(), 1);

        memory.clear().await.unwrap();
        service
            .synthesize_text("你好", &SynthesisOptions::new())
            .await
            .unwrap();

        assert_eq!(backend.call_count(), 1);
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn broken_disk_cache_does_not_fail_calls() {
        let backend = Arc::new(FakeBackend::default());
        let (service, _) = service(backend.clone());
        let service = service.with_disk_cache(Arc::new(FakeCache::broken()));

        let audio = service
            .synthesize_text("你好", &SynthesisOptions::new())
            .await
            .unwrap();

        assert_eq!(audio, Bytes::from("wav:你好"));
    }

    #[tokio::test]
    async fn clear_cache_empties_both_tiers() {
        let backend = Arc::new(FakeBackend::default());
        let (service, memory) = service(backend.clone());
        let disk = Arc::new(FakeCache::default());
        let service = service.with_disk_cache(disk.clone());

        service
            .synthesize_text("你好", &SynthesisOptions::new())
            .await
            .unwrap();
        service.clear_cache().await.unwrap();

        assert_eq!(memory.len(), 0);
        assert_eq!(disk.len(), 0);
    }

    // ============ Deduplication ============

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_requests_share_one_call() {
        let backend =
            Arc::new(FakeBackend::default().with_delay("你好", Duration::from_millis(100)));
        let (service, _) = service(backend.clone());
        let service = Arc::new(service);

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .synthesize_text("你好", &SynthesisOptions::new())
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), Bytes::from("wav:你好"));
        }
        assert_eq!(backend.call_count(), 1);
        assert!(service.stats().inflight_waits >= 1);
        assert_eq!(service.stats().active_inflight, 0);
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter() {
        let mut backend = FakeBackend::failing(ApplicationError::BackendRejected {
            status: 400,
            message: "bad ref".into(),
        });
        backend.delays.insert("你好".into(), Duration::from_millis(50));
        let backend = Arc::new(backend);
        let (service, _) = service(backend.clone());
        let options = SynthesisOptions::new();

        let (first, second) = tokio::join!(
            service.synthesize_text("你好", &options),
            service.synthesize_text("你好", &options)
        );

        assert!(matches!(first, Err(ApplicationError::BackendRejected { status: 400, .. })));
        assert_eq!(first, second);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn cancelled_leader_releases_slot() {
        let backend =
            Arc::new(FakeBackend::default().with_delay("你好", Duration::from_secs(10)));
        let (service, _) = service(backend.clone());
        let service = Arc::new(service);

        let leader = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .synthesize_text("你好", &SynthesisOptions::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(service.stats().active_inflight, 1);

        let follower = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .synthesize_text("你好", &SynthesisOptions::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());

        assert_eq!(follower.await.unwrap().unwrap_err(), ApplicationError::Cancelled);
        assert_eq!(service.stats().active_inflight, 0);
    }

    #[tokio::test]
    async fn close_cancels_running_requests() {
        let backend =
            Arc::new(FakeBackend::default().with_delay("你好", Duration::from_secs(10)));
        let (service, _) = service(backend.clone());
        let service = Arc::new(service);

        let running = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .synthesize_text("你好", &SynthesisOptions::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        service.close().await;

        assert_eq!(running.await.unwrap().unwrap_err(), ApplicationError::Cancelled);
        assert_eq!(service.stats().active_inflight, 0);
    }

    // ============ Batches ============

    #[tokio::test]
    async fn batch_results_keep_input_order() {
        let backend = Arc::new(
            FakeBackend::default()
                .with_delay("第一句。", Duration::from_millis(60))
                .with_delay("第二句。", Duration::from_millis(5)),
        );
        let (service, _) = service(backend.clone());

        let results = service
            .synthesize_sentences(&["第一句。", "", "第二句。"], &SynthesisOptions::new())
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &Bytes::from("wav:第一句。"));
        assert!(results[1].as_ref().unwrap_err().is_empty_text());
        assert_eq!(results[2].as_ref().unwrap(), &Bytes::from("wav:第二句。"));
    }

    #[tokio::test]
    async fn paragraph_is_split_into_sentences() {
        let backend = Arc::new(FakeBackend::default());
        let (service, _) = service(backend.clone());

        let results = service
            .synthesize_paragraph("今天的天气真的很好。我们一起去公园散步吧！好", &SynthesisOptions::new())
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(Result::is_ok));
        let texts: Vec<_> = backend.calls.lock().iter().map(|r| r.text.clone()).collect();
        assert!(texts.contains(&"今天的天气真的很好。".to_string()));
        assert!(texts.contains(&"好".to_string()));
    }

    #[tokio::test]
    async fn empty_paragraph_yields_no_results() {
        let backend = Arc::new(FakeBackend::default());
        let (service, _) = service(backend);

        assert!(
            service
                .synthesize_paragraph("   ", &SynthesisOptions::new())
                .await
                .is_empty()
        );
    }

    // ============ Health ============

    #[tokio::test]
    async fn health_probe_uses_minimal_sampling() {
        let backend = Arc::new(FakeBackend::default());
        let (service, _) = service(backend.clone());

        assert!(service.check_service().await);

        let probe = backend.calls.lock()[0].clone();
        assert_eq!(probe.text, "测试");
        assert_eq!(probe.params.top_k, 1);
    }

    #[tokio::test]
    async fn unhealthy_backend_is_reported() {
        let mut backend = MockSynthesisPort::new();
        backend.expect_check_health().times(1).returning(|_| false);
        let service = SpeechService::new(
            SpeechServiceConfig::default(),
            Arc::new(backend),
            Arc::new(FakeCache::default()),
        )
        .unwrap();

        assert!(!service.check_service().await);
    }
}
