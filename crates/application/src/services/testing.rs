//! Hand-written port fakes shared by the service tests

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use domain::{CacheKey, SynthesisRequest};
use parking_lot::Mutex;

use crate::error::ApplicationError;
use crate::ports::{AudioCachePort, AudioCacheStats, BackendStats, SynthesisPort};

/// Backend that echoes the text and records every call
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub(crate) calls: Mutex<Vec<SynthesisRequest>>,
    pub(crate) delays: HashMap<String, Duration>,
    failure: Option<ApplicationError>,
}

impl FakeBackend {
    pub(crate) fn with_delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    pub(crate) fn failing(error: ApplicationError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl SynthesisPort for FakeBackend {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Bytes, ApplicationError> {
        self.calls.lock().push(request.clone());
        if let Some(delay) = self.delays.get(&request.text) {
            tokio::time::sleep(*delay).await;
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(Bytes::from(format!("wav:{}", request.text))),
        }
    }

    async fn check_health(&self, probe: &SynthesisRequest) -> bool {
        self.calls.lock().push(probe.clone());
        true
    }

    async fn close(&self) {}

    fn stats(&self) -> BackendStats {
        BackendStats::default()
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeCache {
    entries: Mutex<HashMap<CacheKey, Bytes>>,
    broken: bool,
}

impl FakeCache {
    pub(crate) fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[async_trait]
impl AudioCachePort for FakeCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, ApplicationError> {
        if self.broken {
            return Err(ApplicationError::Cache("disk on fire".into()));
        }
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &CacheKey, audio: Bytes) -> Result<(), ApplicationError> {
        if self.broken {
            return Err(ApplicationError::Cache("disk on fire".into()));
        }
        self.entries.lock().insert(key.clone(), audio);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), ApplicationError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), ApplicationError> {
        self.entries.lock().clear();
        Ok(())
    }

    fn stats(&self) -> AudioCacheStats {
        AudioCacheStats {
            entries: self.entries.lock().len() as u64,
            ..AudioCacheStats::default()
        }
    }
}
