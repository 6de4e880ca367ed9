//! Deduplication of concurrent identical synthesis requests
//!
//! The first caller for a key becomes the leader and does the work; callers
//! arriving while it runs become followers and await the leader's result.
//! The map is only locked around insert and remove, never across an await.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use domain::CacheKey;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ApplicationError;

/// Outcome shared between the leader and its followers
pub type SharedResult = Result<Bytes, ApplicationError>;

type SharedOutcome = Shared<BoxFuture<'static, SharedResult>>;

/// Role of a caller that joined the registry
pub enum Joined {
    /// No request was running; this caller must do the work
    Leader(InflightLease),
    /// A request is already running; await it
    Follower(SharedOutcome),
}

impl fmt::Debug for Joined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leader(lease) => f.debug_tuple("Leader").field(lease).finish(),
            Self::Follower(_) => f.write_str("Follower"),
        }
    }
}

/// Registry of requests currently being synthesized
#[derive(Default)]
pub struct InflightRegistry {
    entries: Arc<Mutex<HashMap<CacheKey, SharedOutcome>>>,
}

impl fmt::Debug for InflightRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflightRegistry")
            .field("active", &self.len())
            .finish()
    }
}

impl InflightRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the request for `key`, becoming leader if none is running
    pub fn join(&self, key: &CacheKey) -> Joined {
        let mut entries = self.entries.lock();
        if let Some(shared) = entries.get(key) {
            return Joined::Follower(shared.clone());
        }

        let (tx, rx) = oneshot::channel::<SharedResult>();
        let shared = rx
            .map(|received| received.unwrap_or(Err(ApplicationError::Cancelled)))
            .boxed()
            .shared();
        entries.insert(key.clone(), shared);
        drop(entries);

        Joined::Leader(InflightLease {
            key: key.clone(),
            sender: Some(tx),
            entries: Arc::clone(&self.entries),
        })
    }

    /// Number of requests currently running
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no request is running
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Leader's handle on a registry slot
///
/// Dropping the lease frees the slot. If it is dropped without calling
/// [`InflightLease::complete`], followers receive `Cancelled`.
pub struct InflightLease {
    key: CacheKey,
    sender: Option<oneshot::Sender<SharedResult>>,
    entries: Arc<Mutex<HashMap<CacheKey, SharedOutcome>>>,
}

impl fmt::Debug for InflightLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflightLease")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl InflightLease {
    /// Publish the result to followers and free the slot
    pub fn complete(mut self, result: SharedResult) {
        self.release();
        if let Some(sender) = self.sender.take() {
            // Nobody listening is fine
            let _ = sender.send(result);
        }
    }

    fn release(&self) {
        self.entries.lock().remove(&self.key);
    }
}

impl Drop for InflightLease {
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.release();
        }
    }
}
