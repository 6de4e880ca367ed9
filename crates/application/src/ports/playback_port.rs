//! Playback port - Interface to the ordered audio output queue

use domain::PlaybackItem;
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Ordered audio output
///
/// Items play one after another in the order they were enqueued.
#[cfg_attr(test, automock)]
pub trait PlaybackPort: Send + Sync {
    /// Queue decoded audio, returning the number of pending items
    fn enqueue(&self, item: PlaybackItem) -> Result<usize, ApplicationError>;

    /// Decode encoded audio (WAV) and queue it
    fn enqueue_audio(&self, audio: &[u8]) -> Result<usize, ApplicationError>;

    /// Drop pending items and interrupt the current one
    fn stop(&self);

    /// Set output gain in [0, 1] for items enqueued from now on
    fn set_volume(&self, volume: f32);

    /// Whether audio is being played or waiting to be played
    fn is_playing(&self) -> bool;
}
