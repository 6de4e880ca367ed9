//! Playback queue driven by a dedicated worker thread

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use application::{error::ApplicationError, ports::PlaybackPort};
use domain::{AmplitudeEnvelope, PlaybackItem};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::sink::{AudioSink, Signal, open_sink};
use super::{ENVELOPE_RATE, PlaybackConfig, PlaybackError, decode_wav};

/// Details of a clip that just started playing
#[derive(Debug, Clone)]
pub struct PlaybackStart {
    /// Loudness curve of the clip, `ENVELOPE_RATE` values per second
    pub envelope: AmplitudeEnvelope,
    /// Playing time of the clip
    pub duration: Duration,
    /// When playback began
    pub started_at: Instant,
}

/// Callback run on the playback thread whenever a clip starts
pub type PlaybackObserver = Arc<dyn Fn(&PlaybackStart) + Send + Sync>;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<PlaybackItem>,
    playing: bool,
    shutdown: bool,
    limit: usize,
}

impl QueueState {
    /// Drop the oldest items until `room` more fit under the limit
    fn trim(&mut self, room: usize) -> usize {
        if self.limit == 0 {
            return 0;
        }
        let mut dropped = 0;
        while !self.items.is_empty() && self.items.len() + room > self.limit {
            self.items.pop_front();
            dropped += 1;
        }
        dropped
    }

    fn is_busy(&self) -> bool {
        self.playing || !self.items.is_empty()
    }
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    idle: Condvar,
    interrupt: Arc<Signal>,
    volume: AtomicU32,
    observers: Mutex<Vec<PlaybackObserver>>,
}

/// Strictly ordered audio output
///
/// Clips play one after another on a dedicated thread. Volume is applied
/// when a clip is enqueued, so changing it does not affect queued audio.
pub struct PlaybackQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PlaybackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("PlaybackQueue")
            .field("pending", &state.items.len())
            .field("playing", &state.playing)
            .field("limit", &state.limit)
            .field("volume", &self.volume())
            .finish_non_exhaustive()
    }
}

impl PlaybackQueue {
    /// Start a queue with the sink and settings from `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the output device cannot be opened.
    pub fn from_config(config: &PlaybackConfig) -> Result<Self, PlaybackError> {
        let output = config.output;
        let queue = Self::spawn(move || open_sink(output))?;
        queue.set_volume(config.volume);
        queue.set_queue_limit(config.max_queue_size);
        Ok(queue)
    }

    /// Start a queue whose worker plays through the sink built by `make_sink`
    ///
    /// The sink is created on the worker thread. This returns once it exists.
    ///
    /// # Errors
    ///
    /// Returns the error from `make_sink`, or `Device` if the thread cannot
    /// be started.
    pub fn spawn<F>(make_sink: F) -> Result<Self, PlaybackError>
    where
        F: FnOnce() -> Result<Box<dyn AudioSink>, PlaybackError> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            idle: Condvar::new(),
            interrupt: Arc::new(Signal::default()),
            volume: AtomicU32::new(1.0_f32.to_bits()),
            observers: Mutex::new(Vec::new()),
        });

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("cadence-playback".to_string())
            .spawn(move || match make_sink() {
                Ok(sink) => {
                    let _ = ready_tx.send(Ok(()));
                    run_worker(&worker_shared, sink);
                },
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                },
            })
            .map_err(|e| PlaybackError::Device(format!("failed to start playback thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                debug!("Playback worker started");
                Ok(Self {
                    shared,
                    worker: Mutex::new(Some(handle)),
                })
            },
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            },
            Err(_) => {
                let _ = handle.join();
                Err(PlaybackError::Device(
                    "playback thread exited during startup".to_string(),
                ))
            },
        }
    }

    /// Queue a clip, returning the number of pending clips
    pub fn enqueue(&self, mut item: PlaybackItem) -> Result<usize, PlaybackError> {
        item.apply_gain(self.volume());

        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(PlaybackError::ShutDown);
        }
        let dropped = state.trim(1);
        state.items.push_back(item);
        let pending = state.items.len();
        drop(state);

        self.shared.available.notify_one();
        if dropped > 0 {
            debug!(dropped, "Playback queue full, dropped oldest clips");
        }
        Ok(pending)
    }

    /// Decode a WAV file and queue it
    pub fn enqueue_wav(&self, bytes: &[u8]) -> Result<usize, PlaybackError> {
        self.enqueue(decode_wav(bytes)?)
    }

    /// Drop pending clips and interrupt the one playing
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        let cleared = state.items.len();
        state.items.clear();
        self.shared.interrupt.raise();
        drop(state);
        debug!(cleared, "Playback stopped");
    }

    /// Drop pending clips, letting the current one finish
    pub fn clear_queue(&self) -> usize {
        let mut state = self.shared.state.lock();
        let cleared = state.items.len();
        state.items.clear();
        cleared
    }

    /// Bound the number of pending clips (0 = unbounded)
    pub fn set_queue_limit(&self, limit: usize) {
        let mut state = self.shared.state.lock();
        state.limit = limit;
        let dropped = state.trim(0);
        if dropped > 0 {
            debug!(dropped, limit, "Trimmed playback queue to new limit");
        }
    }

    /// Set the gain for clips enqueued from now on, clamped to [0, 1]
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.shared.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Current gain
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.shared.volume.load(Ordering::Relaxed))
    }

    /// Number of clips waiting to be played
    pub fn queue_len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    /// Whether a clip is playing or waiting
    pub fn is_playing(&self) -> bool {
        self.shared.state.lock().is_busy()
    }

    /// Call `observer` on the playback thread each time a clip starts
    pub fn register_playback_observer<F>(&self, observer: F)
    where
        F: Fn(&PlaybackStart) + Send + Sync + 'static,
    {
        self.shared.observers.lock().push(Arc::new(observer));
    }

    /// Block until nothing is playing or queued
    ///
    /// Returns `false` if `timeout` passed first.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.is_busy() && !state.shutdown {
            if self
                .shared
                .idle
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return !state.is_busy();
            }
        }
        true
    }

    /// Stop playback and end the worker thread
    ///
    /// Later enqueues fail with `ShutDown`. Also runs on drop.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.items.clear();
            self.shared.interrupt.raise();
        }
        self.shared.available.notify_all();
        self.shared.idle.notify_all();

        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Playback thread panicked");
            }
        }
        info!("Playback queue shut down");
    }
}

impl Drop for PlaybackQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: &Shared, mut sink: Box<dyn AudioSink>) {
    loop {
        let (item, interrupt) = {
            let mut state = shared.state.lock();
            state.playing = false;
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(item) = state.items.pop_front() {
                    state.playing = true;
                    break (item, shared.interrupt.arm());
                }
                shared.idle.notify_all();
                shared.available.wait(&mut state);
            }
        };

        notify_observers(shared, &item);

        if let Err(e) = sink.play(&item, &interrupt) {
            warn!(error = %e, "Failed to play clip");
        }
    }
}

fn notify_observers(shared: &Shared, item: &PlaybackItem) {
    let observers = shared.observers.lock().clone();
    if observers.is_empty() {
        return;
    }

    let start = PlaybackStart {
        envelope: item.amplitude_envelope(ENVELOPE_RATE),
        duration: item.duration(),
        started_at: Instant::now(),
    };
    for observer in &observers {
        observer(&start);
    }
}

impl PlaybackPort for PlaybackQueue {
    fn enqueue(&self, item: PlaybackItem) -> Result<usize, ApplicationError> {
        Ok(Self::enqueue(self, item)?)
    }

    fn enqueue_audio(&self, audio: &[u8]) -> Result<usize, ApplicationError> {
        Ok(self.enqueue_wav(audio)?)
    }

    fn stop(&self) {
        Self::stop(self);
    }

    fn set_volume(&self, volume: f32) {
        Self::set_volume(self, volume);
    }

    fn is_playing(&self) -> bool {
        Self::is_playing(self)
    }
}
