//! Audio output sinks

use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::PlaybackItem;
use parking_lot::{Condvar, Mutex};

use super::{OutputKind, PlaybackError};

/// Destination that plays one clip at a time
///
/// Sinks live on the playback worker thread and are never shared, so they
/// do not need to be `Send` once created.
pub trait AudioSink {
    /// Play `item` to the end, returning early once `interrupt` is raised
    fn play(&mut self, item: &PlaybackItem, interrupt: &Interrupt) -> Result<(), PlaybackError>;
}

/// Open the sink for `kind`
pub fn open_sink(kind: OutputKind) -> Result<Box<dyn AudioSink>, PlaybackError> {
    match kind {
        OutputKind::Silent => Ok(Box::new(SilentSink)),
        #[cfg(feature = "rodio-output")]
        OutputKind::System => Ok(Box::new(RodioSink::open()?)),
        #[cfg(not(feature = "rodio-output"))]
        OutputKind::System => Err(PlaybackError::Device(
            "built without the rodio-output feature".to_string(),
        )),
    }
}

#[derive(Debug, Default)]
pub(crate) struct Signal {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl Signal {
    /// Interrupt whatever is playing now
    pub(crate) fn raise(&self) {
        *self.generation.lock() += 1;
        self.changed.notify_all();
    }

    pub(crate) fn arm(self: &Arc<Self>) -> Interrupt {
        Interrupt {
            generation: *self.generation.lock(),
            signal: Arc::clone(self),
        }
    }
}

/// Stop request for the clip being played
#[derive(Debug, Clone)]
pub struct Interrupt {
    signal: Arc<Signal>,
    generation: u64,
}

impl Interrupt {
    /// An interrupt that is never raised
    pub fn never() -> Self {
        Arc::new(Signal::default()).arm()
    }

    /// Whether a stop was requested since this clip started
    pub fn is_raised(&self) -> bool {
        *self.signal.generation.lock() != self.generation
    }

    /// Sleep for `timeout` or until raised, returning whether it was raised
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut generation = self.signal.generation.lock();
        while *generation == self.generation {
            if self
                .signal
                .changed
                .wait_until(&mut generation, deadline)
                .timed_out()
            {
                return *generation != self.generation;
            }
        }
        true
    }
}

/// Sink that produces no sound but takes as long as the clip
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl AudioSink for SilentSink {
    fn play(&mut self, item: &PlaybackItem, interrupt: &Interrupt) -> Result<(), PlaybackError> {
        interrupt.wait(item.duration());
        Ok(())
    }
}

/// Sink writing to the default system output device
#[cfg(feature = "rodio-output")]
pub struct RodioSink {
    stream: rodio::OutputStream,
}

#[cfg(feature = "rodio-output")]
impl std::fmt::Debug for RodioSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioSink").finish_non_exhaustive()
    }
}

#[cfg(feature = "rodio-output")]
impl RodioSink {
    const POLL: Duration = Duration::from_millis(20);

    /// Open the default output device
    pub fn open() -> Result<Self, PlaybackError> {
        let stream = rodio::OutputStreamBuilder::open_default_stream()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        Ok(Self { stream })
    }
}

#[cfg(feature = "rodio-output")]
impl AudioSink for RodioSink {
    fn play(&mut self, item: &PlaybackItem, interrupt: &Interrupt) -> Result<(), PlaybackError> {
        let sink = rodio::Sink::connect_new(self.stream.mixer());
        sink.append(rodio::buffer::SamplesBuffer::new(
            item.channels(),
            item.sample_rate(),
            item.samples().to_vec(),
        ));

        while !sink.empty() {
            if interrupt.wait(Self::POLL) {
                sink.stop();
                break;
            }
        }
        Ok(())
    }
}
