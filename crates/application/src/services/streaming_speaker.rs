//! Streaming speaker - Speak text while it is still being generated
//!
//! Fragments are fed into a sentence segmenter as they arrive. Each complete
//! sentence starts synthesizing right away, bounded by the speech service's
//! permits, and finished audio is handed to playback strictly in sentence
//! order. A failed sentence is skipped without holding up the ones after it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, FuturesOrdered};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::PlaybackPort;
use crate::sentence_segmenter::{SegmenterConfig, SentenceSegmenter};
use crate::services::speech_service::{SpeechService, SynthesisOptions};
use crate::speakable_text::{normalize_text, strip_stage_directions};

/// Streaming speaker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerConfig {
    /// Sentence boundaries for live text
    #[serde(default)]
    pub segmenter: SegmenterConfig,

    /// Drop bracketed stage directions like `（微笑）` before speaking
    #[serde(default = "default_strip_stage_directions")]
    pub strip_stage_directions: bool,
}

const fn default_strip_stage_directions() -> bool {
    true
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            strip_stage_directions: default_strip_stage_directions(),
        }
    }
}

/// What happened to the sentences of one utterance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpeakReport {
    /// Sentences sent to synthesis
    pub sentences: usize,
    /// Sentences handed to playback
    pub enqueued: usize,
    /// Sentences that failed to synthesize or enqueue
    pub failed: usize,
    /// Sentences with nothing left to say after clean-up
    pub skipped: usize,
}

/// Connects a fragment stream to synthesis and ordered playback
pub struct StreamingSpeaker {
    service: Arc<SpeechService>,
    playback: Arc<dyn PlaybackPort>,
    config: SpeakerConfig,
}

impl fmt::Debug for StreamingSpeaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSpeaker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StreamingSpeaker {
    /// Create a new streaming speaker
    pub fn new(
        service: Arc<SpeechService>,
        playback: Arc<dyn PlaybackPort>,
        config: SpeakerConfig,
    ) -> Self {
        Self {
            service,
            playback,
            config,
        }
    }

    /// Speak a stream of text fragments
    ///
    /// Returns once every sentence has been synthesized and queued for
    /// playback (not once playback has finished).
    #[instrument(skip_all)]
    pub async fn speak<S>(&self, fragments: S, options: &SynthesisOptions) -> SpeakReport
    where
        S: Stream<Item = String> + Unpin,
    {
        let mut segmenter = SentenceSegmenter::new(self.config.segmenter.clone());
        let mut fragments = fragments.fuse();
        let mut pending = FuturesOrdered::new();
        let mut report = SpeakReport::default();
        let mut input_done = false;

        loop {
            tokio::select! {
                fragment = fragments.next(), if !input_done => {
                    let sentences = match fragment {
                        Some(fragment) => segmenter.feed(&fragment),
                        None => {
                            input_done = true;
                            segmenter.flush().into_iter().collect()
                        },
                    };
                    for sentence in sentences {
                        match self.speakable(&sentence) {
                            Some(text) => {
                                report.sentences += 1;
                                pending.push_back(self.synthesize(text, options));
                            },
                            None => report.skipped += 1,
                        }
                    }
                },
                Some((text, result)) = pending.next(), if !pending.is_empty() => {
                    self.hand_off(&text, result, &mut report);
                },
                else => break,
            }
        }

        debug!(
            sentences = report.sentences,
            enqueued = report.enqueued,
            failed = report.failed,
            "Utterance queued"
        );
        report
    }

    /// Speak a complete text
    pub async fn speak_text(&self, text: &str, options: &SynthesisOptions) -> SpeakReport {
        self.speak(stream::iter([text.to_string()]), options).await
    }

    /// Silence playback and drop anything still queued
    pub fn stop(&self) {
        self.playback.stop();
    }

    /// Whether anything is still playing
    pub fn is_speaking(&self) -> bool {
        self.playback.is_playing()
    }

    fn speakable(&self, sentence: &str) -> Option<String> {
        let text = if self.config.strip_stage_directions {
            strip_stage_directions(sentence)
        } else {
            sentence.to_string()
        };
        let text = normalize_text(&text);
        (!text.is_empty()).then_some(text)
    }

    fn synthesize<'a>(
        &'a self,
        text: String,
        options: &'a SynthesisOptions,
    ) -> impl Future<Output = (String, Result<Bytes, ApplicationError>)> + 'a {
        async move {
            let result = self.service.synthesize_text(&text, options).await;
            (text, result)
        }
    }

    fn hand_off(
        &self,
        text: &str,
        result: Result<Bytes, ApplicationError>,
        report: &mut SpeakReport,
    ) {
        let queued = result.and_then(|audio| self.playback.enqueue_audio(&audio));
        match queued {
            Ok(pending) => {
                report.enqueued += 1;
                debug!(pending, sentence_len = text.chars().count(), "Sentence queued");
            },
            Err(err) => {
                report.failed += 1;
                warn!(error = %err, sentence = %text, "Skipping sentence");
            },
        }
    }
}
