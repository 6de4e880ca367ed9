//! Streaming sentence segmentation
//!
//! Turns text fragments of arbitrary size (for example tokens streamed from a
//! language model) into complete sentences that can be synthesized one by
//! one. No text is ever lost: every fed character ends up in exactly one
//! emitted sentence or in the final `flush()`, modulo whitespace trimmed at
//! sentence edges.
//!
//! # Boundaries
//!
//! - Strong endings `。！？.!?` split once the sentence has at least
//!   `min_sentence_length` visible characters.
//! - Soft endings `,，、;；:：…~～` split only once the sentence has at least
//!   the soft minimum (by default `max(min_sentence_length, 10)`).
//! - Consecutive ending punctuation (`……`, `?!`, `！！`) forms one boundary;
//!   its last character decides between strong and soft.
//! - Punctuation inside `()（）[]【】` never splits, and bracketed text does
//!   not count toward the visible length.
//!
//! # Example
//!
//! ```
//! use application::sentence_segmenter::{SegmenterConfig, SentenceSegmenter};
//!
//! let mut segmenter = SentenceSegmenter::new(SegmenterConfig::with_min_length(3, 6));
//! let mut sentences = Vec::new();
//! for fragment in ["你好", "，", "主人", "！", "今天", "天气", "真好", "。"] {
//!     sentences.extend(segmenter.feed(fragment));
//! }
//! assert_eq!(sentences, vec!["你好，主人！", "今天天气真好。"]);
//! assert_eq!(segmenter.flush(), None);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const STRONG_ENDINGS: [char; 6] = ['。', '！', '？', '.', '!', '?'];
const SOFT_ENDINGS: [char; 10] = [',', '，', '、', ';', '；', ':', '：', '…', '~', '～'];
const OPEN_BRACKETS: [char; 4] = ['(', '（', '[', '【'];
const CLOSE_BRACKETS: [char; 4] = [')', '）', ']', '】'];

/// Soft boundaries never apply to sentences shorter than this
const SOFT_MIN_FLOOR: usize = 10;

/// Post-processing hook applied to every emitted sentence
pub type Corrector = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Segmentation thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Visible characters required before a strong ending splits
    #[serde(default = "default_min_sentence_length")]
    pub min_sentence_length: usize,

    /// Visible characters required before a soft ending splits
    #[serde(default)]
    pub soft_min_length: Option<usize>,

    /// Buffer size beyond which text is cut without a proper boundary
    #[serde(default = "default_max_buffer_chars")]
    pub max_buffer_chars: usize,

    /// Trailing characters searched for a strong ending when cutting
    #[serde(default = "default_fallback_window")]
    pub fallback_window: usize,
}

const fn default_min_sentence_length() -> usize {
    5
}

const fn default_max_buffer_chars() -> usize {
    500
}

const fn default_fallback_window() -> usize {
    200
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_sentence_length: default_min_sentence_length(),
            soft_min_length: None,
            max_buffer_chars: default_max_buffer_chars(),
            fallback_window: default_fallback_window(),
        }
    }
}

impl SegmenterConfig {
    /// Config with explicit strong and soft minimums
    #[must_use]
    pub fn with_min_length(strong: usize, soft: usize) -> Self {
        Self {
            min_sentence_length: strong,
            soft_min_length: Some(soft),
            ..Self::default()
        }
    }

    /// Config for a strong minimum, deriving the soft one
    #[must_use]
    pub fn for_min_length(strong: usize) -> Self {
        Self {
            min_sentence_length: strong,
            ..Self::default()
        }
    }

    /// Effective soft minimum
    pub fn soft_min(&self) -> usize {
        self.soft_min_length
            .unwrap_or_else(|| self.min_sentence_length.max(SOFT_MIN_FLOOR))
    }
}

/// Segmenter counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmenterStats {
    /// Fragments fed
    pub chunks: u64,
    /// Sentences emitted, including flushed remainders
    pub sentences: u64,
    /// Characters fed
    pub chars: u64,
    /// Characters currently buffered
    pub buffered_chars: usize,
}

/// Incremental sentence splitter
pub struct SentenceSegmenter {
    config: SegmenterConfig,
    buffer: String,
    corrector: Option<Corrector>,
    stats: SegmenterStats,
}

impl fmt::Debug for SentenceSegmenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentenceSegmenter")
            .field("config", &self.config)
            .field("buffered_chars", &self.buffer.chars().count())
            .field("has_corrector", &self.corrector.is_some())
            .finish()
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new(SegmenterConfig::default())
    }
}

impl SentenceSegmenter {
    /// Create a segmenter
    #[must_use]
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
            corrector: None,
            stats: SegmenterStats::default(),
        }
    }

    /// Apply `corrector` to every emitted sentence
    #[must_use]
    pub fn with_corrector<F>(mut self, corrector: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.corrector = Some(Box::new(corrector));
        self
    }

    /// Thresholds in effect
    pub const fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Append a fragment and return every sentence it completes
    pub fn feed(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);
        self.stats.chunks += 1;
        self.stats.chars += fragment.chars().count() as u64;

        let mut sentences = Vec::new();
        loop {
            while let Some(end) = self.find_boundary() {
                let sentence = self.split_off_through(end);
                self.emit(sentence, &mut sentences);
            }

            // A cut can expose boundaries that an open bracket was hiding
            if self.buffer.chars().count() <= self.config.max_buffer_chars {
                break;
            }
            self.cut_oversized(&mut sentences);
        }

        sentences
    }

    /// Emit whatever is buffered, regardless of thresholds
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            return None;
        }

        let mut out = Vec::with_capacity(1);
        self.emit(rest.to_string(), &mut out);
        out.pop()
    }

    /// Discard buffered text
    pub fn reset(&mut self) {
        self.buffer.clear();
        debug!("Sentence segmenter reset");
    }

    /// Counters since creation
    pub fn stats(&self) -> SegmenterStats {
        SegmenterStats {
            buffered_chars: self.buffer.chars().count(),
            ..self.stats
        }
    }

    /// Character index of the first acceptable boundary, inclusive
    fn find_boundary(&self) -> Option<usize> {
        let chars: Vec<char> = self.buffer.chars().collect();
        let mut depth = 0usize;
        let mut i = 0;

        while i < chars.len() {
            let ch = chars[i];
            if OPEN_BRACKETS.contains(&ch) {
                depth += 1;
            } else if CLOSE_BRACKETS.contains(&ch) {
                depth = depth.saturating_sub(1);
            }

            if depth > 0 || !is_ending(ch) {
                i += 1;
                continue;
            }

            let mut j = i;
            while j + 1 < chars.len() && is_ending(chars[j + 1]) {
                j += 1;
            }

            let required = if STRONG_ENDINGS.contains(&chars[j]) {
                self.config.min_sentence_length
            } else {
                self.config.soft_min()
            };

            if visible_length(&chars[..=j]) >= required {
                return Some(j);
            }
            i = j + 1;
        }

        None
    }

    /// Remove the buffer up to and including char `end`, returning it trimmed
    fn split_off_through(&mut self, end: usize) -> String {
        let split = self
            .buffer
            .char_indices()
            .nth(end + 1)
            .map_or(self.buffer.len(), |(idx, _)| idx);
        let rest = self.buffer[split..].trim_start().to_string();
        let sentence = self.buffer[..split].trim().to_string();
        self.buffer = rest;
        sentence
    }

    /// Shrink an oversized buffer at the last strong ending, or entirely
    fn cut_oversized(&mut self, sentences: &mut Vec<String>) {
        let chars: Vec<char> = self.buffer.chars().collect();
        let floor = chars.len().saturating_sub(self.config.fallback_window);
        let boundary = (floor..chars.len())
            .rev()
            .find(|&i| STRONG_ENDINGS.contains(&chars[i]));

        let sentence = match boundary {
            Some(end) if end > self.config.min_sentence_length => {
                debug!(
                    buffered = chars.len(),
                    cut_at = end,
                    "Buffer oversized, cutting at last strong ending"
                );
                self.split_off_through(end)
            },
            _ => {
                warn!(
                    buffered = chars.len(),
                    max = self.config.max_buffer_chars,
                    "Buffer oversized without boundary, emitting everything"
                );
                std::mem::take(&mut self.buffer).trim().to_string()
            },
        };

        self.emit(sentence, sentences);
    }

    fn emit(&mut self, sentence: String, out: &mut Vec<String>) {
        let sentence = match &self.corrector {
            Some(correct) => correct(&sentence),
            None => sentence,
        };
        if sentence.trim().is_empty() {
            return;
        }
        self.stats.sentences += 1;
        out.push(sentence);
    }
}

fn is_ending(ch: char) -> bool {
    STRONG_ENDINGS.contains(&ch) || SOFT_ENDINGS.contains(&ch)
}

/// Non-whitespace characters outside brackets, brackets excluded
fn visible_length(chars: &[char]) -> usize {
    let mut depth = 0usize;
    let mut len = 0;
    for &ch in chars {
        if OPEN_BRACKETS.contains(&ch) {
            depth += 1;
        } else if CLOSE_BRACKETS.contains(&ch) {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && !ch.is_whitespace() {
            len += 1;
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(segmenter: &mut SentenceSegmenter, fragments: &[&str]) -> Vec<String> {
        fragments.iter().flat_map(|f| segmenter.feed(f)).collect()
    }

    #[test]
    fn splits_streamed_fragments_into_sentences() {
        let mut segmenter = SentenceSegmenter::new(SegmenterConfig::with_min_length(3, 6));
        let sentences = feed_all(
            &mut segmenter,
            &["你好", "，", "主人", "！", "今天", "天气", "真好", "。"],
        );

        assert_eq!(sentences, vec!["你好，主人！", "今天天气真好。"]);
        assert_eq!(segmenter.flush(), None);
    }

    #[test]
    fn short_strong_sentence_waits_for_more_text() {
        let mut segmenter = SentenceSegmenter::new(SegmenterConfig::for_min_length(5));
        assert!(segmenter.feed("好的。").is_empty());
        assert_eq!(segmenter.feed("我们现在出发吧！"), vec!["好的。我们现在出发吧！"]);
    }

    #[test]
    fn soft_ending_needs_soft_minimum() {
        let mut segmenter = SentenceSegmenter::new(SegmenterConfig::for_min_length(5));
        assert!(segmenter.feed("嗯，这个").is_empty());
        let sentences = segmenter.feed("问题其实很有意思，");
        assert_eq!(sentences, vec!["嗯，这个问题其实很有意思，"]);
    }

    #[test]
    fn consecutive_punctuation_stays_together() {
        let mut segmenter = SentenceSegmenter::new(SegmenterConfig::for_min_length(2));
        let sentences = segmenter.feed("真的吗?!太好了……");
        assert_eq!(sentences, vec!["真的吗?!"]);
        assert_eq!(segmenter.flush(), Some("太好了……".to_string()));
    }

    #[test]
    fn last_punctuation_of_run_decides_strength() {
        let mut segmenter = SentenceSegmenter::new(SegmenterConfig::for_min_length(2));
        // "好！，" ends on a soft comma, so the soft minimum applies
        assert!(segmenter.feed("好啊！，").is_empty());
    }

    #[test]
    fn brackets_suppress_splitting() {
        let mut segmenter = SentenceSegmenter::new(SegmenterConfig::for_min_length(2));
        let sentences = segmenter.feed("（她笑了。然后说）走吧。");
        assert_eq!(sentences, vec!["（她笑了。然后说）走吧。"]);
    }

    #[test]
    fn bracketed_text_does_not_count_toward_length() {
        let mut segmenter = SentenceSegmenter::new(SegmenterConfig::for_min_length(4));
        assert!(segmenter.feed("（微笑着点头）好。").is_empty());
        assert_eq!(segmenter.feed("没问题。"), vec!["（微笑着点头）好。没问题。"]);
    }

    #[test]
    fn remainder_is_left_trimmed() {
        let mut segmenter = SentenceSegmenter::new(SegmenterConfig::for_min_length(2));
        let sentences = segmenter.feed("Hello there.   General");
        assert_eq!(sentences, vec!["Hello there."]);
        assert_eq!(segmenter.flush(), Some("General".to_string()));
    }

    #[test]
    fn flush_emits_short_remainder() {
        let mut segmenter = SentenceSegmenter::default();
        assert!(segmenter.feed("嗯").is_empty());
        assert_eq!(segmenter.flush(), Some("嗯".to_string()));
        assert_eq!(segmenter.flush(), None);
    }

    #[test]
    fn flush_of_whitespace_is_none() {
        let mut segmenter = SentenceSegmenter::default();
        segmenter.feed("  \n ");
        assert_eq!(segmenter.flush(), None);
    }

    #[test]
    fn oversized_buffer_cuts_at_last_strong_ending() {
        let config = SegmenterConfig {
            max_buffer_chars: 20,
            fallback_window: 20,
            ..SegmenterConfig::default()
        };
        let mut segmenter = SentenceSegmenter::new(config);
        // An unclosed bracket hides the full stop from normal splitting
        let text = "（一二三四五六七八九十。甲乙丙丁戊己庚辛壬癸子丑";

        let sentences = segmenter.feed(text);

        assert_eq!(sentences, vec!["（一二三四五六七八九十。"]);
        assert_eq!(segmenter.flush(), Some("甲乙丙丁戊己庚辛壬癸子丑".to_string()));
    }

    #[test]
    fn remainder_after_cut_is_split_in_the_same_feed() {
        let config = SegmenterConfig {
            max_buffer_chars: 18,
            fallback_window: 20,
            ..SegmenterConfig::with_min_length(3, 6)
        };
        let mut segmenter = SentenceSegmenter::new(config);
        let text = "（一二三四五六七八九。甲乙丙丁戊己庚，辛";

        let sentences = segmenter.feed(text);

        assert_eq!(sentences, vec!["（一二三四五六七八九。", "甲乙丙丁戊己庚，"]);
        assert_eq!(segmenter.stats().buffered_chars, 1);
        assert_eq!(segmenter.flush(), Some("辛".to_string()));
    }

    #[test]
    fn oversized_buffer_without_boundary_is_emitted_whole() {
        let config = SegmenterConfig {
            max_buffer_chars: 10,
            ..SegmenterConfig::default()
        };
        let mut segmenter = SentenceSegmenter::new(config);
        let text = "没有任何标点符号的一段很长的文字";

        assert_eq!(segmenter.feed(text), vec![text.to_string()]);
        assert_eq!(segmenter.flush(), None);
    }

    #[test]
    fn corrector_applies_to_every_sentence() {
        let mut segmenter = SentenceSegmenter::new(SegmenterConfig::for_min_length(1))
            .with_corrector(|s| s.replace("喵", "猫"));

        assert_eq!(segmenter.feed("小喵。"), vec!["小猫。"]);
        segmenter.feed("喵喵");
        assert_eq!(segmenter.flush(), Some("猫猫".to_string()));
    }

    #[test]
    fn corrector_may_drop_sentences() {
        let mut segmenter =
            SentenceSegmenter::new(SegmenterConfig::for_min_length(1)).with_corrector(|_| String::new());
        assert!(segmenter.feed("好。").is_empty());
        assert_eq!(segmenter.stats().sentences, 0);
    }

    #[test]
    fn reset_discards_buffer() {
        let mut segmenter = SentenceSegmenter::default();
        segmenter.feed("未完成的句子");
        segmenter.reset();
        assert_eq!(segmenter.flush(), None);
    }

    #[test]
    fn stats_track_fragments_and_sentences() {
        let mut segmenter = SentenceSegmenter::new(SegmenterConfig::for_min_length(1));
        segmenter.feed("一。");
        segmenter.feed("二");

        let stats = segmenter.stats();
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.chars, 3);
        assert_eq!(stats.sentences, 1);
        assert_eq!(stats.buffered_chars, 1);
    }

    #[test]
    fn soft_min_defaults_to_at_least_ten() {
        assert_eq!(SegmenterConfig::for_min_length(3).soft_min(), 10);
        assert_eq!(SegmenterConfig::for_min_length(12).soft_min(), 12);
        assert_eq!(SegmenterConfig::with_min_length(3, 6).soft_min(), 6);
    }
}
