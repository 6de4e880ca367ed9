//! Emotional speech profile
//!
//! A `SpeechProfile` nudges the sampling parameters of a synthesis request
//! according to the speaker's mood and energy. The transformation is pure and
//! bounded: whatever the inputs, the shaped parameters stay inside fixed
//! ranges the backend is known to handle.
//!
//! # Examples
//!
//! ```
//! use domain::value_objects::{SamplingParams, SpeechProfile};
//!
//! let excited = SpeechProfile::new(1.0, 1.0);
//! let shaped = excited.shape(&SamplingParams::default());
//! assert!((shaped.speed_factor - 1.2).abs() < 1e-9);
//! assert_eq!(shaped.top_k, 7);
//! ```

use serde::{Deserialize, Serialize};

use super::SamplingParams;

/// Bounds for the shaped speed factor
pub const SPEED_RANGE: (f64, f64) = (0.6, 1.5);
/// Bounds for the shaped temperature
pub const TEMPERATURE_RANGE: (f64, f64) = (0.6, 1.5);
/// Bounds for the shaped top-p
pub const TOP_P_RANGE: (f64, f64) = (0.6, 1.0);
/// Bounds for the shaped top-k
pub const TOP_K_RANGE: (u32, u32) = (1, 10);

/// Mood and energy of the speaker plus optional style tags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechProfile {
    mood: f64,
    energy: f64,
    /// Speaking style tag forwarded to the backend
    #[serde(default)]
    pub style: Option<String>,
    /// Emphasis tag forwarded to the backend
    #[serde(default)]
    pub emphasis: Option<String>,
    /// Persona name forwarded to the backend as `voice_name`
    #[serde(default)]
    pub persona: Option<String>,
}

impl SpeechProfile {
    /// Create a profile, clamping mood and energy into [-1, 1]
    ///
    /// Non-finite inputs are treated as neutral.
    #[must_use]
    pub fn new(mood: f64, energy: f64) -> Self {
        Self {
            mood: clamp_unit(mood),
            energy: clamp_unit(energy),
            style: None,
            emphasis: None,
            persona: None,
        }
    }

    /// Attach a style tag
    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Attach an emphasis tag
    #[must_use]
    pub fn with_emphasis(mut self, emphasis: impl Into<String>) -> Self {
        self.emphasis = Some(emphasis.into());
        self
    }

    /// Attach a persona name
    #[must_use]
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Mood in [-1, 1], negative is subdued and positive is cheerful
    pub fn mood(&self) -> f64 {
        clamp_unit(self.mood)
    }

    /// Energy in [-1, 1], negative is calm and positive is lively
    pub fn energy(&self) -> f64 {
        clamp_unit(self.energy)
    }

    /// Derive new sampling parameters from `base`
    ///
    /// - speed: `base + 0.12·mood + 0.08·energy`
    /// - temperature: `base + 0.15·energy`
    /// - top_p: `base + 0.1·mood`
    /// - top_k: `base + trunc(2·energy)`
    ///
    /// Each result is clamped to its range; floats are rounded to 3 places.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn shape(&self, base: &SamplingParams) -> SamplingParams {
        let mood = self.mood();
        let energy = self.energy();

        let speed_factor = round3(
            (base.speed_factor + 0.12 * mood + 0.08 * energy).clamp(SPEED_RANGE.0, SPEED_RANGE.1),
        );
        let temperature = round3(
            (base.temperature + 0.15 * energy).clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1),
        );
        let top_p = round3((base.top_p + 0.1 * mood).clamp(TOP_P_RANGE.0, TOP_P_RANGE.1));

        let shifted = i64::from(base.top_k) + (energy * 2.0).trunc() as i64;
        let top_k = shifted.clamp(i64::from(TOP_K_RANGE.0), i64::from(TOP_K_RANGE.1)) as u32;

        SamplingParams {
            top_k,
            top_p,
            temperature,
            speed_factor,
        }
    }

    /// Style tags to forward as request extras, keyed by wire name
    pub fn tags(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("style", self.style.as_deref()),
            ("emphasis", self.emphasis.as_deref()),
            ("voice_name", self.persona.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.filter(|v| !v.trim().is_empty()).map(|v| (key, v)))
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
