//! Synthesis request entity
//!
//! A `SynthesisRequest` carries everything the backend needs to produce one
//! audio clip. Its identity is the cache key: a BLAKE3 digest over a
//! canonical JSON rendering in which object keys are sorted and floats are
//! rounded to six decimal places, so logically identical requests hash to
//! the same key regardless of how they were assembled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::value_objects::{CacheKey, LanguagePair, SamplingParams, SpeechProfile};

/// Backend split method meaning "do not split the text any further"
pub const DEFAULT_TEXT_SPLIT_METHOD: &str = "cut0";

/// Decimal places kept for floats in the canonical form
const CANONICAL_FLOAT_PLACES: i32 = 6;

/// A single text-to-speech request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Text to speak
    pub text: String,
    /// Path of the reference audio on the backend host
    pub ref_audio_path: String,
    /// Transcript of the reference audio
    pub prompt_text: String,
    /// Languages of text and prompt
    pub languages: LanguagePair,
    /// Decoding parameters
    pub params: SamplingParams,
    /// Backend text split method
    pub text_split_method: String,
    /// Additional wire fields such as `batch_size`, `seed` or style tags
    #[serde(default)]
    pub extras: BTreeMap<String, Value>,
}

impl SynthesisRequest {
    /// Create a request with default languages and parameters
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ref_audio_path: String::new(),
            prompt_text: String::new(),
            languages: LanguagePair::default(),
            params: SamplingParams::default(),
            text_split_method: DEFAULT_TEXT_SPLIT_METHOD.to_string(),
            extras: BTreeMap::new(),
        }
    }

    /// Set the reference voice
    #[must_use]
    pub fn with_reference(
        mut self,
        ref_audio_path: impl Into<String>,
        prompt_text: impl Into<String>,
    ) -> Self {
        self.ref_audio_path = ref_audio_path.into();
        self.prompt_text = prompt_text.into();
        self
    }

    /// Set the language pair
    #[must_use]
    pub fn with_languages(mut self, languages: LanguagePair) -> Self {
        self.languages = languages;
        self
    }

    /// Set the sampling parameters
    #[must_use]
    pub const fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    /// Set the backend split method
    #[must_use]
    pub fn with_split_method(mut self, method: impl Into<String>) -> Self {
        self.text_split_method = method.into();
        self
    }

    /// Add or replace an extra wire field
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Apply a speech profile
    ///
    /// Sampling parameters are reshaped; style tags are added as extras only
    /// where the request does not already carry them.
    #[must_use]
    pub fn with_profile(mut self, profile: &SpeechProfile) -> Self {
        self.params = profile.shape(&self.params);
        for (key, value) in profile.tags() {
            self.extras
                .entry(key.to_string())
                .or_insert_with(|| Value::String(value.to_string()));
        }
        self
    }

    /// Render the flat JSON body sent to the backend
    ///
    /// Extras are merged last and may override core fields.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("text".into(), Value::String(self.text.clone()));
        payload.insert(
            "text_lang".into(),
            Value::String(self.languages.text_lang.clone()),
        );
        payload.insert(
            "ref_audio_path".into(),
            Value::String(self.ref_audio_path.clone()),
        );
        payload.insert("prompt_text".into(), Value::String(self.prompt_text.clone()));
        payload.insert(
            "prompt_lang".into(),
            Value::String(self.languages.prompt_lang.clone()),
        );
        payload.insert("top_k".into(), Value::from(self.params.top_k));
        payload.insert("top_p".into(), float_value(self.params.top_p));
        payload.insert("temperature".into(), float_value(self.params.temperature));
        payload.insert("speed_factor".into(), float_value(self.params.speed_factor));
        payload.insert(
            "text_split_method".into(),
            Value::String(self.text_split_method.clone()),
        );
        for (key, value) in &self.extras {
            payload.insert(key.clone(), value.clone());
        }
        payload
    }

    /// Canonical serialization used for hashing
    pub fn canonical_json(&self) -> String {
        canonicalize(&Value::Object(self.to_payload())).to_string()
    }

    /// Content-addressed identity of this request
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::digest(self.canonical_json().as_bytes())
    }

    /// Number of characters in the text
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Sort object keys and round floats, recursively
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = Map::new();
            for (key, value) in sorted {
                out.insert(key.clone(), value);
            }
            Value::Object(out)
        },
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(number) if number.is_f64() => number.as_f64().map_or(Value::Null, |f| {
            let scale = 10f64.powi(CANONICAL_FLOAT_PLACES);
            float_value((f * scale).round() / scale)
        }),
        other => other.clone(),
    }
}
