//! Language pair for the synthesized text and the reference prompt

use serde::{Deserialize, Serialize};

/// Languages of the text to speak and of the reference prompt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    /// Language of the text being synthesized
    pub text_lang: String,
    /// Language of the reference prompt text
    pub prompt_lang: String,
}

impl Default for LanguagePair {
    fn default() -> Self {
        Self::same("zh")
    }
}

impl LanguagePair {
    /// Create a language pair
    pub fn new(text_lang: impl Into<String>, prompt_lang: impl Into<String>) -> Self {
        Self {
            text_lang: text_lang.into(),
            prompt_lang: prompt_lang.into(),
        }
    }

    /// Use the same language for text and prompt
    pub fn same(lang: impl Into<String>) -> Self {
        let lang = lang.into();
        Self {
            text_lang: lang.clone(),
            prompt_lang: lang,
        }
    }
}
