//! Content-addressed cache key for synthesized audio

use std::fmt;

use serde::{Deserialize, Serialize};

/// BLAKE3 hex digest of a canonical synthesis request
///
/// Keys only ever contain lowercase hex characters, so they are safe to use
/// as file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash canonical request bytes into a key
    #[must_use]
    pub fn digest(canonical: &[u8]) -> Self {
        Self(blake3::hash(canonical).to_hex().to_string())
    }

    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the hex string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(CacheKey::digest(b"hello"), CacheKey::digest(b"hello"));
        assert_ne!(CacheKey::digest(b"hello"), CacheKey::digest(b"hellp"));
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let key = CacheKey::digest(b"abc");
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
