//! Canonical cache keys derived from URL prompt segments

use sha2::{Digest, Sha256};
use std::fmt;

use crate::backend::traits::BackendKind;
use crate::error::{AppError, Result};

/// Keys longer than this get truncated and suffixed with a digest
const MAX_KEY_LEN: usize = 180;
const TRUNCATED_LEN: usize = 160;
const DIGEST_HEX_LEN: usize = 16;

/// Normalized prompt identity.
///
/// Any run of non-alphanumeric characters separates words and words are
/// lowercased, so `A-Red_Cat`, `a red  cat` and `a+red+cat` all map to
/// `a-red-cat`. The same key is the cache filename stem and the
/// single-flight token, and the prompt sent upstream is rebuilt from the
/// same words.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PromptKey {
    key: String,
    prompt: String,
}

impl PromptKey {
    /// Normalize a raw path segment
    pub fn parse(raw: &str) -> Result<Self> {
        let words: Vec<String> = raw
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        if words.is_empty() {
            return Err(AppError::InvalidRequest(format!(
                "prompt '{}' contains no words",
                raw
            )));
        }

        let key = shorten(words.join("-"));
        Ok(Self {
            key,
            prompt: words.join(" "),
        })
    }

    /// Filesystem-safe key
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Prompt text handed to the backend
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

impl fmt::Display for PromptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Identity of one cached image: the backend that renders it and the prompt.
///
/// The same prompt on two backends is two different images, so both the
/// cache entry and the single-flight token are per backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    backend: BackendKind,
    prompt: PromptKey,
}

impl CacheKey {
    pub fn new(backend: BackendKind, prompt: PromptKey) -> Self {
        Self { backend, prompt }
    }

    /// Normalize a raw path segment for `backend`
    pub fn parse(backend: BackendKind, raw: &str) -> Result<Self> {
        Ok(Self::new(backend, PromptKey::parse(raw)?))
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn prompt_key(&self) -> &PromptKey {
        &self.prompt
    }

    /// Prompt text handed to the backend
    pub fn prompt(&self) -> &str {
        self.prompt.prompt()
    }

    /// Entry filename stem, `{backend}--{key}`. Prompt keys never hold `--`.
    pub fn file_stem(&self) -> String {
        format!("{}--{}", self.backend.as_str(), self.prompt.as_str())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}--{}", self.backend.as_str(), self.prompt.as_str())
    }
}

fn shorten(key: String) -> String {
    if key.len() <= MAX_KEY_LEN {
        return key;
    }

    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    let mut cut = TRUNCATED_LEN;
    while !key.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}-{}",
        key[..cut].trim_end_matches('-'),
        &digest[..DIGEST_HEX_LEN]
    )
}
