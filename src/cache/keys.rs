//! Cache key taxonomy.
//!
//! The closed set of cache keys and their per-entity TTLs. TTLs are fixed
//! here rather than chosen at call sites so a given entity type always ages
//! out on the same clock.

use std::time::Duration;

const PHRASE_TTL: Duration = Duration::from_secs(1800);
const REPLIES_TTL: Duration = Duration::from_secs(1800);
const SETTINGS_TTL: Duration = Duration::from_secs(3600);

/// A cache entry key, namespaced by entity type and identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Full phrase snapshot, replies included: `phrase:{id}`.
    Phrase(i64),
    /// Reply list only: `phrase:{id}:replies`.
    PhraseReplies(i64),
    /// Singleton digest settings: `digest:settings`.
    DigestSettings,
}

impl CacheKey {
    pub fn render(&self) -> String {
        match self {
            CacheKey::Phrase(id) => format!("phrase:{id}"),
            CacheKey::PhraseReplies(id) => format!("phrase:{id}:replies"),
            CacheKey::DigestSettings => "digest:settings".to_string(),
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            CacheKey::Phrase(_) => PHRASE_TTL,
            CacheKey::PhraseReplies(_) => REPLIES_TTL,
            CacheKey::DigestSettings => SETTINGS_TTL,
        }
    }
}

/// A glob over a key namespace, for writes that touch an unbounded set of
/// derived keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPattern {
    /// Every phrase snapshot and reply list: `phrase:*`.
    AllPhrases,
}

impl KeyPattern {
    pub fn render(&self) -> &'static str {
        match self {
            KeyPattern::AllPhrases => "phrase:*",
        }
    }
}
