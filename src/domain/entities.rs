//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A catalog phrase together with its delivery bookkeeping.
///
/// `cycle_number` and `last_delivered_at` are owned by the distribution
/// engine; everything else is maintained by the external catalog CRUD.
/// `cycle_number == 0` with `last_delivered_at == None` marks a phrase that
/// has never been delivered under the current rotation scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseRecord {
    pub id: i64,
    pub text: String,
    pub translation: String,
    pub note: Option<String>,
    pub tag: Option<String>,
    pub cycle_number: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_delivered_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub replies: Vec<ReplyRecord>,
}

impl PhraseRecord {
    /// True when the phrase has never been delivered under the current
    /// scheme and therefore has catch-up priority over normal rotation.
    pub fn is_stray(&self) -> bool {
        self.cycle_number == 0 || self.last_delivered_at.is_none()
    }
}

/// An accepted reply variant attached to a phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRecord {
    pub id: i64,
    pub phrase_id: i64,
    pub text: String,
    pub translation: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Digest presentation settings, stored as a singleton row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestSettingsRecord {
    pub header: String,
    pub show_tags: bool,
    pub show_notes: bool,
    pub show_replies: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl DigestSettingsRecord {
    /// Built-in settings used when the row has never been written.
    pub fn defaults() -> Self {
        Self {
            header: "*Today's phrases*".to_string(),
            show_tags: true,
            show_notes: true,
            show_replies: true,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }
}
