//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{DigestSettingsRecord, PhraseRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Entry point to the phrase catalog.
///
/// Mutating selection sequences run on a [`PhraseUnit`], an explicit
/// transaction handle obtained from [`PhraseStore::begin`]. A unit that is
/// dropped without [`PhraseUnit::commit`] leaves row state untouched, so a
/// nested call can never finish a transaction it did not open.
#[async_trait]
pub trait PhraseStore: Send + Sync {
    /// Open a transaction over the catalog.
    async fn begin(&self) -> Result<Box<dyn PhraseUnit>, RepoError>;

    /// Non-transactional single-phrase read, replies included.
    async fn load_phrase(&self, id: i64) -> Result<Option<PhraseRecord>, RepoError>;
}

/// One transaction over the phrase catalog.
///
/// Selection helpers return bare ids; callers fetch detail once the final
/// id set is known. Random ordering is the store's concern (`ORDER BY
/// RANDOM()` in Postgres) so repeated calls over the same eligible set are
/// intentionally non-deterministic.
#[async_trait]
pub trait PhraseUnit: Send {
    async fn count_total(&mut self) -> Result<i64, RepoError>;

    /// Highest cycle number among phrases that have been delivered at least
    /// once; 0 when nothing has ever been delivered.
    async fn current_cycle(&mut self) -> Result<i32, RepoError>;

    async fn count_at_cycle(&mut self, cycle: i32) -> Result<i64, RepoError>;

    /// Up to `limit` phrases with `cycle_number = 0` or no delivery
    /// timestamp, uniformly at random.
    async fn find_eligible_stray(&mut self, limit: i64) -> Result<Vec<i64>, RepoError>;

    /// Up to `limit` undelivered phrases outside `exclude`, uniformly at
    /// random. Used after a reconciliation reset.
    async fn find_unsent_excluding(
        &mut self,
        exclude: &[i64],
        limit: i64,
    ) -> Result<Vec<i64>, RepoError>;

    /// Up to `limit` phrases with `cycle_number < before_cycle`, uniformly
    /// at random.
    async fn find_eligible_rotation(
        &mut self,
        before_cycle: i32,
        limit: i64,
    ) -> Result<Vec<i64>, RepoError>;

    /// Reset delivery bookkeeping for every phrase.
    async fn reset_all(&mut self) -> Result<u64, RepoError>;

    /// Reset delivery bookkeeping for every phrase *not* in `keep`.
    async fn reset_except(&mut self, keep: &[i64]) -> Result<u64, RepoError>;

    /// Stamp the given phrases as delivered in `cycle` at `at`.
    async fn mark_delivered(
        &mut self,
        ids: &[i64],
        cycle: i32,
        at: OffsetDateTime,
    ) -> Result<u64, RepoError>;

    /// Full records for `ids`, ordered by phrase id then reply id, with
    /// replies nested per phrase.
    async fn fetch_detail(&mut self, ids: &[i64]) -> Result<Vec<PhraseRecord>, RepoError>;

    async fn commit(self: Box<Self>) -> Result<(), RepoError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepoError>;
}

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    /// Load the singleton digest settings row, `None` if never written.
    async fn load_digest_settings(&self) -> Result<Option<DigestSettingsRecord>, RepoError>;

    async fn upsert_digest_settings(
        &self,
        settings: DigestSettingsRecord,
    ) -> Result<(), RepoError>;
}
