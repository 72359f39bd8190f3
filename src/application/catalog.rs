//! Phrase catalog facade.
//!
//! Cached single-phrase lookups for whatever front end embeds the crate,
//! plus the invalidation hooks its write paths (and the dispatch
//! coordinator) must call whenever phrase rows change.

use std::sync::Arc;

use crate::application::repos::{PhraseStore, RepoError};
use crate::cache::{CacheKey, CacheLayer, KeyPattern};
use crate::domain::entities::PhraseRecord;

#[derive(Clone)]
pub struct PhraseCatalogService {
    store: Arc<dyn PhraseStore>,
    cache: CacheLayer,
}

impl PhraseCatalogService {
    pub fn new(store: Arc<dyn PhraseStore>, cache: CacheLayer) -> Self {
        Self { store, cache }
    }

    /// Phrase snapshot with replies, served read-through.
    pub async fn get_phrase(&self, id: i64) -> Result<Option<PhraseRecord>, RepoError> {
        let store = self.store.clone();
        self.cache
            .get_or_load(CacheKey::Phrase(id), move || async move {
                store.load_phrase(id).await
            })
            .await
    }

    /// Drop cached snapshots for phrases whose rows just changed. Must run
    /// before the triggering write returns to its caller.
    pub async fn phrases_changed(&self, ids: &[i64]) -> bool {
        let keys: Vec<CacheKey> = ids
            .iter()
            .flat_map(|id| [CacheKey::Phrase(*id), CacheKey::PhraseReplies(*id)])
            .collect();
        self.cache.invalidate(&keys).await
    }

    /// Drop every cached phrase snapshot. Used when a write touches an
    /// unbounded set of rows (cycle reconciliation, full reset).
    pub async fn all_phrases_changed(&self) -> bool {
        self.cache.invalidate_pattern(KeyPattern::AllPhrases).await
    }
}
