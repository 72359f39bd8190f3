//! Digest settings service.
//!
//! Read-through access to the singleton digest settings row. Reads come
//! from the cache layer; every update invalidates the settings key before
//! the write is acknowledged to the caller.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;

use crate::application::repos::{RepoError, SettingsRepo};
use crate::cache::{CacheKey, CacheLayer};
use crate::domain::entities::DigestSettingsRecord;
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct UpdateDigestSettings {
    pub header: String,
    pub show_tags: bool,
    pub show_notes: bool,
    pub show_replies: bool,
}

#[derive(Clone)]
pub struct DigestSettingsService {
    repo: Arc<dyn SettingsRepo>,
    cache: CacheLayer,
}

impl DigestSettingsService {
    pub fn new(repo: Arc<dyn SettingsRepo>, cache: CacheLayer) -> Self {
        Self { repo, cache }
    }

    /// Current settings, from cache when warm. A row that has never been
    /// written resolves to the built-in defaults.
    pub async fn get(&self) -> Result<DigestSettingsRecord, SettingsError> {
        let repo = self.repo.clone();
        let settings = self
            .cache
            .get_or_load(CacheKey::DigestSettings, move || async move {
                Ok::<_, RepoError>(
                    repo.load_digest_settings()
                        .await?
                        .unwrap_or_else(DigestSettingsRecord::defaults),
                )
            })
            .await?;
        Ok(settings)
    }

    /// Settings for the dispatch path: a read failure degrades to defaults
    /// so a settings outage never blocks delivery.
    pub async fn get_or_default(&self) -> DigestSettingsRecord {
        match self.get().await {
            Ok(settings) => settings,
            Err(err) => {
                warn!(
                    target = "application::settings",
                    error = %err,
                    "digest settings unavailable, using defaults"
                );
                DigestSettingsRecord::defaults()
            }
        }
    }

    /// Validate and persist new settings. The cache key is invalidated
    /// before the update is acknowledged, never refreshed in place.
    pub async fn update(
        &self,
        command: UpdateDigestSettings,
    ) -> Result<DigestSettingsRecord, SettingsError> {
        if command.header.trim().is_empty() {
            return Err(DomainError::validation("header", "must not be empty").into());
        }

        let record = DigestSettingsRecord {
            header: command.header,
            show_tags: command.show_tags,
            show_notes: command.show_notes,
            show_replies: command.show_replies,
            updated_at: OffsetDateTime::now_utc(),
        };

        self.repo.upsert_digest_settings(record.clone()).await?;
        self.cache.invalidate(&[CacheKey::DigestSettings]).await;

        Ok(record)
    }
}
