//! Postgres implementation of the digest settings repository.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{RepoError, SettingsRepo};
use crate::domain::entities::DigestSettingsRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct DigestSettingsRow {
    header: String,
    show_tags: bool,
    show_notes: bool,
    show_replies: bool,
    updated_at: OffsetDateTime,
}

impl From<DigestSettingsRow> for DigestSettingsRecord {
    fn from(row: DigestSettingsRow) -> Self {
        Self {
            header: row.header,
            show_tags: row.show_tags,
            show_notes: row.show_notes,
            show_replies: row.show_replies,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl SettingsRepo for PostgresRepositories {
    async fn load_digest_settings(&self) -> Result<Option<DigestSettingsRecord>, RepoError> {
        let row: Option<DigestSettingsRow> = sqlx::query_as(
            "SELECT header, show_tags, show_notes, show_replies, updated_at \
             FROM digest_settings WHERE id = 1",
        )
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(DigestSettingsRecord::from))
    }

    async fn upsert_digest_settings(
        &self,
        settings: DigestSettingsRecord,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO digest_settings (id, header, show_tags, show_notes, show_replies, updated_at) \
             VALUES (1, $1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET \
                 header = EXCLUDED.header, \
                 show_tags = EXCLUDED.show_tags, \
                 show_notes = EXCLUDED.show_notes, \
                 show_replies = EXCLUDED.show_replies, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(settings.header)
        .bind(settings.show_tags)
        .bind(settings.show_notes)
        .bind(settings.show_replies)
        .bind(settings.updated_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
