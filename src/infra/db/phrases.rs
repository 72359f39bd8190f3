//! Postgres implementation of the phrase catalog store.
//!
//! Selection helpers mirror the engine's eligibility classes directly in
//! SQL; uniform-random ordering comes from `ORDER BY RANDOM()` so the store
//! owns the tie-break-free selection semantics. All mutating helpers run on
//! one `PhraseUnit` transaction and only become visible on commit.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;

use crate::application::repos::{PhraseStore, PhraseUnit, RepoError};
use crate::domain::entities::{PhraseRecord, ReplyRecord};

use super::{PostgresRepositories, map_sqlx_error};

const DETAIL_QUERY: &str = r#"
    SELECT p.id,
           p.text,
           p.translation,
           p.note,
           p.tag,
           p.cycle_number,
           p.last_delivered_at,
           p.created_at,
           p.updated_at,
           r.id AS reply_id,
           r.text AS reply_text,
           r.translation AS reply_translation,
           r.updated_at AS reply_updated_at
    FROM phrases p
    LEFT JOIN phrase_replies r ON r.phrase_id = p.id
    WHERE p.id = ANY($1)
    ORDER BY p.id, r.id
"#;

#[derive(sqlx::FromRow)]
struct PhraseDetailRow {
    id: i64,
    text: String,
    translation: String,
    note: Option<String>,
    tag: Option<String>,
    cycle_number: i32,
    last_delivered_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    reply_id: Option<i64>,
    reply_text: Option<String>,
    reply_translation: Option<String>,
    reply_updated_at: Option<OffsetDateTime>,
}

/// Fold join rows (ordered by phrase id, then reply id) into one record per
/// phrase with its replies nested.
fn group_detail_rows(rows: Vec<PhraseDetailRow>) -> Vec<PhraseRecord> {
    let mut phrases: Vec<PhraseRecord> = Vec::new();
    for row in rows {
        if phrases.last().map(|phrase| phrase.id) != Some(row.id) {
            phrases.push(PhraseRecord {
                id: row.id,
                text: row.text,
                translation: row.translation,
                note: row.note,
                tag: row.tag,
                cycle_number: row.cycle_number,
                last_delivered_at: row.last_delivered_at,
                created_at: row.created_at,
                updated_at: row.updated_at,
                replies: Vec::new(),
            });
        }
        if let (Some(reply_id), Some(text), Some(translation), Some(updated_at)) = (
            row.reply_id,
            row.reply_text,
            row.reply_translation,
            row.reply_updated_at,
        ) {
            let phrase = phrases.last_mut().expect("phrase row precedes its replies");
            phrase.replies.push(ReplyRecord {
                id: reply_id,
                phrase_id: phrase.id,
                text,
                translation,
                updated_at,
            });
        }
    }
    phrases
}

pub struct PostgresPhraseUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PhraseStore for PostgresRepositories {
    async fn begin(&self) -> Result<Box<dyn PhraseUnit>, RepoError> {
        let tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PostgresPhraseUnit { tx }))
    }

    async fn load_phrase(&self, id: i64) -> Result<Option<PhraseRecord>, RepoError> {
        let rows: Vec<PhraseDetailRow> = sqlx::query_as(DETAIL_QUERY)
            .bind(vec![id])
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(group_detail_rows(rows).into_iter().next())
    }
}

#[async_trait]
impl PhraseUnit for PostgresPhraseUnit {
    async fn count_total(&mut self) -> Result<i64, RepoError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM phrases")
            .fetch_one(self.tx.as_mut())
            .await
            .map_err(map_sqlx_error)
    }

    async fn current_cycle(&mut self) -> Result<i32, RepoError> {
        sqlx::query_scalar(
            "SELECT COALESCE(MAX(cycle_number), 0) FROM phrases \
             WHERE last_delivered_at IS NOT NULL",
        )
        .fetch_one(self.tx.as_mut())
        .await
        .map_err(map_sqlx_error)
    }

    async fn count_at_cycle(&mut self, cycle: i32) -> Result<i64, RepoError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM phrases WHERE cycle_number = $1")
            .bind(cycle)
            .fetch_one(self.tx.as_mut())
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_eligible_stray(&mut self, limit: i64) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar(
            "SELECT id FROM phrases \
             WHERE cycle_number = 0 OR last_delivered_at IS NULL \
             ORDER BY RANDOM() LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.tx.as_mut())
        .await
        .map_err(map_sqlx_error)
    }

    async fn find_unsent_excluding(
        &mut self,
        exclude: &[i64],
        limit: i64,
    ) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar(
            "SELECT id FROM phrases \
             WHERE last_delivered_at IS NULL AND NOT (id = ANY($1)) \
             ORDER BY RANDOM() LIMIT $2",
        )
        .bind(exclude.to_vec())
        .bind(limit)
        .fetch_all(self.tx.as_mut())
        .await
        .map_err(map_sqlx_error)
    }

    async fn find_eligible_rotation(
        &mut self,
        before_cycle: i32,
        limit: i64,
    ) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar(
            "SELECT id FROM phrases WHERE cycle_number < $1 ORDER BY RANDOM() LIMIT $2",
        )
        .bind(before_cycle)
        .bind(limit)
        .fetch_all(self.tx.as_mut())
        .await
        .map_err(map_sqlx_error)
    }

    async fn reset_all(&mut self) -> Result<u64, RepoError> {
        sqlx::query("UPDATE phrases SET cycle_number = 0, last_delivered_at = NULL")
            .execute(self.tx.as_mut())
            .await
            .map(|result| result.rows_affected())
            .map_err(map_sqlx_error)
    }

    async fn reset_except(&mut self, keep: &[i64]) -> Result<u64, RepoError> {
        sqlx::query(
            "UPDATE phrases SET cycle_number = 0, last_delivered_at = NULL \
             WHERE NOT (id = ANY($1))",
        )
        .bind(keep.to_vec())
        .execute(self.tx.as_mut())
        .await
        .map(|result| result.rows_affected())
        .map_err(map_sqlx_error)
    }

    async fn mark_delivered(
        &mut self,
        ids: &[i64],
        cycle: i32,
        at: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        sqlx::query(
            "UPDATE phrases SET cycle_number = $2, last_delivered_at = $3 WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .bind(cycle)
        .bind(at)
        .execute(self.tx.as_mut())
        .await
        .map(|result| result.rows_affected())
        .map_err(map_sqlx_error)
    }

    async fn fetch_detail(&mut self, ids: &[i64]) -> Result<Vec<PhraseRecord>, RepoError> {
        let rows: Vec<PhraseDetailRow> = sqlx::query_as(DETAIL_QUERY)
            .bind(ids.to_vec())
            .fetch_all(self.tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;
        Ok(group_detail_rows(rows))
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail_row(id: i64, reply: Option<(i64, &str)>) -> PhraseDetailRow {
        PhraseDetailRow {
            id,
            text: format!("phrase {id}"),
            translation: format!("번역 {id}"),
            note: None,
            tag: None,
            cycle_number: 1,
            last_delivered_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
            reply_id: reply.map(|(reply_id, _)| reply_id),
            reply_text: reply.map(|(_, text)| text.to_string()),
            reply_translation: reply.map(|(_, text)| text.to_string()),
            reply_updated_at: reply.map(|_| OffsetDateTime::UNIX_EPOCH),
        }
    }

    #[test]
    fn grouping_nests_replies_under_their_phrase() {
        let rows = vec![
            detail_row(1, Some((10, "first"))),
            detail_row(1, Some((11, "second"))),
            detail_row(2, None),
        ];

        let phrases = group_detail_rows(rows);
        assert_eq!(phrases.len(), 2);
        assert_eq!(phrases[0].id, 1);
        assert_eq!(phrases[0].replies.len(), 2);
        assert_eq!(phrases[0].replies[0].id, 10);
        assert_eq!(phrases[0].replies[1].id, 11);
        assert!(phrases[1].replies.is_empty());
    }

    #[test]
    fn grouping_handles_phrases_without_replies() {
        let phrases = group_detail_rows(vec![detail_row(5, None)]);
        assert_eq!(phrases.len(), 1);
        assert!(phrases[0].replies.is_empty());
    }
}
