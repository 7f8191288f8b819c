use practice_core::model::{SourceId, SourceKind, SourceQuestion};

use super::SqliteRepository;
use super::mapping::{conn, map_content_row, ser};
use crate::repository::{ContentRepository, StorageError};

#[async_trait::async_trait]
impl ContentRepository for SqliteRepository {
    async fn list_source_questions(
        &self,
        kind: SourceKind,
        source_id: &SourceId,
    ) -> Result<Vec<SourceQuestion>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT payload
            FROM content_items
            WHERE source_kind = ?1 AND source_id = ?2
            ORDER BY position ASC, question_id ASC
            ",
        )
        .bind(kind.as_str())
        .bind(source_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_content_row).collect()
    }

    async fn upsert_source_question(
        &self,
        kind: SourceKind,
        source_id: &SourceId,
        question: &SourceQuestion,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(question).map_err(ser)?;
        sqlx::query(
            r"
            INSERT INTO content_items (source_kind, source_id, question_id, position, payload)
            VALUES (
                ?1, ?2, ?3,
                (SELECT COUNT(*) FROM content_items WHERE source_kind = ?1 AND source_id = ?2),
                ?4
            )
            ON CONFLICT(source_kind, source_id, question_id) DO UPDATE SET
                -- keep the original position; only the payload changes
                payload = excluded.payload
            ",
        )
        .bind(kind.as_str())
        .bind(source_id.as_str())
        .bind(question.id().as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
