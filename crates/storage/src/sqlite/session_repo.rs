use practice_core::model::{Session, SessionId, UserId};

use super::SqliteRepository;
use super::mapping::{conn, map_session_row, session_document, u64_to_i64, user_id_to_i64};
use crate::repository::{SessionRepository, StorageError};

fn session_key(id: SessionId) -> String {
    id.value().to_string()
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_session(&self, session: &Session) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO sessions
                (id, owner_id, version, document, started_at, updated_at, completed)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(session_key(session.id()))
        .bind(user_id_to_i64(session.owner())?)
        .bind(u64_to_i64("version", session.version())?)
        .bind(session_document(session)?)
        .bind(session.started_at())
        .bind(session.last_activity_at())
        .bind(session.is_completed())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::Conflict)
            }
            Err(e) => Err(conn(e)),
        }
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query("SELECT version, document FROM sessions WHERE id = ?1")
            .bind(session_key(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn update_session(&self, session: &Session) -> Result<u64, StorageError> {
        let expected = u64_to_i64("version", session.version())?;
        let next = session.version() + 1;

        let mut stored = session.clone();
        stored.set_version(next);

        let result = sqlx::query(
            r"
            UPDATE sessions
            SET version = ?1, document = ?2, updated_at = ?3, completed = ?4
            WHERE id = ?5 AND version = ?6
            ",
        )
        .bind(u64_to_i64("version", next)?)
        .bind(session_document(&stored)?)
        .bind(stored.last_activity_at())
        .bind(stored.is_completed())
        .bind(session_key(session.id()))
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if result.rows_affected() == 1 {
            return Ok(next);
        }

        let exists = sqlx::query("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(session_key(session.id()))
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        if exists.is_some() {
            Err(StorageError::Conflict)
        } else {
            Err(StorageError::NotFound)
        }
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_key(id))
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        owner: UserId,
        limit: u32,
    ) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT version, document
            FROM sessions
            WHERE owner_id = ?1
            ORDER BY updated_at DESC, id ASC
            LIMIT ?2
            ",
        )
        .bind(user_id_to_i64(owner)?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_session_row).collect()
    }
}
