use practice_core::model::{Session, SourceQuestion, UserId};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn user_id_to_i64(user: UserId) -> Result<i64, StorageError> {
    u64_to_i64("owner_id", user.value())
}

/// The session document is stored without trusting its embedded version;
/// the `version` column is authoritative.
pub(crate) fn session_document(session: &Session) -> Result<String, StorageError> {
    serde_json::to_string(session).map_err(ser)
}

pub(crate) fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StorageError> {
    let document: String = row.try_get("document").map_err(ser)?;
    let version = i64_to_u64("version", row.try_get("version").map_err(ser)?)?;

    let mut session: Session = serde_json::from_str(&document).map_err(ser)?;
    session.set_version(version);
    session.check_invariants().map_err(ser)?;
    Ok(session)
}

pub(crate) fn map_content_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SourceQuestion, StorageError> {
    let payload: String = row.try_get("payload").map_err(ser)?;
    serde_json::from_str(&payload).map_err(ser)
}
