//! Shared error types for the services crate.

use thiserror::Error;

use practice_core::api::ErrorCode;
use practice_core::model::{QuestionId, SessionStateError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `SessionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session belongs to another user")]
    Unauthorized,
    #[error("no questions available for session")]
    Empty,
    #[error("index {index} is outside the session (total {total})")]
    OutOfRange { index: i64, total: usize },
    #[error("question {0} is not part of this session")]
    UnknownQuestion(QuestionId),
    #[error("session already completed")]
    Completed,
    #[error("session kept changing underneath; gave up after {attempts} attempts")]
    Conflict { attempts: u32 },
    #[error(transparent)]
    State(SessionStateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<SessionStateError> for SessionError {
    fn from(err: SessionStateError) -> Self {
        match err {
            SessionStateError::Empty => SessionError::Empty,
            SessionStateError::Completed => SessionError::Completed,
            SessionStateError::OutOfRange { index, total } => {
                SessionError::OutOfRange { index, total }
            }
            SessionStateError::UnknownQuestion(id) => SessionError::UnknownQuestion(id),
            other => SessionError::State(other),
        }
    }
}

impl SessionError {
    /// Wire category of this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::NotFound | SessionError::Storage(StorageError::NotFound) => {
                ErrorCode::NotFound
            }
            SessionError::Unauthorized => ErrorCode::Unauthorized,
            SessionError::Empty => ErrorCode::Empty,
            SessionError::OutOfRange { .. } => ErrorCode::OutOfRange,
            SessionError::UnknownQuestion(_) => ErrorCode::Invalid,
            SessionError::Completed
            | SessionError::Conflict { .. }
            | SessionError::Storage(StorageError::Conflict) => ErrorCode::Conflict,
            SessionError::State(_) => ErrorCode::Internal,
            SessionError::Storage(_) => ErrorCode::Unavailable,
        }
    }
}

/// Errors emitted by the solution provider and `SolutionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SolutionError {
    #[error("solution provider is not configured")]
    Disabled,
    #[error("solution provider returned an empty response")]
    EmptyResponse,
    #[error("solution provider request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl SolutionError {
    /// Wire category of this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            SolutionError::Session(err) => err.code(),
            _ => ErrorCode::Unavailable,
        }
    }
}

/// Invalid service tuning values.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("max_conflict_retries must be between 1 and {max}, got {got}")]
    ConflictRetries { got: u32, max: u32 },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_errors_map_onto_service_taxonomy() {
        assert!(matches!(
            SessionError::from(SessionStateError::OutOfRange { index: -1, total: 3 }),
            SessionError::OutOfRange { index: -1, total: 3 }
        ));
        assert!(matches!(
            SessionError::from(SessionStateError::Completed),
            SessionError::Completed
        ));
        assert!(matches!(
            SessionError::from(SessionStateError::InvalidPersistedState("x".into())),
            SessionError::State(_)
        ));
    }

    #[test]
    fn codes_separate_client_mistakes_from_outages() {
        assert_eq!(SessionError::Unauthorized.code(), ErrorCode::Unauthorized);
        assert_eq!(
            SessionError::OutOfRange { index: 9, total: 2 }.code(),
            ErrorCode::OutOfRange
        );
        assert_eq!(SessionError::Conflict { attempts: 4 }.code(), ErrorCode::Conflict);
        assert_eq!(
            SessionError::Storage(StorageError::Connection("down".into())).code(),
            ErrorCode::Unavailable
        );
        assert_eq!(SolutionError::Disabled.code(), ErrorCode::Unavailable);
    }
}
