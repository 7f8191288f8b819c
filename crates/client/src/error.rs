//! Error types for the sync client.

use std::path::PathBuf;

use thiserror::Error;

use practice_core::api::ErrorCode;

use crate::config::SyncSettingsError;

/// Failure to deliver a request to the session service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// The request did not reach the service or the reply was lost.
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// The service answered with an error.
    #[error("rejected ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether resending the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Timeout => true,
            TransportError::Rejected { code, status, .. } => match code {
                Some(ErrorCode::Conflict | ErrorCode::Unavailable | ErrorCode::Internal) => true,
                Some(_) => false,
                None => *status >= 500,
            },
            TransportError::Decode(_) => false,
        }
    }

    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            TransportError::Rejected { code, .. } => *code,
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JournalError {
    #[error("journal io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("journal {path} line {line} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("journal encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Settings(#[from] SyncSettingsError),

    #[error("sync client must be created inside a tokio runtime")]
    NoRuntime,

    #[error("flush did not finish within {0:?}")]
    FlushTimeout(std::time::Duration),

    #[error("session is already completed")]
    Completed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_retryable_rejections_are_transient() {
        let rejected = |status, code| TransportError::Rejected {
            status,
            code,
            message: String::new(),
        };
        assert!(TransportError::Timeout.is_transient());
        assert!(rejected(409, Some(ErrorCode::Conflict)).is_transient());
        assert!(rejected(503, None).is_transient());
        assert!(!rejected(403, Some(ErrorCode::Unauthorized)).is_transient());
        assert!(!rejected(404, None).is_transient());
        assert!(!TransportError::Decode("x".into()).is_transient());
    }
}
