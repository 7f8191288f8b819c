//! JSON shapes exchanged between the sync client and the session service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    Completion, InteractionMode, QuestionGroup, QuestionId, Session, SessionFilters, SessionId,
    SessionQuestion, Solution, SolutionStatus, SourceId, SourceKind, UserId,
};
use crate::replay::SkippedAction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub source: SourceKind,
    pub source_id: SourceId,
    pub mode: InteractionMode,
    #[serde(default)]
    pub filters: SessionFilters,
}

/// Read-only view of a session, as served to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub owner: UserId,
    pub source: SourceKind,
    pub source_id: SourceId,
    pub mode: InteractionMode,
    pub questions: Vec<SessionQuestion>,
    #[serde(default)]
    pub groups: Vec<QuestionGroup>,
    pub current_index: usize,
    pub viewed_question_ids: Vec<QuestionId>,
    pub viewed_count: usize,
    pub total_questions: usize,
    pub xp_earned: u32,
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,
    pub filters: SessionFilters,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub version: u64,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id(),
            owner: session.owner(),
            source: session.source(),
            source_id: session.source_id().clone(),
            mode: session.mode(),
            questions: session.questions().to_vec(),
            groups: session.groups().to_vec(),
            current_index: session.current_index(),
            viewed_question_ids: session.viewed_question_ids().to_vec(),
            viewed_count: session.viewed_count(),
            total_questions: session.total_questions(),
            xp_earned: session.xp_earned(),
            is_completed: session.is_completed(),
            completion: session.completion(),
            filters: session.filters().clone(),
            started_at: session.started_at(),
            last_activity_at: session.last_activity_at(),
            version: session.version(),
        }
    }
}

/// Result of a batch sync. `xp_awarded` is only what this call granted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSyncResponse {
    pub xp_awarded: u32,
    #[serde(default)]
    pub skipped: Vec<SkippedAction>,
    pub version: u64,
    /// The batch id had already been applied; nothing was replayed.
    #[serde(default)]
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkViewedRequest {
    pub question_id: QuestionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkViewedResponse {
    pub xp_awarded: u32,
    pub xp_earned: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigateRequest {
    pub index: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigateResponse {
    pub current_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionResponse {
    pub question_id: QuestionId,
    pub status: SolutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
}

/// Machine-readable error category carried in error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Unauthorized,
    OutOfRange,
    Invalid,
    Empty,
    Conflict,
    Unavailable,
    Internal,
}

impl ErrorCode {
    /// HTTP status the service answers with for this category.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::NotFound => 404,
            ErrorCode::Unauthorized => 403,
            ErrorCode::OutOfRange | ErrorCode::Invalid => 400,
            ErrorCode::Empty => 422,
            ErrorCode::Conflict => 409,
            ErrorCode::Unavailable => 503,
            ErrorCode::Internal => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::session::tests::session_with;

    #[test]
    fn snapshot_reflects_progress() {
        let mut session = session_with(&[10, 20, 30]);
        session
            .reveal(&QuestionId::new("q2"), crate::time::fixed_now())
            .unwrap();
        session.navigate(2).unwrap();

        let snapshot = SessionSnapshot::from(&session);
        assert_eq!(snapshot.viewed_count, 1);
        assert_eq!(snapshot.total_questions, 3);
        assert_eq!(snapshot.current_index, 2);
        assert_eq!(snapshot.xp_earned, 20);
        assert!(!snapshot.is_completed);
    }

    #[test]
    fn error_codes_map_to_distinct_statuses() {
        assert_eq!(ErrorCode::Unauthorized.http_status(), 403);
        assert_eq!(ErrorCode::Empty.http_status(), 422);
        assert_eq!(ErrorCode::Unavailable.http_status(), 503);
    }

    #[test]
    fn create_request_defaults_filters() {
        let req: CreateSessionRequest = serde_json::from_str(
            r#"{"source":"exercise_bank","source_id":"bank-1","mode":"practice"}"#,
        )
        .unwrap();
        assert_eq!(req.filters, SessionFilters::default());
        assert_eq!(req.source, SourceKind::ExerciseBank);
    }
}
