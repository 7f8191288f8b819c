use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use practice_core::model::{InteractionMode, Session, SessionId, SourceId, SourceKind};

use super::progress::SessionProgress;

/// Compact list entry for an owner's session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionListItem {
    pub id: SessionId,
    pub source: SourceKind,
    pub source_id: SourceId,
    pub mode: InteractionMode,
    pub progress: SessionProgress,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl From<&Session> for SessionListItem {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id(),
            source: session.source(),
            source_id: session.source_id().clone(),
            mode: session.mode(),
            progress: SessionProgress::from(session),
            started_at: session.started_at(),
            last_activity_at: session.last_activity_at(),
        }
    }
}
