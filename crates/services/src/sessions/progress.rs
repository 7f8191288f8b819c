use serde::{Deserialize, Serialize};

use practice_core::model::Session;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub total: usize,
    pub viewed: usize,
    pub remaining: usize,
    pub xp_earned: u32,
    pub is_complete: bool,
}

impl SessionProgress {
    #[must_use]
    pub fn new(total: usize, viewed: usize, xp_earned: u32, is_complete: bool) -> Self {
        Self {
            total,
            viewed,
            remaining: total.saturating_sub(viewed),
            xp_earned,
            is_complete,
        }
    }
}

impl From<&Session> for SessionProgress {
    fn from(session: &Session) -> Self {
        Self::new(
            session.total_questions(),
            session.viewed_count(),
            session.xp_earned(),
            session.is_completed(),
        )
    }
}
