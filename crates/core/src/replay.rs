//! Server-side replay of synced client actions against a session.

use serde::{Deserialize, Serialize};

use crate::model::{
    ActionId, ActionKind, QuestionId, RevealOutcome, Session, SessionStateError, SyncAction,
};

/// Why an action in a batch was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    OutOfRange { index: i64, total: usize },
    UnknownQuestion { question_id: QuestionId },
    SessionCompleted,
    /// Completion is only accepted through the dedicated complete operation.
    CompletionNotBatched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedAction {
    pub action_id: ActionId,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// What a replay did to the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub xp_awarded: u32,
    pub revealed: Vec<QuestionId>,
    pub viewed_changed: bool,
    pub index_changed: bool,
    pub skipped: Vec<SkippedAction>,
}

impl ReplayReport {
    /// True when the session needs to be written back.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.viewed_changed || self.index_changed
    }
}

/// Apply `actions` to `session` in client-timestamp order.
///
/// Reveals are idempotent: a question already viewed grants nothing. The
/// final index is the last in-range navigation. Invalid entries are reported
/// in [`ReplayReport::skipped`] and never abort the replay.
pub fn replay(session: &mut Session, actions: &[SyncAction]) -> ReplayReport {
    let mut ordered: Vec<&SyncAction> = actions.iter().collect();
    // Stable: equal timestamps keep arrival order.
    ordered.sort_by_key(|action| action.at);

    let start_index = session.current_index();
    let mut report = ReplayReport::default();

    for action in ordered {
        let skip = |reason| SkippedAction {
            action_id: action.id,
            reason,
        };

        if session.is_completed() {
            report.skipped.push(skip(SkipReason::SessionCompleted));
            continue;
        }

        match &action.kind {
            ActionKind::Reveal { question_id } => match session.reveal(question_id, action.at) {
                Ok(RevealOutcome::Awarded(xp)) => {
                    report.xp_awarded = report.xp_awarded.saturating_add(xp);
                    report.revealed.push(question_id.clone());
                    report.viewed_changed = true;
                }
                Ok(RevealOutcome::AlreadyViewed) => {}
                Err(SessionStateError::UnknownQuestion(id)) => {
                    report
                        .skipped
                        .push(skip(SkipReason::UnknownQuestion { question_id: id }));
                }
                Err(_) => report.skipped.push(skip(SkipReason::SessionCompleted)),
            },
            ActionKind::Navigate { index } => match session.navigate(*index) {
                Ok(_) => {}
                Err(SessionStateError::OutOfRange { index, total }) => {
                    report
                        .skipped
                        .push(skip(SkipReason::OutOfRange { index, total }));
                }
                Err(_) => report.skipped.push(skip(SkipReason::SessionCompleted)),
            },
            ActionKind::Complete => {
                report.skipped.push(skip(SkipReason::CompletionNotBatched));
            }
        }
    }

    report.index_changed = session.current_index() != start_index;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::session::tests::session_with;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn at(secs: i64) -> chrono::DateTime<chrono::Utc> {
        fixed_now() + Duration::seconds(secs)
    }

    #[test]
    fn out_of_order_batches_converge() {
        let reveal = SyncAction::reveal(QuestionId::new("q1"), at(1));
        let nav = SyncAction::navigate(3, at(2));

        let mut a = session_with(&[10, 10, 10, 10]);
        let mut b = a.clone();

        let ra = replay(&mut a, &[reveal.clone(), nav.clone()]);
        let rb = replay(&mut b, &[nav, reveal]);

        assert_eq!(a.current_index(), 3);
        assert_eq!(b.current_index(), 3);
        assert!(a.is_viewed(&QuestionId::new("q1")));
        assert!(b.is_viewed(&QuestionId::new("q1")));
        assert_eq!(ra.xp_awarded, rb.xp_awarded);
        assert_eq!(a, b);
    }

    #[test]
    fn latest_timestamp_wins_for_navigation() {
        let mut session = session_with(&[1, 1, 1, 1]);
        let report = replay(
            &mut session,
            &[SyncAction::navigate(1, at(5)), SyncAction::navigate(2, at(3))],
        );
        assert_eq!(session.current_index(), 1);
        assert!(report.index_changed);
    }

    #[test]
    fn overlapping_batches_award_once() {
        let mut session = session_with(&[10, 20]);
        let reveal = SyncAction::reveal(QuestionId::new("q2"), at(1));

        let first = replay(&mut session, std::slice::from_ref(&reveal));
        let second = replay(&mut session, &[reveal]);

        assert_eq!(first.xp_awarded, 20);
        assert_eq!(second.xp_awarded, 0);
        assert!(!second.changed());
        assert_eq!(session.xp_earned(), 20);
    }

    #[test]
    fn invalid_entries_are_reported_not_fatal() {
        let mut session = session_with(&[10, 10]);
        let bad_nav = SyncAction::navigate(7, at(1));
        let neg_nav = SyncAction::navigate(-1, at(2));
        let unknown = SyncAction::reveal(QuestionId::new("zz"), at(3));
        let complete = SyncAction::complete(at(4));
        let good = SyncAction::reveal(QuestionId::new("q1"), at(5));

        let report = replay(
            &mut session,
            &[
                bad_nav.clone(),
                neg_nav,
                unknown.clone(),
                complete.clone(),
                good,
            ],
        );

        assert_eq!(report.xp_awarded, 10);
        assert_eq!(report.skipped.len(), 4);
        assert_eq!(report.skipped[0].action_id, bad_nav.id);
        assert_eq!(
            report.skipped[0].reason,
            SkipReason::OutOfRange { index: 7, total: 2 }
        );
        assert_eq!(report.skipped[2].action_id, unknown.id);
        assert_eq!(report.skipped[3].reason, SkipReason::CompletionNotBatched);
        assert_eq!(session.current_index(), 0);
        assert!(!report.index_changed);
    }

    #[test]
    fn completed_session_skips_everything() {
        let mut session = session_with(&[10, 10]);
        session.complete(at(0), 25);
        let report = replay(
            &mut session,
            &[
                SyncAction::reveal(QuestionId::new("q1"), at(1)),
                SyncAction::navigate(1, at(2)),
            ],
        );
        assert!(!report.changed());
        assert_eq!(report.skipped.len(), 2);
        assert!(
            report
                .skipped
                .iter()
                .all(|s| s.reason == SkipReason::SessionCompleted)
        );
    }
}
