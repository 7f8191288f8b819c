use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

use crate::model::ids::{BatchId, QuestionId, SessionId, SourceId, UserId};
use crate::model::question::{Difficulty, QuestionGroup, SessionQuestion};

/// How many applied batch ids a session remembers for redelivery detection.
pub const MAX_TRACKED_BATCHES: usize = 128;

/// A batch the session has already replayed, with the XP it granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedBatch {
    pub id: BatchId,
    pub xp_awarded: u32,
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session has no questions")]
    Empty,

    #[error("session already completed")]
    Completed,

    #[error("index {index} out of range for {total} questions")]
    OutOfRange { index: i64, total: usize },

    #[error("question {0} is not part of this session")]
    UnknownQuestion(QuestionId),

    #[error("duplicate question id {0}")]
    DuplicateQuestion(QuestionId),

    #[error("invalid persisted session: {0}")]
    InvalidPersistedState(String),
}

//
// ─── KINDS ─────────────────────────────────────────────────────────────────────
//

/// Where a session's questions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ExerciseBank,
    Homework,
    Daily,
}

impl SourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::ExerciseBank => "exercise_bank",
            SourceKind::Homework => "homework",
            SourceKind::Daily => "daily",
        }
    }
}

/// How the learner interacts with the questions. Scales rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    Learn,
    Review,
    Practice,
}

/// Filters requested when the session was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Terminal state of a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub completed_at: DateTime<Utc>,
    pub bonus: u32,
}

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// First reveal of the question; carries the reward granted.
    Awarded(u32),
    AlreadyViewed,
}

impl RevealOutcome {
    #[must_use]
    pub fn xp(self) -> u32 {
        match self {
            RevealOutcome::Awarded(xp) => xp,
            RevealOutcome::AlreadyViewed => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub bonus: u32,
    pub xp_earned: u32,
    pub already_completed: bool,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Input for creating a session with zero progress.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: SessionId,
    pub owner: UserId,
    pub source: SourceKind,
    pub source_id: SourceId,
    pub mode: InteractionMode,
    pub questions: Vec<SessionQuestion>,
    pub groups: Vec<QuestionGroup>,
    pub filters: SessionFilters,
    pub started_at: DateTime<Utc>,
}

/// Authoritative record of one practice attempt.
///
/// Self-contained: questions and groups are stored inline so the session can
/// be rebuilt from a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    owner: UserId,
    source: SourceKind,
    source_id: SourceId,
    mode: InteractionMode,
    questions: Vec<SessionQuestion>,
    #[serde(default)]
    groups: Vec<QuestionGroup>,
    current_index: usize,
    #[serde(default)]
    viewed_question_ids: Vec<QuestionId>,
    #[serde(default)]
    xp_earned: u32,
    #[serde(default)]
    completion: Option<Completion>,
    #[serde(default)]
    filters: SessionFilters,
    started_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    #[serde(default)]
    version: u64,
    #[serde(default)]
    applied_batches: VecDeque<AppliedBatch>,
}

impl Session {
    /// Create a fresh session. Any viewed flags on the questions are cleared.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Empty` if there are no questions and
    /// `SessionStateError::DuplicateQuestion` if two questions share an id.
    pub fn new(new: NewSession) -> Result<Self, SessionStateError> {
        if new.questions.is_empty() {
            return Err(SessionStateError::Empty);
        }
        let mut seen = HashSet::with_capacity(new.questions.len());
        for q in &new.questions {
            if !seen.insert(&q.id) {
                return Err(SessionStateError::DuplicateQuestion(q.id.clone()));
            }
        }

        let mut questions = new.questions;
        for q in &mut questions {
            q.is_viewed = false;
            q.viewed_at = None;
        }

        Ok(Self {
            id: new.id,
            owner: new.owner,
            source: new.source,
            source_id: new.source_id,
            mode: new.mode,
            questions,
            groups: new.groups,
            current_index: 0,
            viewed_question_ids: Vec::new(),
            xp_earned: 0,
            completion: None,
            filters: new.filters,
            started_at: new.started_at,
            last_activity_at: new.started_at,
            version: 0,
            applied_batches: VecDeque::new(),
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> UserId {
        self.owner
    }

    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }

    #[must_use]
    pub fn source(&self) -> SourceKind {
        self.source
    }

    #[must_use]
    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    #[must_use]
    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    #[must_use]
    pub fn questions(&self) -> &[SessionQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn groups(&self) -> &[QuestionGroup] {
        &self.groups
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&SessionQuestion> {
        self.questions.get(self.current_index)
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&SessionQuestion> {
        self.questions.iter().find(|q| &q.id == id)
    }

    /// Mutable access for solution loading. Viewed state must go through
    /// [`Session::reveal`].
    pub fn question_mut(&mut self, id: &QuestionId) -> Option<&mut SessionQuestion> {
        self.questions.iter_mut().find(|q| &q.id == id)
    }

    #[must_use]
    pub fn viewed_question_ids(&self) -> &[QuestionId] {
        &self.viewed_question_ids
    }

    #[must_use]
    pub fn viewed_count(&self) -> usize {
        self.viewed_question_ids.len()
    }

    #[must_use]
    pub fn is_viewed(&self, id: &QuestionId) -> bool {
        self.viewed_question_ids.contains(id)
    }

    #[must_use]
    pub fn is_fully_viewed(&self) -> bool {
        self.viewed_count() == self.total_questions()
    }

    #[must_use]
    pub fn xp_earned(&self) -> u32 {
        self.xp_earned
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completion.is_some()
    }

    #[must_use]
    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    #[must_use]
    pub fn filters(&self) -> &SessionFilters {
        &self.filters
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    /// Storage version used for compare-and-swap writes.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Set by storage adapters after a successful write.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_activity_at {
            self.last_activity_at = at;
        }
    }

    #[must_use]
    pub fn has_applied_batch(&self, id: BatchId) -> bool {
        self.applied_batch(id).is_some()
    }

    #[must_use]
    pub fn applied_batch(&self, id: BatchId) -> Option<AppliedBatch> {
        self.applied_batches.iter().find(|b| b.id == id).copied()
    }

    pub fn record_applied_batch(&mut self, id: BatchId, xp_awarded: u32) {
        if self.has_applied_batch(id) {
            return;
        }
        if self.applied_batches.len() == MAX_TRACKED_BATCHES {
            self.applied_batches.pop_front();
        }
        self.applied_batches.push_back(AppliedBatch { id, xp_awarded });
    }

    /// Mark a question as viewed, granting its reward on first reveal only.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Completed` once the session is terminal and
    /// `SessionStateError::UnknownQuestion` for ids outside the session.
    pub fn reveal(
        &mut self,
        question_id: &QuestionId,
        at: DateTime<Utc>,
    ) -> Result<RevealOutcome, SessionStateError> {
        if self.is_completed() {
            return Err(SessionStateError::Completed);
        }
        let Some(question) = self.questions.iter_mut().find(|q| &q.id == question_id) else {
            return Err(SessionStateError::UnknownQuestion(question_id.clone()));
        };
        if self.viewed_question_ids.contains(question_id) {
            return Ok(RevealOutcome::AlreadyViewed);
        }

        question.is_viewed = true;
        question.viewed_at = Some(at);
        let reward = question.xp_reward;
        self.viewed_question_ids.push(question_id.clone());
        self.xp_earned = self.xp_earned.saturating_add(reward);
        Ok(RevealOutcome::Awarded(reward))
    }

    /// Move to `index`. Returns whether the index changed.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Completed` once the session is terminal and
    /// `SessionStateError::OutOfRange` when `index` is negative or past the end.
    pub fn navigate(&mut self, index: i64) -> Result<bool, SessionStateError> {
        if self.is_completed() {
            return Err(SessionStateError::Completed);
        }
        let target = self.checked_index(index)?;
        if target == self.current_index {
            return Ok(false);
        }
        self.current_index = target;
        Ok(true)
    }

    /// Validate `index` against the question count.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::OutOfRange` when `index` is not in `[0, total)`.
    pub fn checked_index(&self, index: i64) -> Result<usize, SessionStateError> {
        let total = self.total_questions();
        usize::try_from(index)
            .ok()
            .filter(|i| *i < total)
            .ok_or(SessionStateError::OutOfRange { index, total })
    }

    /// Complete the session. The bonus is granted only when every question
    /// was viewed at this moment; completing twice is a no-op.
    pub fn complete(&mut self, at: DateTime<Utc>, completion_bonus: u32) -> CompletionOutcome {
        if let Some(done) = self.completion {
            return CompletionOutcome {
                bonus: done.bonus,
                xp_earned: self.xp_earned,
                already_completed: true,
            };
        }

        let bonus = if self.is_fully_viewed() {
            completion_bonus
        } else {
            0
        };
        self.xp_earned = self.xp_earned.saturating_add(bonus);
        self.completion = Some(Completion {
            completed_at: at,
            bonus,
        });
        self.touch(at);

        CompletionOutcome {
            bonus,
            xp_earned: self.xp_earned,
            already_completed: false,
        }
    }

    /// Verify the structural invariants of a session loaded from storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidPersistedState` describing the first
    /// violated invariant.
    pub fn check_invariants(&self) -> Result<(), SessionStateError> {
        let invalid = |msg: String| Err(SessionStateError::InvalidPersistedState(msg));

        if self.questions.is_empty() {
            return invalid("no questions".into());
        }
        if self.current_index >= self.questions.len() {
            return invalid(format!(
                "current_index {} >= {}",
                self.current_index,
                self.questions.len()
            ));
        }

        let mut expected_xp: u32 = 0;
        let mut seen = HashSet::new();
        for id in &self.viewed_question_ids {
            if !seen.insert(id) {
                return invalid(format!("question {id} viewed twice"));
            }
            let Some(q) = self.question(id) else {
                return invalid(format!("viewed question {id} not in session"));
            };
            expected_xp = expected_xp.saturating_add(q.xp_reward);
        }
        if let Some(done) = self.completion {
            expected_xp = expected_xp.saturating_add(done.bonus);
        }
        if expected_xp != self.xp_earned {
            return invalid(format!(
                "xp_earned {} does not match viewed rewards {expected_xp}",
                self.xp_earned
            ));
        }
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::question::{LocalizedText, QuestionHierarchy, SolutionStatus};
    use crate::time::fixed_now;

    pub(crate) fn question(id: &str, xp: u32) -> SessionQuestion {
        SessionQuestion {
            id: QuestionId::new(id),
            source_id: SourceId::new("bank-1"),
            content: LocalizedText::plain(format!("question {id}")),
            difficulty: Difficulty::Easy,
            xp_reward: xp,
            hierarchy: QuestionHierarchy::standalone(),
            solution: None,
            solution_status: SolutionStatus::Pending,
            is_viewed: false,
            viewed_at: None,
        }
    }

    pub(crate) fn session_with(rewards: &[u32]) -> Session {
        let questions = rewards
            .iter()
            .enumerate()
            .map(|(i, xp)| question(&format!("q{}", i + 1), *xp))
            .collect();
        Session::new(NewSession {
            id: SessionId::generate(),
            owner: UserId::new(1),
            source: SourceKind::ExerciseBank,
            source_id: SourceId::new("bank-1"),
            mode: InteractionMode::Practice,
            questions,
            groups: Vec::new(),
            filters: SessionFilters::default(),
            started_at: fixed_now(),
        })
        .unwrap()
    }

    #[test]
    fn new_session_starts_with_zero_progress() {
        let mut q = question("q1", 10);
        q.is_viewed = true;
        let session = Session::new(NewSession {
            id: SessionId::generate(),
            owner: UserId::new(1),
            source: SourceKind::Homework,
            source_id: SourceId::new("hw-1"),
            mode: InteractionMode::Learn,
            questions: vec![q],
            groups: Vec::new(),
            filters: SessionFilters::default(),
            started_at: fixed_now(),
        })
        .unwrap();

        assert_eq!(session.current_index(), 0);
        assert_eq!(session.viewed_count(), 0);
        assert_eq!(session.xp_earned(), 0);
        assert!(!session.questions()[0].is_viewed);
        assert!(!session.is_completed());
        assert!(session.check_invariants().is_ok());
    }

    #[test]
    fn empty_and_duplicate_questions_are_rejected() {
        let base = NewSession {
            id: SessionId::generate(),
            owner: UserId::new(1),
            source: SourceKind::Daily,
            source_id: SourceId::new("daily"),
            mode: InteractionMode::Practice,
            questions: Vec::new(),
            groups: Vec::new(),
            filters: SessionFilters::default(),
            started_at: fixed_now(),
        };
        assert_eq!(
            Session::new(base.clone()).unwrap_err(),
            SessionStateError::Empty
        );

        let dup = NewSession {
            questions: vec![question("q1", 1), question("q1", 1)],
            ..base
        };
        assert!(matches!(
            Session::new(dup),
            Err(SessionStateError::DuplicateQuestion(_))
        ));
    }

    #[test]
    fn reveal_awards_once() {
        let mut session = session_with(&[10, 20]);
        let q1 = QuestionId::new("q1");

        assert_eq!(
            session.reveal(&q1, fixed_now()).unwrap(),
            RevealOutcome::Awarded(10)
        );
        assert_eq!(
            session.reveal(&q1, fixed_now()).unwrap(),
            RevealOutcome::AlreadyViewed
        );
        assert_eq!(session.xp_earned(), 10);
        assert_eq!(session.viewed_count(), 1);
        assert!(session.question(&q1).unwrap().is_viewed);
    }

    #[test]
    fn reveal_unknown_question_fails() {
        let mut session = session_with(&[10]);
        let err = session
            .reveal(&QuestionId::new("nope"), fixed_now())
            .unwrap_err();
        assert!(matches!(err, SessionStateError::UnknownQuestion(_)));
    }

    #[test]
    fn navigate_rejects_out_of_range() {
        let mut session = session_with(&[1, 1, 1]);
        assert!(session.navigate(2).unwrap());
        assert!(!session.navigate(2).unwrap());
        assert_eq!(
            session.navigate(3).unwrap_err(),
            SessionStateError::OutOfRange { index: 3, total: 3 }
        );
        assert!(session.navigate(-1).is_err());
        assert_eq!(session.current_index(), 2);
    }

    #[test]
    fn completion_bonus_requires_full_view_and_is_granted_once() {
        let mut session = session_with(&[10, 20]);
        session.reveal(&QuestionId::new("q1"), fixed_now()).unwrap();
        session.reveal(&QuestionId::new("q2"), fixed_now()).unwrap();

        let first = session.complete(fixed_now(), 25);
        assert_eq!(first.bonus, 25);
        assert!(!first.already_completed);
        assert_eq!(session.xp_earned(), 55);

        let second = session.complete(fixed_now(), 25);
        assert!(second.already_completed);
        assert_eq!(session.xp_earned(), 55);
        assert!(session.check_invariants().is_ok());
    }

    #[test]
    fn partial_completion_has_no_bonus_and_is_terminal() {
        let mut session = session_with(&[10, 20]);
        session.reveal(&QuestionId::new("q1"), fixed_now()).unwrap();
        let outcome = session.complete(fixed_now(), 25);
        assert_eq!(outcome.bonus, 0);
        assert_eq!(session.xp_earned(), 10);

        assert_eq!(
            session.reveal(&QuestionId::new("q2"), fixed_now()),
            Err(SessionStateError::Completed)
        );
        assert_eq!(session.navigate(1), Err(SessionStateError::Completed));
    }

    #[test]
    fn invariants_catch_inconsistent_xp() {
        let mut session = session_with(&[10]);
        session.reveal(&QuestionId::new("q1"), fixed_now()).unwrap();
        let mut json = serde_json::to_value(&session).unwrap();
        json["xp_earned"] = serde_json::json!(99);
        let tampered: Session = serde_json::from_value(json).unwrap();
        assert!(matches!(
            tampered.check_invariants(),
            Err(SessionStateError::InvalidPersistedState(_))
        ));
    }

    #[test]
    fn applied_batches_are_bounded() {
        let mut session = session_with(&[1]);
        let first = BatchId::generate();
        session.record_applied_batch(first, 10);
        assert_eq!(session.applied_batch(first).map(|b| b.xp_awarded), Some(10));
        for _ in 0..MAX_TRACKED_BATCHES {
            session.record_applied_batch(BatchId::generate(), 0);
        }
        assert!(!session.has_applied_batch(first));
    }
}
