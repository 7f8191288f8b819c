//! Optimistic client-side view of one practice session.

use std::collections::HashSet;
use std::fmt;

use tokio::sync::watch;
use tracing::{debug, info};

use practice_core::Clock;
use practice_core::api::SessionSnapshot;
use practice_core::model::{CompletionOutcome, QuestionId, SessionId, SessionQuestion, SyncAction};
use services::SessionProgress;

use crate::error::ClientError;
use crate::sync_client::{FlushReason, FlushReport, SyncClient, SyncStatus};

/// Emitted the moment a reveal earns xp, before the server has heard of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardEvent {
    pub question_id: QuestionId,
    pub xp: u32,
    pub xp_earned: u32,
}

type RewardCallback = Box<dyn Fn(&RewardEvent) + Send + Sync>;

/// Seeded once from the server snapshot and then only changed by the user.
/// Every change is applied locally first and queued for sync; local
/// mutations never fail and do nothing once the session is completed.
pub struct LocalSessionState {
    id: SessionId,
    questions: Vec<SessionQuestion>,
    current_index: usize,
    viewed: HashSet<QuestionId>,
    xp_earned: u32,
    completed: bool,
    clock: Clock,
    sync: SyncClient,
    on_reward: Option<RewardCallback>,
}

impl fmt::Debug for LocalSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSessionState")
            .field("id", &self.id)
            .field("current_index", &self.current_index)
            .field("viewed", &self.viewed.len())
            .field("xp_earned", &self.xp_earned)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

impl LocalSessionState {
    #[must_use]
    pub fn new(snapshot: SessionSnapshot, sync: SyncClient, clock: Clock) -> Self {
        let viewed = snapshot
            .questions
            .iter()
            .filter(|q| q.is_viewed)
            .map(|q| q.id.clone())
            .chain(snapshot.viewed_question_ids)
            .collect();
        Self {
            id: snapshot.id,
            questions: snapshot.questions,
            current_index: snapshot.current_index,
            viewed,
            xp_earned: snapshot.xp_earned,
            completed: snapshot.is_completed,
            clock,
            sync,
            on_reward: None,
        }
    }

    /// Register the callback fired on every locally earned reward.
    #[must_use]
    pub fn with_reward_callback(
        mut self,
        callback: impl Fn(&RewardEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_reward = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
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
    pub fn questions(&self) -> &[SessionQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn is_viewed(&self, id: &QuestionId) -> bool {
        self.viewed.contains(id)
    }

    #[must_use]
    pub fn xp_earned(&self) -> u32 {
        self.xp_earned
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress::new(
            self.questions.len(),
            self.viewed.len(),
            self.xp_earned,
            self.completed,
        )
    }

    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.sync.status()
    }

    #[must_use]
    pub fn subscribe_sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.sync.subscribe()
    }

    #[must_use]
    pub fn sync_client(&self) -> &SyncClient {
        &self.sync
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// Reveal the current question's solution.
    ///
    /// Returns the reward event when this is the first reveal; `None` when the
    /// question was already viewed, the session is empty or completed.
    pub fn reveal_solution(&mut self) -> Option<RewardEvent> {
        if self.completed {
            return None;
        }
        let question = self.questions.get_mut(self.current_index)?;
        if !self.viewed.insert(question.id.clone()) {
            return None;
        }
        let at = self.clock.now();
        question.is_viewed = true;
        question.viewed_at = Some(at);
        self.xp_earned = self.xp_earned.saturating_add(question.xp_reward);

        let event = RewardEvent {
            question_id: question.id.clone(),
            xp: question.xp_reward,
            xp_earned: self.xp_earned,
        };
        if let Some(callback) = &self.on_reward {
            callback(&event);
        }
        self.sync
            .queue_sync(SyncAction::reveal(event.question_id.clone(), at));
        Some(event)
    }

    pub fn go_to_next(&mut self) -> bool {
        self.go_to_index(self.current_index.saturating_add(1))
    }

    pub fn go_to_previous(&mut self) -> bool {
        self.go_to_index(self.current_index.saturating_sub(1))
    }

    /// Move to `index`, clamped into the session. Returns whether the
    /// position changed.
    pub fn go_to_index(&mut self, index: usize) -> bool {
        if self.completed || self.questions.is_empty() {
            return false;
        }
        let target = index.min(self.questions.len() - 1);
        if target == self.current_index {
            return false;
        }
        self.current_index = target;
        let wire_index = i64::try_from(target).unwrap_or(i64::MAX);
        self.sync
            .queue_sync(SyncAction::navigate(wire_index, self.clock.now()));
        true
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Drain the queue, then complete the session on the server.
    ///
    /// Nothing is completed if the drain fails, so the bonus is never judged
    /// against reveals the server has not seen.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Completed` if already completed locally, or the
    /// flush or completion failure.
    pub async fn complete_session(&mut self) -> Result<CompletionOutcome, ClientError> {
        if self.completed {
            return Err(ClientError::Completed);
        }
        self.sync.force_flush(FlushReason::PreCompletion).await?;
        let outcome = self.sync.complete_remote().await?;
        self.completed = true;
        self.xp_earned = outcome.xp_earned;
        info!(
            session_id = %self.id,
            bonus = outcome.bonus,
            xp_earned = outcome.xp_earned,
            "session completed"
        );
        Ok(outcome)
    }

    /// Flush when the page is hidden.
    ///
    /// # Errors
    ///
    /// As [`SyncClient::force_flush`].
    pub async fn page_hidden(&self) -> Result<FlushReport, ClientError> {
        self.sync.force_flush(FlushReason::PageHidden).await
    }

    /// Best-effort flush before the view goes away.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::FlushTimeout` if delivery did not finish in time.
    pub async fn teardown(&self) -> Result<FlushReport, ClientError> {
        let result = self.sync.force_flush(FlushReason::Teardown).await;
        if let Err(err) = &result {
            debug!(
                session_id = %self.id,
                error = %err,
                pending = self.sync.pending_actions(),
                "teardown flush incomplete"
            );
        }
        result
    }
}
