use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use practice_core::api::{
    BatchSyncResponse, CreateSessionRequest, MarkViewedResponse, NavigateResponse,
};
use practice_core::model::{
    ActionBatch, CompletionOutcome, NewSession, QuestionId, RevealOutcome, Session, SessionId,
    UserId,
};
use practice_core::replay::{ReplayReport, replay};
use storage::repository::{
    ContentRepository, LedgerCredit, SessionRepository, StorageError, XpLedger,
};

use super::plan::SessionPlanBuilder;
use super::view::SessionListItem;
use crate::Clock;
use crate::error::SessionError;
use crate::settings::ServiceSettings;

//
// ─── MUTATION RESULT ───────────────────────────────────────────────────────────
//

/// What a mutation did to a loaded session. Only dirty sessions are written.
pub(crate) struct Applied<T> {
    pub value: T,
    pub dirty: bool,
}

impl<T> Applied<T> {
    pub(crate) fn dirty(value: T) -> Self {
        Self { value, dirty: true }
    }

    pub(crate) fn clean(value: T) -> Self {
        Self {
            value,
            dirty: false,
        }
    }
}

enum BatchOutcome {
    Replayed(ReplayReport),
    /// Already applied; carries the XP the first delivery granted.
    Duplicate(u32),
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Server authority for practice sessions.
///
/// Every mutation loads the stored session, applies the change on a working
/// copy and writes it back with a compare-and-swap on the session version,
/// reloading and re-applying on conflict.
#[derive(Clone)]
pub struct SessionService {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    content: Arc<dyn ContentRepository>,
    ledger: Arc<dyn XpLedger>,
    settings: ServiceSettings,
    shuffle: bool,
}

impl SessionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionRepository>,
        content: Arc<dyn ContentRepository>,
        ledger: Arc<dyn XpLedger>,
    ) -> Self {
        Self {
            clock,
            sessions,
            content,
            ledger,
            settings: ServiceSettings::default(),
            shuffle: true,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Enable or disable shuffling during count-limited sampling.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Build and persist a new session with zero progress.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` when no candidate survives filtering and
    /// `SessionError::Storage` if the content or session repositories fail.
    pub async fn create(
        &self,
        owner: UserId,
        request: &CreateSessionRequest,
    ) -> Result<Session, SessionError> {
        let candidates = self
            .content
            .list_source_questions(request.source, &request.source_id)
            .await?;
        let candidate_count = candidates.len();

        let plan = SessionPlanBuilder::new(
            &request.source_id,
            request.mode,
            self.settings.xp_rules(),
            &request.filters,
        )
        .with_shuffle(self.shuffle)
        .build(candidates);

        if plan.is_empty() {
            debug!(
                source = request.source.as_str(),
                source_id = %request.source_id,
                candidates = candidate_count,
                "no questions left after filtering"
            );
            return Err(SessionError::Empty);
        }

        let session = Session::new(NewSession {
            id: SessionId::generate(),
            owner,
            source: request.source,
            source_id: request.source_id.clone(),
            mode: request.mode,
            questions: plan.questions,
            groups: plan.groups,
            filters: request.filters.clone(),
            started_at: self.clock.now(),
        })?;
        self.sessions.insert_session(&session).await?;

        info!(
            session_id = %session.id(),
            owner = %owner,
            questions = session.total_questions(),
            eligible = plan.eligible,
            "session created"
        );
        Ok(session)
    }

    /// Replay a batch of client actions against the stored session.
    ///
    /// Returns only the XP granted by this call. A batch id the session has
    /// already applied is acknowledged without replaying; its ledger credit
    /// is re-issued under the same key, so a credit that failed after the
    /// session write is completed by the redelivery.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound`, `SessionError::Unauthorized`,
    /// `SessionError::Conflict` when retries are exhausted, or
    /// `SessionError::Storage`.
    pub async fn batch_sync(
        &self,
        id: SessionId,
        batch: &ActionBatch,
        user: UserId,
    ) -> Result<BatchSyncResponse, SessionError> {
        let (session, outcome) = self
            .update_with_retry(id, user, |session, _now| {
                if let Some(applied) = session.applied_batch(batch.id) {
                    return Ok(Applied::clean(BatchOutcome::Duplicate(applied.xp_awarded)));
                }
                let report = replay(session, &batch.actions);
                if report.changed() {
                    session.record_applied_batch(batch.id, report.xp_awarded);
                    Ok(Applied::dirty(BatchOutcome::Replayed(report)))
                } else {
                    Ok(Applied::clean(BatchOutcome::Replayed(report)))
                }
            })
            .await?;

        let report = match outcome {
            BatchOutcome::Replayed(report) => report,
            BatchOutcome::Duplicate(granted) => {
                debug!(session_id = %id, batch_id = %batch.id, "batch already applied");
                if granted > 0 {
                    self.credit(user, granted, format!("batch:{}", batch.id))
                        .await?;
                }
                return Ok(BatchSyncResponse {
                    xp_awarded: 0,
                    skipped: Vec::new(),
                    version: session.version(),
                    duplicate: true,
                });
            }
        };

        if !report.skipped.is_empty() {
            debug!(
                session_id = %id,
                batch_id = %batch.id,
                skipped = report.skipped.len(),
                "batch contained actions that were not applied"
            );
        }

        if report.xp_awarded > 0 {
            self.credit(user, report.xp_awarded, format!("batch:{}", batch.id))
                .await?;
        }

        debug!(
            session_id = %id,
            batch_id = %batch.id,
            actions = batch.len(),
            xp_awarded = report.xp_awarded,
            version = session.version(),
            "batch synced"
        );

        Ok(BatchSyncResponse {
            xp_awarded: report.xp_awarded,
            skipped: report.skipped,
            version: session.version(),
            duplicate: false,
        })
    }

    /// Mark one question as viewed outside of a batch.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion`, `SessionError::Completed`, or
    /// the ownership and storage errors of [`Self::batch_sync`].
    pub async fn mark_viewed(
        &self,
        id: SessionId,
        question_id: &QuestionId,
        user: UserId,
    ) -> Result<MarkViewedResponse, SessionError> {
        let (session, outcome) = self
            .update_with_retry(id, user, |session, now| {
                let outcome = session.reveal(question_id, now)?;
                Ok(match outcome {
                    RevealOutcome::Awarded(_) => Applied::dirty(outcome),
                    RevealOutcome::AlreadyViewed => Applied::clean(outcome),
                })
            })
            .await?;

        let xp_awarded = outcome.xp();
        if xp_awarded > 0 {
            self.credit(user, xp_awarded, format!("reveal:{id}:{question_id}"))
                .await?;
        }

        Ok(MarkViewedResponse {
            xp_awarded,
            xp_earned: session.xp_earned(),
        })
    }

    /// Move the session to `index`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::OutOfRange` when `index` is not a valid position
    /// and `SessionError::Completed` once the session is terminal.
    pub async fn navigate(
        &self,
        id: SessionId,
        index: i64,
        user: UserId,
    ) -> Result<NavigateResponse, SessionError> {
        let (session, _) = self
            .update_with_retry(id, user, |session, _now| {
                let changed = session.navigate(index)?;
                Ok(if changed {
                    Applied::dirty(())
                } else {
                    Applied::clean(())
                })
            })
            .await?;

        Ok(NavigateResponse {
            current_index: session.current_index(),
        })
    }

    /// Complete the session. The bonus is granted only when every question is
    /// viewed; a second call returns the original outcome.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound`, `SessionError::Unauthorized`, or
    /// `SessionError::Storage`.
    pub async fn complete(
        &self,
        id: SessionId,
        user: UserId,
    ) -> Result<CompletionOutcome, SessionError> {
        let bonus = self.settings.xp_rules().completion_bonus();
        let (_session, outcome) = self
            .update_with_retry(id, user, |session, now| {
                let outcome = session.complete(now, bonus);
                Ok(if outcome.already_completed {
                    Applied::clean(outcome)
                } else {
                    Applied::dirty(outcome)
                })
            })
            .await?;

        // Retried on repeat completions too; the ledger key makes it a no-op.
        if outcome.bonus > 0 {
            self.credit(user, outcome.bonus, format!("complete:{id}"))
                .await?;
        }

        if !outcome.already_completed {
            info!(
                session_id = %id,
                bonus = outcome.bonus,
                xp_earned = outcome.xp_earned,
                "session completed"
            );
        }
        Ok(outcome)
    }

    /// Fetch a session for its owner.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` or `SessionError::Unauthorized`.
    pub async fn get_by_id(&self, id: SessionId, user: UserId) -> Result<Session, SessionError> {
        self.load_owned(id, user).await
    }

    /// Delete a session owned by `user`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` or `SessionError::Unauthorized`.
    pub async fn delete(&self, id: SessionId, user: UserId) -> Result<(), SessionError> {
        self.load_owned(id, user).await?;
        self.sessions.delete_session(id).await.map_err(not_found)?;
        info!(session_id = %id, "session deleted");
        Ok(())
    }

    /// Most recently active sessions of `user`, capped by the configured limit.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the repository fails.
    pub async fn list_for_owner(
        &self,
        user: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<SessionListItem>, SessionError> {
        let cap = self.settings.list_limit();
        let limit = limit.map_or(cap, |l| l.clamp(1, cap));
        let sessions = self.sessions.list_sessions(user, limit).await?;
        Ok(sessions.iter().map(SessionListItem::from).collect())
    }

    /// Total XP credited to `user`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the ledger fails.
    pub async fn xp_balance(&self, user: UserId) -> Result<u64, SessionError> {
        Ok(self.ledger.balance(user).await?)
    }

    async fn load_owned(&self, id: SessionId, user: UserId) -> Result<Session, SessionError> {
        let session = self
            .sessions
            .get_session(id)
            .await?
            .ok_or(SessionError::NotFound)?;
        if !session.is_owned_by(user) {
            warn!(session_id = %id, user = %user, "rejected access to foreign session");
            return Err(SessionError::Unauthorized);
        }
        Ok(session)
    }

    /// Load, mutate and compare-and-swap the session, re-applying `op` on a
    /// fresh copy after each version conflict.
    pub(crate) async fn update_with_retry<T, F>(
        &self,
        id: SessionId,
        user: UserId,
        mut op: F,
    ) -> Result<(Session, T), SessionError>
    where
        T: Send,
        F: FnMut(&mut Session, DateTime<Utc>) -> Result<Applied<T>, SessionError> + Send,
    {
        let attempts = self.settings.max_conflict_retries() + 1;
        for attempt in 1..=attempts {
            let mut session = self.load_owned(id, user).await?;
            let now = self.clock.now();
            let applied = op(&mut session, now)?;
            if !applied.dirty {
                return Ok((session, applied.value));
            }

            session.touch(now);
            match self.sessions.update_session(&session).await {
                Ok(version) => {
                    session.set_version(version);
                    return Ok((session, applied.value));
                }
                Err(StorageError::Conflict) => {
                    debug!(session_id = %id, attempt, "version conflict, reloading");
                }
                Err(err) => return Err(not_found(err)),
            }
        }

        warn!(session_id = %id, attempts, "giving up after repeated version conflicts");
        Err(SessionError::Conflict { attempts })
    }

    async fn credit(&self, user: UserId, amount: u32, key: String) -> Result<(), SessionError> {
        let credited = self
            .ledger
            .credit(&LedgerCredit {
                user,
                amount,
                key,
                at: self.clock.now(),
            })
            .await?;
        if !credited {
            debug!(user = %user, amount, "ledger credit already recorded");
        }
        Ok(())
    }
}

fn not_found(err: StorageError) -> SessionError {
    match err {
        StorageError::NotFound => SessionError::NotFound,
        other => SessionError::Storage(other),
    }
}
