use async_trait::async_trait;
use chrono::{DateTime, Utc};
use practice_core::model::{Session, SessionId, SourceId, SourceKind, SourceQuestion, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A compare-and-swap write saw a different stored version, or an insert
    /// collided with an existing id.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// One XP credit. `key` makes the credit idempotent: a second credit with
/// the same key is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerCredit {
    pub user: UserId,
    pub amount: u32,
    pub key: String,
    pub at: DateTime<Utc>,
}

/// Persistence for session documents with optimistic concurrency.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Store a new session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id already exists.
    async fn insert_session(&self, session: &Session) -> Result<(), StorageError>;

    /// Fetch a session by id. The returned session carries its stored version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails or the document is corrupt.
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError>;

    /// Write `session` only if the stored version still equals
    /// `session.version()`. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when another writer got there first and
    /// `StorageError::NotFound` if the session was deleted.
    async fn update_session(&self, session: &Session) -> Result<u64, StorageError>;

    /// Remove a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError>;

    /// List an owner's sessions, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    async fn list_sessions(&self, owner: UserId, limit: u32)
    -> Result<Vec<Session>, StorageError>;
}

/// Read access to the upstream question collaborators
/// (exercise bank, homework extraction, daily sets).
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// All questions published under `source_id`, in upstream order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    async fn list_source_questions(
        &self,
        kind: SourceKind,
        source_id: &SourceId,
    ) -> Result<Vec<SourceQuestion>, StorageError>;

    /// Insert or replace a question under `source_id`. Used for seeding.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    async fn upsert_source_question(
        &self,
        kind: SourceKind,
        source_id: &SourceId,
        question: &SourceQuestion,
    ) -> Result<(), StorageError>;
}

/// The XP ledger collaborator.
#[async_trait]
pub trait XpLedger: Send + Sync {
    /// Credit XP. Returns `false` if a credit with the same key already exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    async fn credit(&self, credit: &LedgerCredit) -> Result<bool, StorageError>;

    /// Total XP credited to `user`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    async fn balance(&self, user: UserId) -> Result<u64, StorageError>;
}

type ContentKey = (SourceKind, SourceId);

#[derive(Default)]
struct LedgerState {
    keys: HashSet<String>,
    balances: HashMap<UserId, u64>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    content: Arc<Mutex<HashMap<ContentKey, Vec<SourceQuestion>>>>,
    ledger: Arc<Mutex<LedgerState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut guard = self.sessions.lock().map_err(poisoned)?;
        if guard.contains_key(&session.id()) {
            return Err(StorageError::Conflict);
        }
        guard.insert(session.id(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn update_session(&self, session: &Session) -> Result<u64, StorageError> {
        let mut guard = self.sessions.lock().map_err(poisoned)?;
        let stored = guard.get_mut(&session.id()).ok_or(StorageError::NotFound)?;
        if stored.version() != session.version() {
            return Err(StorageError::Conflict);
        }
        let next = session.version() + 1;
        let mut updated = session.clone();
        updated.set_version(next);
        *stored = updated;
        Ok(next)
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let mut guard = self.sessions.lock().map_err(poisoned)?;
        guard.remove(&id).map(|_| ()).ok_or(StorageError::NotFound)
    }

    async fn list_sessions(
        &self,
        owner: UserId,
        limit: u32,
    ) -> Result<Vec<Session>, StorageError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        let mut owned: Vec<Session> = guard
            .values()
            .filter(|s| s.is_owned_by(owner))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.last_activity_at().cmp(&a.last_activity_at()));
        owned.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(owned)
    }
}

#[async_trait]
impl ContentRepository for InMemoryRepository {
    async fn list_source_questions(
        &self,
        kind: SourceKind,
        source_id: &SourceId,
    ) -> Result<Vec<SourceQuestion>, StorageError> {
        let guard = self.content.lock().map_err(poisoned)?;
        Ok(guard
            .get(&(kind, source_id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_source_question(
        &self,
        kind: SourceKind,
        source_id: &SourceId,
        question: &SourceQuestion,
    ) -> Result<(), StorageError> {
        let mut guard = self.content.lock().map_err(poisoned)?;
        let items = guard.entry((kind, source_id.clone())).or_default();
        match items.iter_mut().find(|q| q.id() == question.id()) {
            Some(existing) => *existing = question.clone(),
            None => items.push(question.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl XpLedger for InMemoryRepository {
    async fn credit(&self, credit: &LedgerCredit) -> Result<bool, StorageError> {
        let mut guard = self.ledger.lock().map_err(poisoned)?;
        if !guard.keys.insert(credit.key.clone()) {
            return Ok(false);
        }
        *guard.balances.entry(credit.user).or_default() += u64::from(credit.amount);
        Ok(true)
    }

    async fn balance(&self, user: UserId) -> Result<u64, StorageError> {
        let guard = self.ledger.lock().map_err(poisoned)?;
        Ok(guard.balances.get(&user).copied().unwrap_or(0))
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
    pub content: Arc<dyn ContentRepository>,
    pub ledger: Arc<dyn XpLedger>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            sessions: Arc::new(repo.clone()),
            content: Arc::new(repo.clone()),
            ledger: Arc::new(repo),
        }
    }
}
