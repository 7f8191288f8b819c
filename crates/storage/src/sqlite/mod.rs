//! `SQLite` backend for practice storage.
//!
//! One pool serves all three repositories: session documents with a version
//! column for compare-and-swap writes, upstream content items keyed by
//! source, and the XP ledger with its unique idempotency key.

use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{ContentRepository, SessionRepository, Storage, XpLedger};

mod content_repo;
mod ledger_repo;
mod mapping;
mod migrate;
mod session_repo;

/// Applied to every pooled connection.
const CONNECTION_PRAGMAS: [&str; 2] = ["PRAGMA journal_mode = WAL;", "PRAGMA busy_timeout = 5000;"];

/// Implements [`SessionRepository`], [`ContentRepository`] and [`XpLedger`].
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or a
    /// connection pragma fails.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    for pragma in CONNECTION_PRAGMAS {
                        sqlx::query(pragma).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Bring the `sessions`, `content_items` and `xp_ledger` tables up to
    /// the latest schema version.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Connect, migrate, and hand the one repository out as all three
    /// `Storage` ports.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo.clone());
        let content: Arc<dyn ContentRepository> = Arc::new(repo.clone());
        let ledger: Arc<dyn XpLedger> = Arc::new(repo);
        Ok(Self {
            sessions,
            content,
            ledger,
        })
    }
}
