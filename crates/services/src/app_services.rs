use std::sync::Arc;

use tracing::info;

use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::sessions::SessionService;
use crate::settings::ServiceSettings;
use crate::solutions::{HttpSolutionProvider, SolutionProvider, SolutionService};

/// Assembles the server-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    sessions: Arc<SessionService>,
    solutions: Arc<SolutionService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, with the solution provider
    /// configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: ServiceSettings,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let provider = HttpSolutionProvider::from_env();
        info!(
            solutions_enabled = provider.enabled(),
            "storage ready"
        );
        Ok(Self::from_storage(storage, clock, settings, Arc::new(provider)))
    }

    /// Build services over in-memory storage.
    #[must_use]
    pub fn in_memory(clock: Clock, provider: Arc<dyn SolutionProvider>) -> Self {
        Self::from_storage(
            Storage::in_memory(),
            clock,
            ServiceSettings::default(),
            provider,
        )
    }

    #[must_use]
    pub fn from_storage(
        storage: Storage,
        clock: Clock,
        settings: ServiceSettings,
        provider: Arc<dyn SolutionProvider>,
    ) -> Self {
        let sessions = SessionService::new(
            clock,
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.content),
            Arc::clone(&storage.ledger),
        )
        .with_settings(settings);
        let solutions = Arc::new(SolutionService::new(sessions.clone(), provider));

        Self {
            storage,
            sessions: Arc::new(sessions),
            solutions,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionService> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn solutions(&self) -> Arc<SolutionService> {
        Arc::clone(&self.solutions)
    }
}
