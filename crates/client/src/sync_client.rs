//! Debounced, batching delivery of session actions.
//!
//! Actions are queued synchronously and flushed as one batch once the queue
//! has been quiet for the debounce window. Only one flush runs at a time;
//! actions queued while it is in flight ride the next one.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use practice_core::model::{CompletionOutcome, SessionId, SyncAction};
use practice_core::replay::SkippedAction;

use crate::config::SyncSettings;
use crate::error::{ClientError, TransportError};
use crate::journal::SyncJournal;
use crate::queue::SyncQueue;
use crate::transport::SyncTransport;

/// Health of background delivery, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Healthy,
    /// Delivery has failed `failures` times in a row.
    Degraded { failures: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Debounce,
    Retry,
    PageHidden,
    Teardown,
    PreCompletion,
    Manual,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlushReason::Debounce => "debounce",
            FlushReason::Retry => "retry",
            FlushReason::PageHidden => "page_hidden",
            FlushReason::Teardown => "teardown",
            FlushReason::PreCompletion => "pre_completion",
            FlushReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// What one successful flush delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub batches_sent: usize,
    /// Batches the server refused outright; they are not retried.
    pub batches_dropped: usize,
    pub xp_awarded: u32,
    pub skipped: Vec<SkippedAction>,
}

#[derive(Default)]
struct State {
    queue: SyncQueue,
    timer: Option<(u64, JoinHandle<()>)>,
    next_timer: u64,
    failures: u32,
    retries: u32,
    journal: Option<SyncJournal>,
}

impl State {
    fn persist(&self) {
        if let Some(journal) = &self.journal {
            if let Err(err) = journal.rewrite(&self.queue) {
                warn!(error = %err, "failed to rewrite sync journal");
            }
        }
    }
}

struct Inner {
    session_id: SessionId,
    transport: Arc<dyn SyncTransport>,
    settings: SyncSettings,
    runtime: Handle,
    state: Mutex<State>,
    flush_lock: tokio::sync::Mutex<()>,
    status: watch::Sender<SyncStatus>,
}

/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
}

impl SyncClient {
    /// Creates a client with an in-memory queue.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoRuntime` outside a tokio runtime.
    pub fn new(
        session_id: SessionId,
        transport: Arc<dyn SyncTransport>,
        settings: SyncSettings,
    ) -> Result<Self, ClientError> {
        Self::build(session_id, transport, settings, State::default())
    }

    /// Creates a client backed by `journal`, reloading whatever an earlier
    /// run left undelivered and scheduling a flush for it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Journal` if the journal cannot be read and
    /// `ClientError::NoRuntime` outside a tokio runtime.
    pub fn recover(
        session_id: SessionId,
        transport: Arc<dyn SyncTransport>,
        settings: SyncSettings,
        journal: SyncJournal,
    ) -> Result<Self, ClientError> {
        let queue = journal.load()?;
        let recovered = queue.len();
        let state = State {
            queue,
            journal: Some(journal),
            ..State::default()
        };
        let client = Self::build(session_id, transport, settings, state)?;
        if recovered > 0 {
            info!(session_id = %session_id, actions = recovered, "recovered unsent sync actions");
            let inner = &client.inner;
            let mut st = inner.state();
            inner.arm(&mut st, inner.settings.debounce(), FlushReason::Debounce);
        }
        Ok(client)
    }

    fn build(
        session_id: SessionId,
        transport: Arc<dyn SyncTransport>,
        settings: SyncSettings,
        state: State,
    ) -> Result<Self, ClientError> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        let (status, _) = watch::channel(SyncStatus::Healthy);
        Ok(Self {
            inner: Arc::new(Inner {
                session_id,
                transport,
                settings,
                runtime,
                state: Mutex::new(state),
                flush_lock: tokio::sync::Mutex::new(()),
                status,
            }),
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    #[must_use]
    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Queue an action and restart the debounce window.
    pub fn queue_sync(&self, action: SyncAction) {
        let mut st = self.inner.state();
        if let Some(journal) = &st.journal {
            if let Err(err) = journal.append(&action) {
                warn!(error = %err, "failed to journal sync action");
            }
        }
        st.queue.push(action);
        st.retries = 0;
        let delay = self.inner.settings.debounce();
        self.inner.arm(&mut st, delay, FlushReason::Debounce);
    }

    /// Send everything queued now, cancelling the pending timer.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` when a batch could not be delivered;
    /// it stays queued and the retry budget starts over.
    pub async fn flush(&self) -> Result<FlushReport, ClientError> {
        self.force_flush(FlushReason::Manual).await
    }

    /// Flush at a lifecycle point. Teardown flushes are bounded by the
    /// configured timeout; whatever misses it stays in the journal.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::FlushTimeout` when a teardown flush runs out of
    /// time, otherwise as [`SyncClient::flush`].
    pub async fn force_flush(&self, reason: FlushReason) -> Result<FlushReport, ClientError> {
        self.inner.cancel_timer();
        self.inner.state().retries = 0;
        if reason == FlushReason::Teardown {
            let limit = self.inner.settings.teardown_timeout();
            return tokio::time::timeout(limit, self.inner.flush(reason))
                .await
                .map_err(|_| ClientError::FlushTimeout(limit))?;
        }
        self.inner.flush(reason).await
    }

    /// Ask the server to complete the session.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the request fails.
    pub async fn complete_remote(&self) -> Result<CompletionOutcome, ClientError> {
        Ok(self.inner.transport.complete(self.inner.session_id).await?)
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        *self.inner.status.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Actions not yet acknowledged by the server.
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        self.inner.state().queue.len()
    }

    #[must_use]
    pub fn has_scheduled_flush(&self) -> bool {
        self.inner.state().timer.is_some()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_timer(&self) {
        if let Some((_, handle)) = self.state().timer.take() {
            handle.abort();
        }
    }

    /// Replace any pending timer with one that flushes after `delay`.
    fn arm(self: &Arc<Self>, st: &mut State, delay: Duration, reason: FlushReason) {
        let generation = st.next_timer;
        st.next_timer = st.next_timer.wrapping_add(1);
        let weak: Weak<Inner> = Arc::downgrade(self);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut st = inner.state();
                if st.timer.as_ref().map(|(g, _)| *g) != Some(generation) {
                    return;
                }
                // Detach rather than abort: this task is the one running.
                st.timer = None;
            }
            if let Err(err) = inner.flush(reason).await {
                debug!(
                    session_id = %inner.session_id,
                    %reason,
                    error = %err,
                    "scheduled flush failed"
                );
            }
        });
        if let Some((_, previous)) = st.timer.replace((generation, handle)) {
            previous.abort();
        }
    }

    async fn flush(self: &Arc<Self>, reason: FlushReason) -> Result<FlushReport, ClientError> {
        let _guard = self.flush_lock.lock().await;

        let batches = {
            let mut st = self.state();
            let batches = st.queue.cut();
            if !batches.is_empty() {
                st.persist();
            }
            batches
        };
        if batches.is_empty() {
            return Ok(FlushReport::default());
        }
        debug!(
            session_id = %self.session_id,
            %reason,
            batches = batches.len(),
            "flushing sync queue"
        );

        let mut report = FlushReport::default();
        for batch in batches {
            match self.transport.send_batch(self.session_id, &batch).await {
                Ok(response) => {
                    report.batches_sent += 1;
                    report.xp_awarded = report.xp_awarded.saturating_add(response.xp_awarded);
                    report.skipped.extend(response.skipped);
                    let mut st = self.state();
                    st.queue.acknowledge(batch.id);
                    st.persist();
                }
                Err(err) if err.is_transient() => {
                    self.record_failure(&err);
                    return Err(err.into());
                }
                Err(err) => {
                    warn!(
                        session_id = %self.session_id,
                        batch_id = %batch.id,
                        error = %err,
                        "server refused sync batch; dropping it"
                    );
                    report.batches_dropped += 1;
                    let mut st = self.state();
                    st.queue.acknowledge(batch.id);
                    st.persist();
                }
            }
        }

        {
            let mut st = self.state();
            st.failures = 0;
            st.retries = 0;
        }
        self.status.send_if_modified(|status| {
            let changed = *status != SyncStatus::Healthy;
            *status = SyncStatus::Healthy;
            changed
        });
        Ok(report)
    }

    fn record_failure(self: &Arc<Self>, err: &TransportError) {
        let mut st = self.state();
        st.failures = st.failures.saturating_add(1);
        let failures = st.failures;
        if failures >= self.settings.degraded_after() {
            self.status.send_replace(SyncStatus::Degraded { failures });
        }
        if st.retries < self.settings.max_retries() {
            st.retries += 1;
            let delay = self.settings.backoff(failures);
            warn!(
                session_id = %self.session_id,
                failures,
                ?delay,
                error = %err,
                "sync failed; retrying"
            );
            self.arm(&mut st, delay, FlushReason::Retry);
        } else {
            warn!(
                session_id = %self.session_id,
                failures,
                error = %err,
                "sync failed; retries exhausted"
            );
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let st = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, handle)) = st.timer.take() {
            handle.abort();
        }
    }
}
