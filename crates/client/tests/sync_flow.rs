use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use client::{
    ClientError, FlushReason, SyncClient, SyncJournal, SyncSettings, SyncStatus, SyncTransport,
    TransportError,
};
use practice_core::api::{BatchSyncResponse, CreateSessionRequest, SessionSnapshot};
use practice_core::model::{ActionBatch, CompletionOutcome, QuestionId, SessionId, SyncAction};
use practice_core::time::fixed_now;

#[derive(Default)]
struct ScriptedTransport {
    fail_next: Mutex<VecDeque<TransportError>>,
    fail_always: Mutex<Option<TransportError>>,
    hang: Option<Duration>,
    sent: Mutex<Vec<(Instant, ActionBatch)>>,
}

impl ScriptedTransport {
    fn failing_once(err: TransportError) -> Self {
        Self {
            fail_next: Mutex::new(VecDeque::from([err])),
            ..Self::default()
        }
    }

    fn failing_always(err: TransportError) -> Self {
        Self {
            fail_always: Mutex::new(Some(err)),
            ..Self::default()
        }
    }

    fn recover(&self) {
        *self.fail_always.lock().unwrap() = None;
    }

    fn sent(&self) -> Vec<ActionBatch> {
        self.sent.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
    }

    fn send_times(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl SyncTransport for ScriptedTransport {
    async fn create(&self, _: &CreateSessionRequest) -> Result<SessionSnapshot, TransportError> {
        Err(TransportError::Decode("not scripted".into()))
    }

    async fn fetch(&self, _: SessionId) -> Result<SessionSnapshot, TransportError> {
        Err(TransportError::Decode("not scripted".into()))
    }

    async fn send_batch(
        &self,
        _: SessionId,
        batch: &ActionBatch,
    ) -> Result<BatchSyncResponse, TransportError> {
        self.sent.lock().unwrap().push((Instant::now(), batch.clone()));
        if let Some(delay) = self.hang {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fail_next.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(err) = self.fail_always.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(BatchSyncResponse {
            xp_awarded: 0,
            skipped: Vec::new(),
            version: 1,
            duplicate: false,
        })
    }

    async fn complete(&self, _: SessionId) -> Result<CompletionOutcome, TransportError> {
        Err(TransportError::Decode("not scripted".into()))
    }
}

fn settings(debounce: u64, max_backoff: u64, degraded_after: u32, retries: u32) -> SyncSettings {
    SyncSettings::new(
        Duration::from_secs(debounce),
        Duration::from_secs(max_backoff),
        degraded_after,
        retries,
        Duration::from_secs(1),
    )
    .unwrap()
}

fn default_client(transport: &Arc<ScriptedTransport>) -> SyncClient {
    SyncClient::new(
        SessionId::generate(),
        transport.clone(),
        SyncSettings::default(),
    )
    .unwrap()
}

fn nav(index: i64) -> SyncAction {
    SyncAction::navigate(index, fixed_now())
}

#[tokio::test(start_paused = true)]
async fn a_burst_inside_the_window_is_sent_as_one_batch() {
    let transport = Arc::new(ScriptedTransport::default());
    let client = default_client(&transport);

    for i in 0..3 {
        client.queue_sync(nav(i));
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert!(transport.sent().is_empty());

    tokio::time::sleep(Duration::from_secs(3)).await;
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].len(), 3);
    assert_eq!(client.pending_actions(), 0);
    assert!(!client.has_scheduled_flush());
}

#[tokio::test(start_paused = true)]
async fn failed_batch_is_resent_before_later_actions() {
    let transport = Arc::new(ScriptedTransport::failing_once(TransportError::Network(
        "connection reset".into(),
    )));
    let client = default_client(&transport);

    client.queue_sync(nav(1));
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(client.pending_actions(), 1);

    client.queue_sync(SyncAction::reveal(QuestionId::new("q2"), fixed_now()));
    tokio::time::sleep(Duration::from_secs(3)).await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[1].id, sent[0].id);
    assert_eq!(sent[1].actions, sent[0].actions);
    assert_ne!(sent[2].id, sent[0].id);
    assert_eq!(sent[2].len(), 1);
    assert_eq!(client.pending_actions(), 0);
    assert_eq!(client.status(), SyncStatus::Healthy);
}

#[tokio::test(start_paused = true)]
async fn retries_back_off_then_stop_and_report_degraded() {
    let transport = Arc::new(ScriptedTransport::failing_always(TransportError::Timeout));
    let client = SyncClient::new(SessionId::generate(), transport.clone(), settings(1, 4, 2, 3))
        .unwrap();
    let mut status = client.subscribe();
    let start = Instant::now();

    client.queue_sync(nav(1));
    tokio::time::sleep(Duration::from_secs(30)).await;

    let offsets: Vec<u64> = transport
        .send_times()
        .iter()
        .map(|t| t.duration_since(start).as_secs())
        .collect();
    // Debounce, then 2s, 4s and the 4s cap.
    assert_eq!(offsets, vec![1, 3, 7, 11]);
    assert!(!client.has_scheduled_flush());
    assert_eq!(client.pending_actions(), 1);
    assert!(status.has_changed().unwrap());
    assert_eq!(*status.borrow_and_update(), SyncStatus::Degraded { failures: 4 });

    transport.recover();
    let report = client.flush().await.unwrap();
    assert_eq!(report.batches_sent, 1);
    assert_eq!(client.status(), SyncStatus::Healthy);
    assert_eq!(client.pending_actions(), 0);
}

#[tokio::test(start_paused = true)]
async fn explicit_flush_restarts_exhausted_retries() {
    let transport = Arc::new(ScriptedTransport::failing_always(TransportError::Timeout));
    let client = SyncClient::new(SessionId::generate(), transport.clone(), settings(1, 4, 2, 1))
        .unwrap();

    client.queue_sync(nav(1));
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.sent().len(), 2);
    assert!(!client.has_scheduled_flush());

    assert!(client.flush().await.is_err());
    assert_eq!(transport.sent().len(), 3);
    assert!(client.has_scheduled_flush());

    transport.recover();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.sent().len(), 4);
    assert_eq!(client.pending_actions(), 0);
    assert_eq!(client.status(), SyncStatus::Healthy);
}

#[tokio::test(start_paused = true)]
async fn refused_batches_are_dropped_not_retried() {
    let transport = Arc::new(ScriptedTransport::failing_once(TransportError::Rejected {
        status: 404,
        code: None,
        message: "gone".into(),
    }));
    let client = default_client(&transport);

    client.queue_sync(nav(1));
    let report = client.flush().await.unwrap();
    assert_eq!(report.batches_dropped, 1);
    assert_eq!(client.pending_actions(), 0);
    assert!(!client.has_scheduled_flush());
}

#[tokio::test(start_paused = true)]
async fn teardown_flush_is_bounded_and_keeps_the_batch() {
    let transport = Arc::new(ScriptedTransport {
        hang: Some(Duration::from_secs(60)),
        ..ScriptedTransport::default()
    });
    let client = default_client(&transport);

    client.queue_sync(nav(2));
    let result = client.force_flush(FlushReason::Teardown).await;
    assert!(matches!(result, Err(ClientError::FlushTimeout(d)) if d == Duration::from_secs(2)));
    assert_eq!(client.pending_actions(), 1);
}

#[tokio::test(start_paused = true)]
async fn journal_carries_undelivered_batches_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.jsonl");
    let session_id = SessionId::generate();

    let offline = Arc::new(ScriptedTransport::failing_always(TransportError::Network(
        "offline".into(),
    )));
    let first = SyncClient::recover(
        session_id,
        offline.clone(),
        settings(2, 60, 3, 0),
        SyncJournal::open(&path).unwrap(),
    )
    .unwrap();
    first.queue_sync(nav(1));
    first.queue_sync(nav(2));
    assert!(first.flush().await.is_err());
    let failed_id = offline.sent()[0].id;
    drop(first);

    let online = Arc::new(ScriptedTransport::default());
    let second = SyncClient::recover(
        session_id,
        online.clone(),
        SyncSettings::default(),
        SyncJournal::open(&path).unwrap(),
    )
    .unwrap();
    assert_eq!(second.pending_actions(), 2);
    assert!(second.has_scheduled_flush());

    tokio::time::sleep(Duration::from_secs(3)).await;
    let sent = online.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id, failed_id);
    assert_eq!(sent[0].len(), 2);
    assert!(SyncJournal::open(&path).unwrap().load().unwrap().is_empty());
}

#[test]
fn client_requires_a_runtime_handle() {
    let result = SyncClient::new(
        SessionId::generate(),
        Arc::new(ScriptedTransport::default()),
        SyncSettings::default(),
    );
    assert!(matches!(result, Err(ClientError::NoRuntime)));
}
