//! Delivery of client requests to the session service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use practice_core::api::{
    BatchSyncResponse, CreateSessionRequest, ErrorBody, SessionSnapshot,
};
use practice_core::model::{ActionBatch, CompletionOutcome, SessionId, UserId};
use services::SessionService;
use services::error::SessionError;

use crate::error::TransportError;

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-user-id";

#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn create(&self, request: &CreateSessionRequest)
    -> Result<SessionSnapshot, TransportError>;

    async fn fetch(&self, id: SessionId) -> Result<SessionSnapshot, TransportError>;

    /// Deliver one batch. Redelivering an applied batch is safe.
    async fn send_batch(
        &self,
        id: SessionId,
        batch: &ActionBatch,
    ) -> Result<BatchSyncResponse, TransportError>;

    async fn complete(&self, id: SessionId) -> Result<CompletionOutcome, TransportError>;
}

//
// ─── IN-PROCESS ────────────────────────────────────────────────────────────────
//

/// Calls a `SessionService` directly, as the given user.
#[derive(Clone)]
pub struct InProcessTransport {
    service: Arc<SessionService>,
    user: UserId,
}

impl InProcessTransport {
    #[must_use]
    pub fn new(service: Arc<SessionService>, user: UserId) -> Self {
        Self { service, user }
    }
}

fn rejected(err: SessionError) -> TransportError {
    let code = err.code();
    TransportError::Rejected {
        status: code.http_status(),
        code: Some(code),
        message: err.to_string(),
    }
}

#[async_trait]
impl SyncTransport for InProcessTransport {
    async fn create(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionSnapshot, TransportError> {
        let session = self
            .service
            .create(self.user, request)
            .await
            .map_err(rejected)?;
        Ok(SessionSnapshot::from(&session))
    }

    async fn fetch(&self, id: SessionId) -> Result<SessionSnapshot, TransportError> {
        let session = self
            .service
            .get_by_id(id, self.user)
            .await
            .map_err(rejected)?;
        Ok(SessionSnapshot::from(&session))
    }

    async fn send_batch(
        &self,
        id: SessionId,
        batch: &ActionBatch,
    ) -> Result<BatchSyncResponse, TransportError> {
        self.service
            .batch_sync(id, batch, self.user)
            .await
            .map_err(rejected)
    }

    async fn complete(&self, id: SessionId) -> Result<CompletionOutcome, TransportError> {
        self.service
            .complete(id, self.user)
            .await
            .map_err(rejected)
    }
}

//
// ─── HTTP ──────────────────────────────────────────────────────────────────────
//

/// JSON-over-HTTP client for the session routes served by the app.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    user: UserId,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns `TransportError::Network` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        user: UserId,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            user,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = request
            .header(USER_HEADER, self.user.value().to_string())
            .send()
            .await
            .map_err(from_reqwest)?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| TransportError::Decode(e.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(rejection(status, &body))
    }
}

fn from_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

fn rejection(status: StatusCode, body: &str) -> TransportError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => TransportError::Rejected {
            status: status.as_u16(),
            code: Some(parsed.code),
            message: parsed.error,
        },
        Err(_) => TransportError::Rejected {
            status: status.as_u16(),
            code: None,
            message: body.trim().to_owned(),
        },
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn create(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionSnapshot, TransportError> {
        self.send(self.client.post(self.url("/sessions")).json(request))
            .await
    }

    async fn fetch(&self, id: SessionId) -> Result<SessionSnapshot, TransportError> {
        self.send(self.client.get(self.url(&format!("/sessions/{id}"))))
            .await
    }

    async fn send_batch(
        &self,
        id: SessionId,
        batch: &ActionBatch,
    ) -> Result<BatchSyncResponse, TransportError> {
        self.send(
            self.client
                .post(self.url(&format!("/sessions/{id}/sync")))
                .json(batch),
        )
        .await
    }

    async fn complete(&self, id: SessionId) -> Result<CompletionOutcome, TransportError> {
        self.send(self.client.post(self.url(&format!("/sessions/{id}/complete"))))
            .await
    }
}
