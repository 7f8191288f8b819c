//! JSON routes over the session and solution services.

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, async_trait};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use practice_core::api::{
    BatchSyncResponse, CreateSessionRequest, ErrorBody, ErrorCode, MarkViewedRequest,
    MarkViewedResponse, NavigateRequest, NavigateResponse, SessionSnapshot, SolutionResponse,
};
use practice_core::model::{ActionBatch, CompletionOutcome, QuestionId, SessionId, UserId};
use services::{AppServices, SessionError, SessionListItem, SolutionError};

/// Header carrying the caller's user id. Authentication happens upstream.
pub const USER_HEADER: &str = "x-user-id";

pub fn router(services: AppServices) -> Router {
    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/sync", post(sync_batch))
        .route("/sessions/:id/viewed", post(mark_viewed))
        .route("/sessions/:id/navigate", post(navigate))
        .route("/sessions/:id/complete", post(complete))
        .route(
            "/sessions/:id/questions/:question_id/solution",
            post(load_solution),
        )
        .route("/xp", get(xp_balance))
        .with_state(services)
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
}

impl ApiError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<SolutionError> for ApiError {
    fn from(err: SolutionError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = ?self.code, error = %self.message, "request failed");
        }
        let body = ErrorBody {
            code: self.code,
            error: self.message,
        };
        (status, Json(body)).into_response()
    }
}

//
// ─── CALLER ────────────────────────────────────────────────────────────────────
//

/// The user a request acts for, taken from [`USER_HEADER`].
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "missing x-user-id header"))?;
        raw.to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|id| Caller(UserId::new(id)))
            .ok_or_else(|| {
                warn!("rejecting malformed x-user-id header");
                ApiError::new(ErrorCode::Invalid, "x-user-id must be a positive integer")
            })
    }
}

//
// ─── HANDLERS ──────────────────────────────────────────────────────────────────
//

async fn create_session(
    State(app): State<AppServices>,
    Caller(user): Caller,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let session = app.sessions().create(user, &request).await?;
    Ok((StatusCode::CREATED, Json(SessionSnapshot::from(&session))))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<u32>,
}

async fn list_sessions(
    State(app): State<AppServices>,
    Caller(user): Caller,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<SessionListItem>>, ApiError> {
    let items = app.sessions().list_for_owner(user, params.limit).await?;
    Ok(Json(items))
}

async fn get_session(
    State(app): State<AppServices>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = app.sessions().get_by_id(id, user).await?;
    Ok(Json(SessionSnapshot::from(&session)))
}

async fn delete_session(
    State(app): State<AppServices>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
) -> Result<StatusCode, ApiError> {
    app.sessions().delete(id, user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sync_batch(
    State(app): State<AppServices>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
    Json(batch): Json<ActionBatch>,
) -> Result<Json<BatchSyncResponse>, ApiError> {
    Ok(Json(app.sessions().batch_sync(id, &batch, user).await?))
}

async fn mark_viewed(
    State(app): State<AppServices>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
    Json(request): Json<MarkViewedRequest>,
) -> Result<Json<MarkViewedResponse>, ApiError> {
    let response = app
        .sessions()
        .mark_viewed(id, &request.question_id, user)
        .await?;
    Ok(Json(response))
}

async fn navigate(
    State(app): State<AppServices>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
    Json(request): Json<NavigateRequest>,
) -> Result<Json<NavigateResponse>, ApiError> {
    Ok(Json(app.sessions().navigate(id, request.index, user).await?))
}

async fn complete(
    State(app): State<AppServices>,
    Caller(user): Caller,
    Path(id): Path<SessionId>,
) -> Result<Json<CompletionOutcome>, ApiError> {
    Ok(Json(app.sessions().complete(id, user).await?))
}

async fn load_solution(
    State(app): State<AppServices>,
    Caller(user): Caller,
    Path((id, question_id)): Path<(SessionId, QuestionId)>,
) -> Result<Json<SolutionResponse>, ApiError> {
    let response = app
        .solutions()
        .load_solution(id, &question_id, user)
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct XpBalance {
    balance: u64,
}

async fn xp_balance(
    State(app): State<AppServices>,
    Caller(user): Caller,
) -> Result<Json<XpBalance>, ApiError> {
    let balance = app.sessions().xp_balance(user).await?;
    Ok(Json(XpBalance { balance }))
}
