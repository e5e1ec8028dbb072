//! Axum Handlers for the REST API
//!
//! The realtime WebSocket channel is the primary interface; these endpoints
//! create sessions, expose state, trigger ingestion, and provide a
//! non-streaming fallback for sending messages.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use mentor_core::ingest::DEFAULT_BATCH_SIZE;
use mentor_core::search::DEFAULT_TOP_K;
use mentor_core::session::{RepoRef, SessionUpdate};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    actor::SessionError,
    models::{
        AnalyzeRequest, ErrorResponse, IngestRequest, SearchRequest, SendMessageRequest,
        SendMessageResponse,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => Self::NotFound(format!("Session '{id}' not found")),
            SessionError::AlreadyExists(id) => {
                Self::Conflict(format!("Session '{id}' already exists"))
            }
            SessionError::Internal(e) => Self::InternalServerError(e),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err)
    }
}

fn parse_repo(raw: &str) -> Result<RepoRef, ApiError> {
    raw.parse::<RepoRef>().map_err(ApiError::BadRequest)
}

/// Analyze a repository and create a tutoring session for it.
///
/// Runs the structure analysis inline (so a bad repository fails the
/// request before any session exists), then spawns background ingestion
/// that drives the cursor until the repository is fully embedded.
#[utoipa::path(
    post,
    path = "/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 201, description = "Session created; body is the session document"),
        (status = 400, description = "Malformed repository reference", body = ErrorResponse),
        (status = 500, description = "Analysis failed", body = ErrorResponse)
    )
)]
pub async fn analyze_repository(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = parse_repo(&payload.repo)?;

    let analysis = state.analyzer.analyze(&repo, &payload.goal).await?;

    let session_id = Uuid::new_v4();
    state
        .sessions
        .init(session_id, repo.clone(), payload.goal)
        .await?;
    let session = state
        .sessions
        .apply_update(
            session_id,
            SessionUpdate {
                analysis: Some(analysis),
                ..Default::default()
            },
        )
        .await?;

    spawn_background_ingestion(state.clone(), repo);

    Ok((StatusCode::CREATED, Json(session)))
}

/// Drives the ingestion cursor to exhaustion, one batch at a time.
fn spawn_background_ingestion(state: Arc<AppState>, repo: RepoRef) {
    tokio::spawn(async move {
        let mut cursor = 0;
        loop {
            let report = match state.pipeline.ingest(&repo, cursor, DEFAULT_BATCH_SIZE).await {
                Ok(report) => report,
                Err(e) => {
                    error!(%repo, cursor, error = ?e, "Background ingestion aborted");
                    return;
                }
            };
            if !report.has_more || report.next_index <= cursor {
                info!(%repo, files = report.next_index, "Background ingestion complete");
                return;
            }
            cursor = report.next_index;
        }
    });
}

/// Get a session's full state.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "The session document"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get_state(id).await?;
    Ok(Json(session))
}

/// Send a message to the tutor without a realtime channel.
///
/// Blocks until the turn completes; reasoning steps are not streamed on
/// this path (they are still recorded on the assistant message).
#[utoipa::path(
    post,
    path = "/sessions/{id}/message",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "The tutor's reply", body = SendMessageResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let reply = state.sessions.send_text(id, payload.message).await?;
    Ok(Json(reply.into()))
}

/// Generate and cache five flashcards for the session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/flashcards",
    responses(
        (status = 200, description = "Exactly five flashcards, or an empty list if generation fell back"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn generate_flashcards(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cards = state.sessions.generate_flashcards(id).await?;
    Ok(Json(cards))
}

/// Generate and cache a study plan for the session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/plan",
    responses(
        (status = 200, description = "The generated study plan"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn generate_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let plan = state.sessions.generate_plan(id).await?;
    Ok(Json(plan))
}

/// Run one ingestion batch explicitly.
///
/// The response carries `has_more` and `next_index`; callers repeat with
/// `next_index` until `has_more` is false.
#[utoipa::path(
    post,
    path = "/ingest",
    request_body = IngestRequest,
    responses(
        (status = 200, description = "Batch statistics and the continuation cursor"),
        (status = 400, description = "Malformed repository reference", body = ErrorResponse)
    )
)]
pub async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = parse_repo(&payload.repo)?;
    let report = state
        .pipeline
        .ingest(
            &repo,
            payload.start_index.unwrap_or(0),
            payload.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        )
        .await?;
    Ok(Json(report))
}

/// Search a repository's indexed source code.
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Ranked matches with content previews"),
        (status = 400, description = "Malformed repository reference", body = ErrorResponse)
    )
)]
pub async fn search_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = parse_repo(&payload.repo)?;
    let hits = state
        .search
        .search(
            &payload.query,
            &repo,
            payload.top_k.unwrap_or(DEFAULT_TOP_K),
        )
        .await?;
    Ok(Json(hits))
}
