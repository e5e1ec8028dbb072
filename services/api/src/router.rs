//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the per-session WebSocket endpoint, and OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{
        AnalyzeRequest, ErrorResponse, IngestRequest, SearchRequest, SendMessageRequest,
        SendMessageResponse,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::analyze_repository,
        handlers::get_session,
        handlers::send_message,
        handlers::generate_flashcards,
        handlers::generate_plan,
        handlers::ingest_batch,
        handlers::search_code,
    ),
    components(
        schemas(AnalyzeRequest, SendMessageRequest, SendMessageResponse, IngestRequest, SearchRequest, ErrorResponse)
    ),
    tags(
        (name = "Mentor API", description = "Repository tutoring sessions, ingestion, and code search")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/analyze", post(handlers::analyze_repository))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/sessions/{id}/message", post(handlers::send_message))
        .route(
            "/sessions/{id}/flashcards",
            post(handlers::generate_flashcards),
        )
        .route("/sessions/{id}/plan", post(handlers::generate_plan))
        .route("/ingest", post(handlers::ingest_batch))
        .route("/search", post(handlers::search_code))
        .route("/sessions/{id}/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
