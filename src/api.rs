// src/api.rs
//! Thin HTTP transport over the core pipeline: batch search, SSE streaming,
//! session query, and cancel surfaces. The stream handler only converts
//! `StreamMessage`s to SSE frames; all semantics live in the orchestrator.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use tower_http::cors::CorsLayer;

use crate::orchestrator::SearchOrchestrator;
use crate::session::{SessionStore, SessionView};
use crate::types::{Query, SearchReport, StreamMessage};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SearchOrchestrator>,
    pub store: Arc<SessionStore>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", post(search))
        .route("/search/stream", post(search_stream))
        .route("/session/{id}", get(session_view))
        .route("/session/{id}/cancel", post(session_cancel))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn search(State(state): State<AppState>, Json(query): Json<Query>) -> Json<SearchReport> {
    Json(state.orchestrator.search(&query).await)
}

async fn search_stream(
    State(state): State<AppState>,
    Json(query): Json<Query>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let session = state.store.create_session(query);
    let mut rx = state.orchestrator.clone().search_stream(session);

    let stream = async_stream::stream! {
        while let Some(msg) = rx.recv().await {
            let data = serde_json::to_string(&msg).unwrap_or_else(|_| "{}".to_string());
            yield Ok(SseEvent::default().event(tag_of(&msg)).data(data));
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn tag_of(msg: &StreamMessage) -> &'static str {
    match msg {
        StreamMessage::Progress { .. } => "progress",
        StreamMessage::Event { .. } => "event",
        StreamMessage::Complete { .. } => "complete",
        StreamMessage::Cancelled { .. } => "cancelled",
        StreamMessage::Error { .. } => "error",
    }
}

async fn session_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, StatusCode> {
    state
        .store
        .snapshot(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Always succeeds: cancelling an unknown or already-terminal session is an
/// idempotent no-op.
async fn session_cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    state.store.cancel(&id);
    Json(serde_json::json!({ "status": "ok", "session_id": id }))
}
