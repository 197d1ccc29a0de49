// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /search (no sources configured → no_sources status)
// - GET /session/{id} (unknown → 404)
// - POST /session/{id}/cancel (unknown → still ok)

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use news_event_search::extract::ai_client::MockClient;
use news_event_search::extract::entities::RegexEntityExtractor;
use news_event_search::extract::EventExtractor;
use news_event_search::orchestrator::SearchOrchestrator;
use news_event_search::scrape::ScraperManager;
use news_event_search::session::SessionStore;
use news_event_search::{create_router, AppState, QueryMatcher};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

/// Build the same Router the binary uses, with zero sources and a mock model.
fn test_router() -> Router {
    let extractor = Arc::new(EventExtractor::new(
        Arc::new(MockClient::new("{}")),
        Box::new(RegexEntityExtractor),
    ));
    let orchestrator = Arc::new(SearchOrchestrator::new(
        Arc::new(ScraperManager::new().expect("scraper")),
        extractor,
        QueryMatcher::default(),
        vec![],
    ));
    create_router(AppState {
        orchestrator,
        store: Arc::new(SessionStore::new()),
    })
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    assert_eq!(String::from_utf8(bytes).expect("utf8").trim(), "ok");
}

#[tokio::test]
async fn api_search_without_sources_reports_no_sources() {
    let app = test_router();

    let payload = json!({ "phrase": "protest in Mumbai" });
    let req = Request::builder()
        .method("POST")
        .uri("/search")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST /search");

    let resp = app.oneshot(req).await.expect("oneshot /search");
    assert!(resp.status().is_success(), "got {}", resp.status());

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read json")
        .to_vec();
    let v: Json = serde_json::from_slice(&bytes).expect("parse search json");
    assert_eq!(v["status"], json!("no_sources"));
    assert_eq!(v["total_events"], json!(0));
}

#[tokio::test]
async fn api_unknown_session_is_not_found_but_cancel_still_succeeds() {
    let app = test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/session/does-not-exist")
        .body(Body::empty())
        .expect("build GET /session");
    let resp = app.clone().oneshot(req).await.expect("oneshot /session");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Cancel is an idempotent no-op for unknown sessions.
    let req = Request::builder()
        .method("POST")
        .uri("/session/does-not-exist/cancel")
        .body(Body::empty())
        .expect("build POST cancel");
    let resp = app.oneshot(req).await.expect("oneshot cancel");
    assert!(resp.status().is_success(), "got {}", resp.status());

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read json")
        .to_vec();
    let v: Json = serde_json::from_slice(&bytes).expect("parse cancel json");
    assert_eq!(v["status"], json!("ok"));
}
