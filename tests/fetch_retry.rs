// tests/fetch_retry.rs
//! Retry policy of the fetch layer: timeouts/5xx retry with exponential
//! backoff anchored to the per-domain delay; 4xx is terminal.

use std::time::{Duration, Instant};

use news_event_search::scrape::ScraperManager;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn http_500_twice_then_success_returns_content_with_backoff() {
    let server = MockServer::start().await;

    // First two hits fail with 500, the third succeeds.
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>recovered</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let scraper = ScraperManager::new().unwrap();
    let base_delay = Duration::from_millis(100);

    let t0 = Instant::now();
    let body = scraper
        .fetch_url(&format!("{}/flaky", server.uri()), &[], base_delay)
        .await
        .unwrap();
    let elapsed = t0.elapsed();

    assert!(body.contains("recovered"));
    // Two backoff sleeps at ~1x and ~2x the base delay.
    assert!(
        elapsed >= Duration::from_millis(280),
        "expected >= ~300ms of backoff, got {elapsed:?}"
    );
}

#[tokio::test]
async fn http_404_is_attempted_exactly_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let scraper = ScraperManager::new().unwrap();
    let err = scraper
        .fetch_url(
            &format!("{}/missing", server.uri()),
            &[],
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("404"), "got: {err:#}");
    // Mock::expect(1) verifies on drop that no retry happened.
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let scraper = ScraperManager::new().unwrap();
    let err = scraper
        .fetch_url(
            &format!("{}/down", server.uri()),
            &[],
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("503"), "got: {err:#}");
    assert!(err.to_string().contains("3 attempts"), "got: {err:#}");
}
