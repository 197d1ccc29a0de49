//! News Event Search — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the scrape/extract/rank pipeline,
//! session store, and metrics endpoint.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_event_search::extract::ai_client::{build_client_from_config, AiConfig};
use news_event_search::extract::entities::RegexEntityExtractor;
use news_event_search::extract::EventExtractor;
use news_event_search::metrics::Metrics;
use news_event_search::orchestrator::SearchOrchestrator;
use news_event_search::scrape::ScraperManager;
use news_event_search::session::{SessionStore, DEFAULT_PURGE_INTERVAL_SECS, DEFAULT_SESSION_TTL_SECS};
use news_event_search::sources::load_sources_default;
use news_event_search::{create_router, AppState, QueryMatcher};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_event_search=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let sources_cfg = load_sources_default()?;
    let enabled = sources_cfg.enabled();
    if enabled.is_empty() {
        warn!("no enabled sources configured; searches will report no_sources");
    }

    let ai_cfg = if Path::new("config/ai.json").exists() {
        AiConfig::load_from_file("config/ai.json")?
    } else {
        warn!("config/ai.json not found; generative model disabled");
        AiConfig::default()
    };
    let model = build_client_from_config(&ai_cfg);
    info!(provider = model.provider_name(), "generative model client ready");

    let scraper = Arc::new(ScraperManager::new()?);
    let extractor = Arc::new(
        EventExtractor::new(model, Box::new(RegexEntityExtractor)).with_params(ai_cfg.params()),
    );
    let store = Arc::new(SessionStore::new());
    let _purge = store.spawn_purge_task(Duration::from_secs(DEFAULT_PURGE_INTERVAL_SECS));

    let orchestrator = Arc::new(SearchOrchestrator::new(
        scraper,
        extractor,
        QueryMatcher::default(),
        enabled,
    ));

    let metrics = Metrics::init(DEFAULT_SESSION_TTL_SECS);
    let app = create_router(AppState {
        orchestrator,
        store,
    })
    .merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
