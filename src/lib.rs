// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod matcher;
pub mod metrics;
pub mod orchestrator;
pub mod session;
pub mod sources;
pub mod types;

// Scrape + extract stages of the pipeline
pub mod extract;
pub mod scrape;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::extract::event_type::{classify_event_type, EventType};
pub use crate::matcher::{MatcherConfig, QueryMatcher};
pub use crate::orchestrator::SearchOrchestrator;
pub use crate::session::{SessionState, SessionStore};
pub use crate::types::{
    Document, EntitySet, EventRecord, Query, RankedEvent, SearchReport, SearchStatus,
    StreamMessage,
};
