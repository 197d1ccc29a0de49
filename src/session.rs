// src/session.rs
//! Per-search session state: cancellation flag, partial results, expiry.
//!
//! The store is an explicit keyed map passed around by handle, not a
//! global. The only cross-task mutation is the cancellation flag (set-only,
//! atomic) and the event list (single-writer append by the owning pipeline
//! run; everyone else takes snapshots).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Query, RankedEvent};

/// Sessions are purged this long after creation, regardless of state.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 10 * 60;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sessions_created_total", "Search sessions created.");
        describe_counter!("sessions_cancel_requests_total", "Cancellation requests received.");
        describe_counter!("sessions_purged_total", "Sessions removed by TTL expiry.");
        describe_gauge!("sessions_live", "Sessions currently held in the store.");
    });
}

/// `Running → {Completed | Cancelled | Failed}`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Running)
    }
}

/// One search session. Created at search start, owned by the store.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub query: Query,
    pub created_at: DateTime<Utc>,
    cancelled: AtomicBool,
    state: RwLock<SessionState>,
    events: RwLock<Vec<RankedEvent>>,
}

impl Session {
    fn new(query: Query) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query,
            created_at: Utc::now(),
            cancelled: AtomicBool::new(false),
            state: RwLock::new(SessionState::Running),
            events: RwLock::new(Vec::new()),
        }
    }

    /// Monotonic: once set, never cleared.
    pub fn cancel_requested(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().expect("session state poisoned")
    }

    /// Transition to a terminal state. A no-op once terminal.
    pub fn finish(&self, terminal: SessionState) {
        debug_assert!(terminal.is_terminal());
        let mut state = self.state.write().expect("session state poisoned");
        if !state.is_terminal() {
            *state = terminal;
        }
    }

    /// Append one emitted event. Called only by the owning pipeline run.
    pub fn append_event(&self, event: RankedEvent) {
        self.events.write().expect("session events poisoned").push(event);
    }

    pub fn events_snapshot(&self) -> Vec<RankedEvent> {
        self.events.read().expect("session events poisoned").clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().expect("session events poisoned").len()
    }

    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.created_at).num_seconds() >= ttl.as_secs() as i64
    }
}

/// Serializable snapshot for the session query surface.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub state: SessionState,
    pub query: Query,
    pub events: Vec<RankedEvent>,
    pub created_at: DateTime<Utc>,
}

/// Keyed store of live sessions with TTL-based garbage collection.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn create_session(&self, query: Query) -> Arc<Session> {
        ensure_metrics_described();
        let session = Arc::new(Session::new(query));
        let mut map = self.sessions.write().expect("session map poisoned");
        map.insert(session.id.clone(), session.clone());
        counter!("sessions_created_total").increment(1);
        gauge!("sessions_live").set(map.len() as f64);
        session
    }

    /// Lookup honors the TTL even between purge runs: an expired session is
    /// already not-found.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self
            .sessions
            .read()
            .expect("session map poisoned")
            .get(id)
            .cloned()?;
        if session.is_expired(Utc::now(), self.ttl) {
            return None;
        }
        Some(session)
    }

    pub fn snapshot(&self, id: &str) -> Option<SessionView> {
        self.get(id).map(|s| SessionView {
            id: s.id.clone(),
            state: s.state(),
            query: s.query.clone(),
            events: s.events_snapshot(),
            created_at: s.created_at,
        })
    }

    /// Request cancellation. Idempotent; a no-op for unknown or already
    /// terminal sessions; callers always get a success-shaped answer.
    pub fn cancel(&self, id: &str) {
        ensure_metrics_described();
        counter!("sessions_cancel_requests_total").increment(1);
        if let Some(session) = self.get(id) {
            if !session.state().is_terminal() {
                session.request_cancel();
                info!(session_id = %id, "cancellation requested");
            }
        }
    }

    /// Drop sessions older than the TTL, regardless of terminal state.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        ensure_metrics_described();
        let mut map = self.sessions.write().expect("session map poisoned");
        let before = map.len();
        map.retain(|_, s| !s.is_expired(now, self.ttl));
        let purged = before - map.len();
        if purged > 0 {
            counter!("sessions_purged_total").increment(purged as u64);
            debug!(purged, "expired sessions purged");
        }
        gauge!("sessions_live").set(map.len() as f64);
        purged
    }

    /// Background garbage collection on an interval.
    pub fn spawn_purge_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.purge_expired(Utc::now());
            }
        })
    }
}
