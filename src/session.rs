use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
use uuid::Uuid;

/// Per-session state behind the page: the last generated query and the
/// outcome of its last run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    query: String,
    result: String,
}

impl SessionState {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    /// Replaces the query. The result always belongs to the previous query,
    /// so it is cleared in the same step.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.result.clear();
    }

    pub fn set_result(&mut self, result: impl Into<String>) {
        self.result = result.into();
    }

    pub fn can_run(&self) -> bool {
        !self.query.is_empty()
    }
}

pub type SharedSession = Arc<AsyncMutex<SessionState>>;

/// How long a session survives without a request when nothing else is set.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

struct Entry {
    session: SharedSession,
    last_seen: Instant,
}

/// Sessions keyed by an opaque id. Each entry has its own lock so actions
/// within one session are serialised while other sessions proceed.
///
/// A session ends once it has been idle for longer than the store's ttl.
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Entry>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Looks up `id`, creating a fresh session when it is missing, unknown or
    /// expired. Returns the id actually in use.
    pub fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, SharedSession) {
        self.get_or_create_at(id, Instant::now())
    }

    fn get_or_create_at(&self, id: Option<Uuid>, now: Instant) -> (Uuid, SharedSession) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        evict(&mut sessions, self.ttl, now);

        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_seen = now;
                return (id, entry.session.clone());
            }
        }

        let id = Uuid::new_v4();
        let session = SharedSession::default();
        sessions.insert(
            id,
            Entry {
                session: session.clone(),
                last_seen: now,
            },
        );
        (id, session)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn evict(sessions: &mut HashMap<Uuid, Entry>, ttl: Duration, now: Instant) {
    let before = sessions.len();
    sessions.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= ttl);

    let removed = before - sessions.len();
    if removed > 0 {
        debug!(removed, remaining = sessions.len(), "Evicted idle sessions");
    }
}
