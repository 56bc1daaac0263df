//! Browser sessions: opaque cookie tokens mapped to in-memory state.
//!
//! DESIGN
//! ======
//! A session holds the NeuroBot transcript for one page load. Nothing is
//! persisted; sessions die with the process, when the chat page is reloaded,
//! or when they are pruned.
//!
//! RETENTION
//! =========
//! Clients without a cookie get a fresh session on every request, so the
//! store is bounded: whenever a new session is created, sessions idle longer
//! than [`SESSION_IDLE_TTL`] are dropped, and if the store is still at
//! [`MAX_SESSIONS`] the least recently seen ones go first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;
use tracing::info;

use crate::llm::types::Message;

pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(60 * 60);
pub const MAX_SESSIONS: usize = 10_000;

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

/// Per-browser state.
#[derive(Debug, Clone)]
pub struct Session {
    /// Chat transcript in insertion order.
    pub messages: Vec<Message>,
    pub last_seen: Instant,
}

impl Session {
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self { messages: Vec::new(), last_seen: now }
    }
}

pub type SessionStore = Arc<RwLock<HashMap<String, Session>>>;

#[must_use]
pub fn new_store() -> SessionStore {
    Arc::new(RwLock::new(HashMap::new()))
}

/// Run `f` against the session for `id`, creating it if absent.
pub async fn with_session<R>(store: &SessionStore, id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
    with_session_at(store, id, Instant::now(), MAX_SESSIONS, f).await
}

async fn with_session_at<R>(
    store: &SessionStore,
    id: &str,
    now: Instant,
    max_sessions: usize,
    f: impl FnOnce(&mut Session) -> R,
) -> R {
    let mut sessions = store.write().await;
    if !sessions.contains_key(id) {
        let evicted = prune(&mut sessions, now, SESSION_IDLE_TTL, max_sessions.saturating_sub(1));
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "session: pruned");
        }
    }
    let session = sessions.entry(id.to_owned()).or_insert_with(|| Session::new(now));
    session.last_seen = now;
    f(session)
}

/// Forget the session for `id`, if any.
pub async fn remove(store: &SessionStore, id: &str) {
    store.write().await.remove(id);
}

/// Drop sessions idle for `ttl` or longer, then the least recently seen ones
/// until at most `keep` remain. Returns how many were removed.
pub(crate) fn prune(sessions: &mut HashMap<String, Session>, now: Instant, ttl: Duration, keep: usize) -> usize {
    let before = sessions.len();
    sessions.retain(|_, s| now.saturating_duration_since(s.last_seen) < ttl);

    if sessions.len() > keep {
        let excess = sessions.len() - keep;
        let mut by_age: Vec<(Instant, String)> = sessions.iter().map(|(id, s)| (s.last_seen, id.clone())).collect();
        by_age.sort_unstable();
        for (_, id) in by_age.into_iter().take(excess) {
            sessions.remove(&id);
        }
    }
    before - sessions.len()
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
