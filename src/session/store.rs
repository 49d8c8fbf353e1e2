//! Session storage
//!
//! The registry talks to storage only through [`SessionStore`], so the
//! concurrency contract is explicit: every mutation is atomic, and
//! replacing an unknown session id is first-write-wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::Session;

/// Result of [`SessionStore::claim_replacement`].
#[derive(Debug, Clone)]
pub enum Claim {
    /// The candidate won and is now stored.
    Inserted(Arc<Session>),
    /// An earlier caller already replaced the stale id; the candidate was
    /// discarded and this is the winner.
    Existing(Arc<Session>),
}

impl Claim {
    pub fn session(&self) -> &Arc<Session> {
        match self {
            Self::Inserted(s) | Self::Existing(s) => s,
        }
    }
}

/// Storage contract for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<Arc<Session>>;

    /// Store a session under its own, freshly minted id.
    async fn insert(&self, session: Arc<Session>);

    /// Replace the unknown id `stale_id` with `candidate`.
    ///
    /// If a live replacement for `stale_id`, owned by the same credential,
    /// was recorded earlier, it is returned and `candidate` is dropped.
    /// Otherwise `candidate` is stored and recorded as the replacement.
    async fn claim_replacement(&self, stale_id: &str, candidate: Arc<Session>) -> Claim;

    async fn remove(&self, id: &str) -> Option<Arc<Session>>;

    /// Remove and return every session idle for longer than `ttl` at `now`.
    async fn evict_idle(&self, ttl: Duration, now: Instant) -> Vec<Arc<Session>>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Default)]
struct State {
    sessions: HashMap<String, Arc<Session>>,
    /// stale id -> id of the session that replaced it
    replacements: HashMap<String, String>,
}

/// Process-local store. All mutations run under one write lock.
#[derive(Default)]
pub struct InMemorySessionStore {
    state: RwLock<State>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded stale-id replacements.
    pub async fn replacement_count(&self) -> usize {
        self.state.read().await.replacements.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.state.read().await.sessions.get(id).cloned()
    }

    async fn insert(&self, session: Arc<Session>) {
        self.state
            .write()
            .await
            .sessions
            .insert(session.id().to_string(), session);
    }

    async fn claim_replacement(&self, stale_id: &str, candidate: Arc<Session>) -> Claim {
        let mut state = self.state.write().await;

        let winner = state
            .replacements
            .get(stale_id)
            .and_then(|id| state.sessions.get(id))
            .filter(|s| s.owner() == candidate.owner())
            .cloned();
        if let Some(winner) = winner {
            return Claim::Existing(winner);
        }

        state
            .replacements
            .insert(stale_id.to_string(), candidate.id().to_string());
        state
            .sessions
            .insert(candidate.id().to_string(), Arc::clone(&candidate));
        Claim::Inserted(candidate)
    }

    async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let mut state = self.state.write().await;
        let removed = state.sessions.remove(id);
        if removed.is_some() {
            state.replacements.retain(|_, target| target != id);
        }
        removed
    }

    async fn evict_idle(&self, ttl: Duration, now: Instant) -> Vec<Arc<Session>> {
        let mut state = self.state.write().await;

        let expired: Vec<String> = state
            .sessions
            .iter()
            .filter(|(_, s)| s.idle_for(now) > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        let evicted: Vec<Arc<Session>> = expired
            .iter()
            .filter_map(|id| state.sessions.remove(id))
            .collect();

        if !evicted.is_empty() {
            let State {
                sessions,
                replacements,
            } = &mut *state;
            replacements.retain(|_, target| sessions.contains_key(target));
        }
        evicted
    }

    async fn len(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}
