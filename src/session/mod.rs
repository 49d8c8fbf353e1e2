//! Resumable sessions
//!
//! A session pins one protocol server instance to a caller so repeated HTTP
//! calls share capability negotiation and tool registration. Sessions live
//! in a [`SessionStore`] and are created, resumed and evicted by the
//! [`SessionRegistry`].
//!
//! - [`store`]    -- storage contract and the in-process implementation
//! - [`registry`] -- resolution, TTL eviction, termination

pub mod registry;
pub mod store;

pub use registry::{ResolvedSession, SessionRegistry};
pub use store::{Claim, InMemorySessionStore, SessionStore};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::auth::Credential;
use crate::transport::{ProtocolServer, PushChannel};

/// One logical conversation.
///
/// Owns the protocol server built for it and the slot its push stream
/// attaches to. Remembers the fingerprint of the credential that created it;
/// only that credential may resume it.
#[derive(Debug)]
pub struct Session {
    id: String,
    server: Arc<dyn ProtocolServer>,
    push: PushChannel,
    owner: String,
    created_at: Instant,
    /// Milliseconds after `created_at`.
    last_activity_ms: AtomicU64,
}

impl Session {
    pub fn new(id: impl Into<String>, server: Arc<dyn ProtocolServer>, owner: &Credential) -> Self {
        Self {
            id: id.into(),
            server,
            push: PushChannel::new(),
            owner: owner.fingerprint(),
            created_at: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn server(&self) -> Arc<dyn ProtocolServer> {
        Arc::clone(&self.server)
    }

    pub fn push(&self) -> &PushChannel {
        &self.push
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_owned_by(&self, credential: &Credential) -> bool {
        self.owner == credential.fingerprint()
    }

    pub(crate) fn owner(&self) -> &str {
        &self.owner
    }

    /// Record activity now.
    pub fn touch(&self) {
        let ms = Instant::now()
            .saturating_duration_since(self.created_at)
            .as_millis() as u64;
        self.last_activity_ms.fetch_max(ms, Ordering::SeqCst);
    }

    pub fn last_activity(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_activity_ms.load(Ordering::SeqCst))
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }
}
