//! Session resolution and expiry
//!
//! Eviction is lazy: every resolution first sweeps sessions idle for longer
//! than the TTL. There is no background timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use super::{Claim, Session, SessionStore};
use crate::auth::Credential;
use crate::metrics;
use crate::transport::ProtocolServerFactory;

/// Outcome of [`SessionRegistry::resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub session: Arc<Session>,
    /// `true` when this call built the session's protocol server.
    pub created: bool,
}

/// Maps caller-presented session ids to live sessions.
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    factory: Arc<dyn ProtocolServerFactory>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn SessionStore>,
        factory: Arc<dyn ProtocolServerFactory>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            factory,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Find or create the session for a call.
    ///
    /// A fresh session (new protocol server, new id) is created when no id is
    /// presented, when the id is unknown or owned by another credential, and
    /// always for `initialize`. Otherwise the existing session is returned
    /// with its activity refreshed.
    ///
    /// Concurrent calls presenting the same unknown id share whichever
    /// replacement was stored first; the other candidates are discarded.
    pub async fn resolve(
        &self,
        session_id: Option<&str>,
        is_initialize: bool,
        credential: &Credential,
    ) -> ResolvedSession {
        self.evict().await;

        let presented = session_id.filter(|id| !id.is_empty());

        if is_initialize {
            if let Some(id) = presented {
                tracing::debug!(presented = %id, "initialize always starts a new session");
            }
            return self.create(credential).await;
        }

        let id = match presented {
            Some(id) => id,
            None => return self.create(credential).await,
        };

        if let Some(session) = self.store.get(id).await {
            if session.is_owned_by(credential) {
                session.touch();
                metrics::record_session("resumed");
                tracing::debug!(session_id = %id, "Resumed session");
                return ResolvedSession {
                    session,
                    created: false,
                };
            }
            tracing::warn!(session_id = %id, "Session id presented by a different credential");
            return self.create(credential).await;
        }

        let candidate = self.mint(credential);
        match self.store.claim_replacement(id, candidate).await {
            Claim::Inserted(session) => {
                metrics::record_session("created");
                tracing::info!(stale = %id, session_id = %session.id(), "Replaced unknown session");
                ResolvedSession {
                    session,
                    created: true,
                }
            }
            Claim::Existing(session) => {
                session.touch();
                metrics::record_session("resumed");
                tracing::debug!(stale = %id, session_id = %session.id(), "Joined existing replacement");
                ResolvedSession {
                    session,
                    created: false,
                }
            }
        }
    }

    /// Look up a session without creating one. Only the owning credential
    /// sees it. Counts as activity.
    pub async fn get(&self, session_id: &str, credential: &Credential) -> Option<Arc<Session>> {
        self.evict().await;
        let session = self.store.get(session_id).await?;
        if !session.is_owned_by(credential) {
            return None;
        }
        session.touch();
        Some(session)
    }

    /// Remove idle sessions. Returns how many were evicted.
    pub async fn evict(&self) -> usize {
        let evicted = self.store.evict_idle(self.ttl, Instant::now()).await;
        for session in &evicted {
            tracing::info!(session_id = %session.id(), "Evicted idle session");
            session.push().detach().await;
        }
        metrics::record_evictions(evicted.len());
        evicted.len()
    }

    /// Explicitly end a session. Returns `false` when it does not exist or
    /// belongs to another credential.
    pub async fn terminate(&self, session_id: &str, credential: &Credential) -> bool {
        match self.store.get(session_id).await {
            Some(session) if session.is_owned_by(credential) => {
                self.store.remove(session_id).await;
                session.push().detach().await;
                tracing::info!(session_id = %session_id, "Session terminated");
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.store.is_empty().await
    }

    fn mint(&self, credential: &Credential) -> Arc<Session> {
        let server = self.factory.create(credential);
        Arc::new(Session::new(Uuid::new_v4().to_string(), server, credential))
    }

    async fn create(&self, credential: &Credential) -> ResolvedSession {
        let session = self.mint(credential);
        self.store.insert(Arc::clone(&session)).await;
        metrics::record_session("created");
        tracing::info!(session_id = %session.id(), "Created session");
        ResolvedSession {
            session,
            created: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::CountingFactory;
    use super::super::InMemorySessionStore;
    use super::*;
    use std::sync::atomic::Ordering;

    fn registry(ttl_secs: u64) -> (SessionRegistry, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory::default());
        let registry = SessionRegistry::new(
            Arc::new(InMemorySessionStore::new()),
            factory.clone(),
            Duration::from_secs(ttl_secs),
        );
        (registry, factory)
    }

    fn alice() -> Credential {
        Credential::new("alice-token")
    }

    #[tokio::test]
    async fn test_resolve_without_id_creates_session() {
        let (registry, factory) = registry(900);
        let resolved = registry.resolve(None, false, &alice()).await;
        assert!(resolved.created);
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
        assert!(Uuid::parse_str(resolved.session.id()).is_ok());
    }

    #[tokio::test]
    async fn test_resolve_known_id_resumes() {
        let (registry, factory) = registry(900);
        let first = registry.resolve(None, false, &alice()).await;
        let second = registry
            .resolve(Some(first.session.id()), false, &alice())
            .await;
        assert!(!second.created);
        assert_eq!(second.session.id(), first.session.id());
        assert!(Arc::ptr_eq(&first.session, &second.session));
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_initialize_never_resumes() {
        let (registry, factory) = registry(900);
        let first = registry.resolve(None, true, &alice()).await;
        let second = registry
            .resolve(Some(first.session.id()), true, &alice())
            .await;
        assert!(second.created);
        assert_ne!(second.session.id(), first.session.id());
        assert_eq!(factory.built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_foreign_credential_cannot_resume() {
        let (registry, _) = registry(900);
        let first = registry.resolve(None, false, &alice()).await;
        let other = registry
            .resolve(Some(first.session.id()), false, &Credential::new("mallory"))
            .await;
        assert!(other.created);
        assert_ne!(other.session.id(), first.session.id());
        assert!(registry.get(first.session.id(), &Credential::new("mallory")).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_twice_yields_one_session() {
        let (registry, factory) = registry(900);
        let a = registry.resolve(Some("never-issued"), false, &alice()).await;
        let b = registry.resolve(Some("never-issued"), false, &alice()).await;

        assert!(a.created);
        assert!(!b.created);
        assert_eq!(a.session.id(), b.session.id());
        assert_ne!(a.session.id(), "never-issued");
        assert_eq!(registry.len().await, 1);
        // The second candidate was built and discarded
        assert_eq!(factory.built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_unknown_id_yields_one_session() {
        let (registry, _) = registry(900);
        let registry = Arc::new(registry);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .resolve(Some("racing-id"), false, &alice())
                    .await
                    .session
                    .id()
                    .to_string()
            }));
        }

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_evicted_on_next_resolve() {
        let (registry, _) = registry(900);
        let first = registry.resolve(None, false, &alice()).await;
        let stale_id = first.session.id().to_string();

        tokio::time::advance(Duration::from_secs(20 * 60)).await;

        let second = registry.resolve(Some(&stale_id), false, &alice()).await;
        assert!(second.created);
        assert_ne!(second.session.id(), stale_id);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_keeps_session_alive() {
        let (registry, _) = registry(900);
        let first = registry.resolve(None, false, &alice()).await;
        let id = first.session.id().to_string();

        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(600)).await;
            let again = registry.resolve(Some(&id), false, &alice()).await;
            assert!(!again.created);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_touches_every_entry() {
        let (registry, _) = registry(60);
        registry.resolve(None, false, &alice()).await;
        registry.resolve(None, false, &alice()).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.evict().await, 2);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_terminate_removes_session() {
        let (registry, _) = registry(900);
        let s = registry.resolve(None, false, &alice()).await;
        let id = s.session.id().to_string();

        assert!(!registry.terminate(&id, &Credential::new("bob")).await);
        assert!(registry.terminate(&id, &alice()).await);
        assert!(!registry.terminate(&id, &alice()).await);
        assert!(registry.get(&id, &alice()).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_session_id_treated_as_absent() {
        let (registry, _) = registry(900);
        let s = registry.resolve(Some(""), false, &alice()).await;
        assert!(s.created);
    }
}
