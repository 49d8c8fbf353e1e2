//! Per-caller function lists
//!
//! The tools that take a function id describe the caller's functions in
//! their descriptions. Those lists come from the platform and are reused for
//! a bounded time, keyed by credential fingerprint.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::api::{FunctionsClient, Workspace};
use crate::auth::Credential;
use crate::error::Result;

/// The part of a workspace that ends up in tool descriptions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub id: String,
    pub name: String,
}

impl From<&Workspace> for WorkspaceInfo {
    fn from(ws: &Workspace) -> Self {
        Self {
            id: ws.id.clone(),
            name: ws.name.clone(),
        }
    }
}

struct Entry {
    workspaces: Vec<WorkspaceInfo>,
    stored_at: Instant,
}

/// Function lists by credential, valid for `ttl` after they were stored
pub struct WorkspaceCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl WorkspaceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The caller's list, unless it is missing or expired
    pub fn get(&self, credential: &Credential) -> Option<Vec<WorkspaceInfo>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(&credential.fingerprint())?;
        if entry.stored_at.elapsed() < self.ttl {
            Some(entry.workspaces.clone())
        } else {
            None
        }
    }

    /// Store the caller's list. Expired entries of other callers are dropped
    /// on the way.
    pub fn put(&self, credential: &Credential, workspaces: Vec<WorkspaceInfo>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let ttl = self.ttl;
        entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        tracing::debug!(count = workspaces.len(), "Cached function list");
        entries.insert(
            credential.fingerprint(),
            Entry {
                workspaces,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for WorkspaceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish()
    }
}

/// Platform client plus the cache of what each caller can see
#[derive(Debug)]
pub struct FunctionCatalog {
    client: Arc<FunctionsClient>,
    cache: WorkspaceCache,
}

impl FunctionCatalog {
    pub fn new(client: Arc<FunctionsClient>, ttl: Duration) -> Self {
        Self {
            client,
            cache: WorkspaceCache::new(ttl),
        }
    }

    pub fn client(&self) -> &Arc<FunctionsClient> {
        &self.client
    }

    pub fn cached(&self, credential: &Credential) -> Option<Vec<WorkspaceInfo>> {
        self.cache.get(credential)
    }

    /// Fetch the caller's workspaces and remember them
    pub async fn refresh(&self, credential: &Credential) -> Result<Vec<Workspace>> {
        let workspaces = self.client.list_workspaces(credential).await?;
        self.cache
            .put(credential, workspaces.iter().map(WorkspaceInfo::from).collect());
        Ok(workspaces)
    }

    /// Cached list, fetched when there is none
    pub async fn workspaces(&self, credential: &Credential) -> Result<Vec<WorkspaceInfo>> {
        if let Some(cached) = self.cached(credential) {
            return Ok(cached);
        }
        let fresh = self.refresh(credential).await?;
        Ok(fresh.iter().map(WorkspaceInfo::from).collect())
    }
}

/// Append the caller's functions to a tool description
pub(crate) fn describe_with_functions(base: &str, workspaces: &[WorkspaceInfo]) -> String {
    if workspaces.is_empty() {
        return base.to_string();
    }
    let list: Vec<String> = workspaces
        .iter()
        .map(|ws| format!("  - {} ({})", ws.name, ws.id))
        .collect();
    format!("{}\n\nAvailable functions:\n{}", base, list.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn info(id: &str, name: &str) -> WorkspaceInfo {
        WorkspaceInfo {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entries_expire() {
        let cache = WorkspaceCache::new(Duration::from_secs(300));
        let cred = Credential::new("a");
        cache.put(&cred, vec![info("w1", "one")]);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&cred), Some(vec![info("w1", "one")]));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&cred), None);
    }

    #[test]
    fn test_cache_is_per_credential() {
        let cache = WorkspaceCache::new(Duration::from_secs(60));
        cache.put(&Credential::new("a"), vec![info("w1", "one")]);
        assert!(cache.get(&Credential::new("b")).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = WorkspaceCache::new(Duration::ZERO);
        cache.put(&Credential::new("a"), vec![info("w1", "one")]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_describe_lists_functions() {
        let text = describe_with_functions("Run it.", &[info("w1", "one"), info("w2", "two")]);
        assert_eq!(
            text,
            "Run it.\n\nAvailable functions:\n  - one (w1)\n  - two (w2)"
        );
        assert_eq!(describe_with_functions("Run it.", &[]), "Run it.");
    }

    #[tokio::test]
    async fn test_workspaces_fetches_once_then_uses_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/workspaces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "workspaces": [{"id": "w1", "name": "one"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = ApiConfig {
            base_url: format!("{}/api", server.uri()),
            run_base_url: server.uri(),
            ..ApiConfig::default()
        };
        let catalog = FunctionCatalog::new(
            Arc::new(FunctionsClient::new(&config).unwrap()),
            Duration::from_secs(300),
        );
        let cred = Credential::new("t");

        assert_eq!(catalog.workspaces(&cred).await.unwrap(), vec![info("w1", "one")]);
        assert_eq!(catalog.workspaces(&cred).await.unwrap(), vec![info("w1", "one")]);
    }
}
