//! HTTP surface of the gateway
//!
//! ## Endpoints
//!
//! - `POST {endpoint}` - JSON-RPC request or notification
//! - `GET {endpoint}` - readiness probe, or an event stream for server push
//!   when the client accepts `text/event-stream`
//! - `DELETE {endpoint}` - terminate a session
//! - `GET /` - service identity
//! - `GET /.well-known/oauth-protected-resource` - protected resource metadata
//!
//! Every response carries CORS headers; `OPTIONS` on any path is answered
//! as a preflight.

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::api::FunctionsClient;
use crate::auth::{BearerHeaderProvider, CredentialProvider};
use crate::config::{AuthConfig, Config, ServerConfig};
use crate::error::Result;
use crate::mcp::McpServerFactory;
use crate::session::{InMemorySessionStore, SessionRegistry};
use crate::transport::{ProtocolServerFactory, TransportSettings};

/// Request and response header naming the session.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Methods served on the JSON-RPC endpoint.
pub const ALLOWED_METHODS: &str = "GET, POST, DELETE, OPTIONS";

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub settings: TransportSettings,
    pub server: Arc<ServerConfig>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    /// Build state around an arbitrary protocol server factory.
    pub fn new(config: &Config, factory: Arc<dyn ProtocolServerFactory>) -> Self {
        let registry = SessionRegistry::new(
            Arc::new(InMemorySessionStore::new()),
            factory,
            Duration::from_secs(config.sessions.ttl_seconds),
        );
        let credentials =
            BearerHeaderProvider::new().with_fallback(config.api.static_token.clone());

        Self {
            registry: Arc::new(registry),
            credentials: Arc::new(credentials),
            settings: TransportSettings::from(&config.transport),
            server: Arc::new(config.server.clone()),
            auth: Arc::new(config.auth.clone()),
        }
    }

    /// Build state serving the functions platform tools.
    ///
    /// # Errors
    ///
    /// Returns error if the functions API client cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Arc::new(FunctionsClient::new(&config.api)?);
        let factory = McpServerFactory::new(
            client,
            Duration::from_secs(config.api.workspace_cache_seconds),
        );
        Ok(Self::new(config, Arc::new(factory)))
    }
}

/// Build the gateway router
pub fn router(state: AppState) -> Router {
    let endpoint = state.server.endpoint_path.clone();

    Router::new()
        .route("/", get(handlers::service_info))
        .route(
            "/.well-known/oauth-protected-resource",
            get(handlers::protected_resource),
        )
        .route(
            "/.well-known/oauth-protected-resource/*path",
            get(handlers::protected_resource),
        )
        .route(
            &endpoint,
            post(handlers::mcp_post)
                .get(handlers::mcp_get)
                .delete(handlers::mcp_delete)
                .fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), handlers::cors))
        .with_state(state)
}
