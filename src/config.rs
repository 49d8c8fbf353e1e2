//! Configuration management for fngate
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! Precedence, lowest first: built-in defaults, YAML file, `FNGATE_*`
//! environment variables, command-line flags.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for fngate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener and endpoint settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-request deadline and retry hints
    #[serde(default)]
    pub transport: TransportConfig,
    /// Session lifetime
    #[serde(default)]
    pub sessions: SessionConfig,
    /// Wrapped functions API
    #[serde(default)]
    pub api: ApiConfig,
    /// Protected resource metadata
    #[serde(default)]
    pub auth: AuthConfig,
    /// Metrics exporter
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Path of the JSON-RPC endpoint
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,

    /// Externally visible base URL, used in discovery metadata. Derived from
    /// the request's `Host` header when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Value of `Access-Control-Allow-Origin`
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,

    /// Buffered events per server-push stream
    #[serde(default = "default_push_buffer")]
    pub push_buffer: usize,
}

fn default_bind() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_endpoint_path() -> String {
    "/mcp".to_string()
}

fn default_allowed_origin() -> String {
    "*".to_string()
}

fn default_push_buffer() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            endpoint_path: default_endpoint_path(),
            public_base_url: None,
            allowed_origin: default_allowed_origin(),
            push_buffer: default_push_buffer(),
        }
    }
}

/// Session transport timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// How long a request waits for its reply before failing with a
    /// reconnectable error. Keep below the host's execution ceiling.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// `retryAfterMs` hint when a transport is not connected
    #[serde(default = "default_connect_retry_after_ms")]
    pub connect_retry_after_ms: u64,

    /// `retryAfterMs` hint after a timeout
    #[serde(default = "default_timeout_retry_after_ms")]
    pub timeout_retry_after_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    25_000
}

fn default_connect_retry_after_ms() -> u64 {
    1_000
}

fn default_timeout_retry_after_ms() -> u64 {
    2_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            connect_retry_after_ms: default_connect_retry_after_ms(),
            timeout_retry_after_ms: default_timeout_retry_after_ms(),
        }
    }
}

/// Session registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session is evicted
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_ttl_seconds() -> u64 {
    900
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

/// Functions API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the management API
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Base URL functions are executed against
    #[serde(default = "default_run_base_url")]
    pub run_base_url: String,

    /// Per-call HTTP timeout in seconds
    #[serde(default = "default_api_timeout_seconds")]
    pub timeout_seconds: u64,

    /// How long a caller's function list is reused before it is fetched
    /// again. `0` disables the cache.
    #[serde(default = "default_workspace_cache_seconds")]
    pub workspace_cache_seconds: u64,

    /// Token used when a request carries no `Authorization` header.
    /// Intended for single-tenant deployments.
    #[serde(default, skip_serializing)]
    pub static_token: Option<String>,
}

fn default_api_base_url() -> String {
    "https://microfn.dev/api".to_string()
}

fn default_run_base_url() -> String {
    "https://microfn.dev".to_string()
}

fn default_api_timeout_seconds() -> u64 {
    20
}

fn default_workspace_cache_seconds() -> u64 {
    300
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            run_base_url: default_run_base_url(),
            timeout_seconds: default_api_timeout_seconds(),
            workspace_cache_seconds: default_workspace_cache_seconds(),
            static_token: None,
        }
    }
}

/// Protected resource metadata settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Issuer of the bearer tokens. Defaults to the public base URL.
    #[serde(default)]
    pub authorization_server: Option<String>,

    /// Scopes advertised in the metadata document
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Metrics exporter settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus scrape address (requires the `prometheus` feature)
    #[serde(default)]
    pub listen: Option<String>,
}

impl Config {
    /// Load configuration from file, environment and CLI, in that order
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the file exists but cannot be
    /// read or parsed.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(bind) = std::env::var("FNGATE_BIND") {
            self.server.bind = bind;
        }

        if let Ok(path) = std::env::var("FNGATE_ENDPOINT_PATH") {
            self.server.endpoint_path = path;
        }

        if let Ok(url) = std::env::var("FNGATE_PUBLIC_BASE_URL") {
            self.server.public_base_url = Some(url);
        }

        if let Ok(origin) = std::env::var("FNGATE_ALLOWED_ORIGIN") {
            self.server.allowed_origin = origin;
        }

        if let Ok(timeout) = std::env::var("FNGATE_REQUEST_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse() {
                self.transport.request_timeout_ms = value;
            } else {
                tracing::warn!("Invalid FNGATE_REQUEST_TIMEOUT_MS: {}", timeout);
            }
        }

        if let Ok(ttl) = std::env::var("FNGATE_SESSION_TTL_SECONDS") {
            if let Ok(value) = ttl.parse() {
                self.sessions.ttl_seconds = value;
            } else {
                tracing::warn!("Invalid FNGATE_SESSION_TTL_SECONDS: {}", ttl);
            }
        }

        if let Ok(base) = std::env::var("FNGATE_API_BASE_URL") {
            self.api.base_url = base;
        }

        if let Ok(base) = std::env::var("FNGATE_RUN_BASE_URL") {
            self.api.run_base_url = base;
        }

        if let Ok(secs) = std::env::var("FNGATE_WORKSPACE_CACHE_SECONDS") {
            if let Ok(value) = secs.parse() {
                self.api.workspace_cache_seconds = value;
            } else {
                tracing::warn!("Invalid FNGATE_WORKSPACE_CACHE_SECONDS: {}", secs);
            }
        }

        if let Ok(token) = std::env::var("FNGATE_API_TOKEN") {
            tracing::debug!("Using static API token from FNGATE_API_TOKEN");
            self.api.static_token = Some(token);
        }

        if let Ok(listen) = std::env::var("FNGATE_METRICS_LISTEN") {
            self.metrics.listen = Some(listen);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        let (bind, timeout_ms, session_ttl) = cli.serve_overrides();
        if let Some(bind) = bind {
            self.server.bind = bind.to_string();
        }
        if let Some(timeout_ms) = timeout_ms {
            self.transport.request_timeout_ms = timeout_ms;
        }
        if let Some(ttl) = session_ttl {
            self.sessions.ttl_seconds = ttl;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(GatewayError::Config(format!(
                "server.bind is not a socket address: {}",
                self.server.bind
            ))
            .into());
        }

        if !self.server.endpoint_path.starts_with('/') || self.server.endpoint_path.len() < 2 {
            return Err(GatewayError::Config(
                "server.endpoint_path must start with '/' and name a path".to_string(),
            )
            .into());
        }

        if let Some(base) = &self.server.public_base_url {
            url::Url::parse(base).map_err(|e| {
                GatewayError::Config(format!("server.public_base_url is invalid: {}", e))
            })?;
        }

        if self.server.push_buffer == 0 {
            return Err(
                GatewayError::Config("server.push_buffer must be greater than 0".to_string()).into(),
            );
        }

        if self.transport.request_timeout_ms == 0 {
            return Err(GatewayError::Config(
                "transport.request_timeout_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.sessions.ttl_seconds == 0 {
            return Err(GatewayError::Config(
                "sessions.ttl_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        for (field, value) in [
            ("api.base_url", &self.api.base_url),
            ("api.run_base_url", &self.api.run_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| GatewayError::Config(format!("{} is invalid: {}", field, e)))?;
        }

        if self.api.timeout_seconds == 0 {
            return Err(
                GatewayError::Config("api.timeout_seconds must be greater than 0".to_string())
                    .into(),
            );
        }

        if let Some(listen) = &self.metrics.listen {
            listen.parse::<std::net::SocketAddr>().map_err(|_| {
                GatewayError::Config(format!("metrics.listen is not a socket address: {}", listen))
            })?;
        }

        Ok(())
    }
}
