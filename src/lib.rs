//! fngate - session-aware JSON-RPC tool gateway
//!
//! This library exposes a remote functions platform as MCP tools over a
//! stateless HTTP transport. Logical sessions outlive individual requests,
//! each request waits a bounded time for its reply, and server pushes flow
//! over a separate event stream.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `jsonrpc`: Wire types and envelope classification
//! - `transport`: Per-request session transport and the push channel
//! - `session`: Session store and registry (resume, replace, evict)
//! - `mcp`: Protocol server dispatching onto the tool registry
//! - `tools`: Versioned tool registry and the shipped tools
//! - `api`: REST client for the functions platform
//! - `auth`: Bearer credentials and PKCE helpers
//! - `http`: axum router and handlers
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use fngate::{http, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let app = http::router(http::AppState::from_config(&config)?);
//!     let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod jsonrpc;
pub mod mcp;
pub mod metrics;
pub mod session;
pub mod tools;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use error::{GatewayError, Result};
pub use session::{Session, SessionRegistry};
pub use transport::SessionTransport;
