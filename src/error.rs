//! Error types for fngate
//!
//! This module defines all error types used throughout the gateway,
//! using `thiserror` for ergonomic error handling. Fallible functions return
//! the [`Result`] alias (backed by `anyhow`); the HTTP boundary recovers the
//! typed variant with `downcast_ref` to pick a status code and a JSON-RPC
//! error code.

use thiserror::Error;

/// Main error type for fngate operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failure (connection not established, send on a closed
    /// exchange, transport misuse). Always retryable by the caller.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The protocol server did not answer within the configured deadline
    #[error("Request timed out after {timeout_ms}ms: {method}")]
    Timeout {
        /// JSON-RPC method that timed out
        method: String,
        /// Configured deadline in milliseconds
        timeout_ms: u64,
    },

    /// Malformed or structurally invalid JSON-RPC envelope
    #[error("Invalid envelope: {0}")]
    Envelope(String),

    /// Tool name not present in the session's tool registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments could not be interpreted
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A tool handler failed while executing
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// The wrapped functions API returned a non-success status
    #[error("Functions API error ({status}): {message}")]
    Api {
        /// HTTP status returned by the API
        status: u16,
        /// Response body or status text
        message: String,
    },

    /// Missing or unusable bearer credential
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Session lookup or creation failure
    #[error("Session error: {0}")]
    Session(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GatewayError {
    /// Returns `true` for failures the caller can recover from by resubmitting
    /// the identical request to the identical session.
    pub fn is_reconnectable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

/// Result type alias for fngate operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
