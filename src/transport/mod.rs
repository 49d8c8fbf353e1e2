//! Session transport contract and implementations
//!
//! A [`ProtocolServer`] consumes inbound JSON-RPC messages and answers
//! through an [`Outbound`] handle. The gateway bridges one HTTP call to that
//! interface with a [`session::SessionTransport`], and reaches long-lived
//! client connections through a [`push::PushChannel`].
//!
//! The request/reply path and the push path are separate interfaces. They
//! meet only in the session transport's outbound routing:
//!
//! ```text
//! HTTP POST ──> SessionTransport::deliver_request ──> ProtocolServer::handle
//!                        ^                                    │
//!                        └── Outbound::send(Response) ────────┤
//! SSE stream <── PushChannel::deliver <── Outbound::send(Notification)
//! ```

pub mod push;
pub mod session;

pub use push::{PushChannel, PushSink, SsePushSink};
pub use session::SessionTransport;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::Credential;
use crate::config::TransportConfig;
use crate::jsonrpc::JsonRpcMessage;

/// Handle a protocol server uses to answer requests and push messages.
///
/// Sending never fails from the caller's point of view; delivery problems are
/// reported on the transport's error side channel.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(&self, message: JsonRpcMessage);
}

/// Maps inbound methods to handlers and replies through [`Outbound`].
///
/// One instance lives for the whole session and may be handling several
/// messages concurrently, each with its own outbound handle.
#[async_trait]
pub trait ProtocolServer: Send + Sync + fmt::Debug {
    /// Process one inbound message. A request is answered by sending exactly
    /// one response with the same id before returning.
    async fn handle(&self, message: JsonRpcMessage, outbound: Arc<dyn Outbound>);
}

/// Builds a fresh protocol server bound to a caller's credential.
pub trait ProtocolServerFactory: Send + Sync {
    fn create(&self, credential: &Credential) -> Arc<dyn ProtocolServer>;
}

// ---------------------------------------------------------------------------
// State machines
// ---------------------------------------------------------------------------

/// Connection state of one session transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the single pending exchange a transport can hold.
///
/// | from            | to              | trigger                             |
/// |-----------------|-----------------|-------------------------------------|
/// | `Idle`          | `AwaitingReply` | `deliver_request`                   |
/// | `AwaitingReply` | `Resolved`      | matching response sent              |
/// | `AwaitingReply` | `Resolved`      | server returned without replying    |
/// | `AwaitingReply` | `TimedOut`      | deadline elapsed                    |
///
/// `Resolved` and `TimedOut` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    AwaitingReply,
    Resolved,
    TimedOut,
}

impl ExchangeState {
    /// Whether the table above permits `self -> next`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fngate::transport::ExchangeState;
    ///
    /// assert!(ExchangeState::Idle.can_transition_to(ExchangeState::AwaitingReply));
    /// assert!(!ExchangeState::TimedOut.can_transition_to(ExchangeState::Resolved));
    /// ```
    pub fn can_transition_to(self, next: ExchangeState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::AwaitingReply)
                | (Self::AwaitingReply, Self::Resolved)
                | (Self::AwaitingReply, Self::TimedOut)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::TimedOut)
    }
}

/// Deadline and retry hints applied by every session transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    /// How long `deliver_request` waits for the protocol server.
    pub request_timeout: Duration,
    /// `retryAfterMs` hint when the transport is not connected.
    pub connect_retry_after_ms: u64,
    /// `retryAfterMs` hint after a timeout.
    pub timeout_retry_after_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(25_000),
            connect_retry_after_ms: 1_000,
            timeout_retry_after_ms: 2_000,
        }
    }
}

impl From<&TransportConfig> for TransportSettings {
    fn from(config: &TransportConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            connect_retry_after_ms: config.connect_retry_after_ms,
            timeout_retry_after_ms: config.timeout_retry_after_ms,
        }
    }
}
