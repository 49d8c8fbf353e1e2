//! Per-request session transport
//!
//! A [`SessionTransport`] adapts exactly one inbound HTTP call to the
//! session's long-lived [`ProtocolServer`]. It owns the connection state and
//! the single pending exchange for that call, enforces the reply deadline,
//! and routes everything the server sends back: the matching response
//! resolves the exchange, id-less messages go to the session's push channel
//! whatever the connection state, so a push sent after the exchange ends
//! still reaches an attached stream.
//!
//! Concurrent calls against one session each get their own transport; only
//! the protocol server and the push channel are shared.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

use super::{
    ConnectionState, ExchangeState, Outbound, ProtocolServer, PushChannel, TransportSettings,
};
use crate::error::{GatewayError, Result};
use crate::jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
use crate::metrics::ExchangeMetrics;

/// Receives failures that have no caller to return to.
pub type ErrorObserver = Arc<dyn Fn(&GatewayError) + Send + Sync>;

/// Called once when the transport closes.
pub type CloseObserver = Arc<dyn Fn() + Send + Sync>;

struct PendingExchange {
    state: ExchangeState,
    request_id: Option<Value>,
    reply_tx: Option<oneshot::Sender<JsonRpcResponse>>,
}

impl PendingExchange {
    fn idle() -> Self {
        Self {
            state: ExchangeState::Idle,
            request_id: None,
            reply_tx: None,
        }
    }

    fn transition(&mut self, next: ExchangeState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

struct Inner {
    connection: ConnectionState,
    exchange: PendingExchange,
    started_at: Option<Instant>,
    closed: bool,
}

/// Bridges one HTTP call to a session's protocol server.
pub struct SessionTransport {
    session_id: String,
    server: Arc<dyn ProtocolServer>,
    push: PushChannel,
    settings: TransportSettings,
    inner: Mutex<Inner>,
    on_error: Option<ErrorObserver>,
    on_close: Option<CloseObserver>,
}

impl std::fmt::Debug for SessionTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTransport")
            .field("session_id", &self.session_id)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SessionTransport {
    /// Create a disconnected transport for `session_id`.
    pub fn new(
        session_id: impl Into<String>,
        server: Arc<dyn ProtocolServer>,
        push: PushChannel,
        settings: TransportSettings,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            server,
            push,
            settings,
            inner: Mutex::new(Inner {
                connection: ConnectionState::Disconnected,
                exchange: PendingExchange::idle(),
                started_at: None,
                closed: false,
            }),
            on_error: None,
            on_close: None,
        }
    }

    pub fn with_error_observer(mut self, observer: impl Fn(&GatewayError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(observer));
        self
    }

    pub fn with_close_observer(mut self, observer: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(observer));
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.lock().await.connection
    }

    pub async fn exchange_state(&self) -> ExchangeState {
        self.inner.lock().await.exchange.state
    }

    /// Time since [`start`](Self::start), zero before it.
    pub async fn connection_duration(&self) -> Duration {
        self.inner
            .lock()
            .await
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }

    /// Move `Disconnected -> Connecting -> Connected`.
    ///
    /// # Errors
    ///
    /// A transport starts once. Calling `start` again returns
    /// [`GatewayError::Transport`]; build a new transport instead.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.started_at.is_some() || inner.connection != ConnectionState::Disconnected {
            return Err(GatewayError::Transport(format!(
                "transport already started (state: {})",
                inner.connection
            ))
            .into());
        }

        inner.connection = ConnectionState::Connecting;
        tracing::trace!(session_id = %self.session_id, "Transport connecting");
        inner.started_at = Some(Instant::now());
        inner.connection = ConnectionState::Connected;
        tracing::trace!(session_id = %self.session_id, "Transport connected");
        Ok(())
    }

    /// Deliver a request and wait, bounded, for its reply.
    ///
    /// Returns `Ok(Some(response))` with the server's reply, or a synthesized
    /// reconnectable `-32000` error when the transport is not connected or
    /// the deadline elapsed. `Ok(None)` means the server finished without
    /// producing a reply. The response id always equals the request id.
    ///
    /// On timeout the connection moves to `Error`, so a late reply from the
    /// still-running handler is rejected by [`Outbound::send`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when `request` has no id, or when
    /// this transport already carried an exchange.
    pub async fn deliver_request(
        self: &Arc<Self>,
        request: JsonRpcRequest,
    ) -> Result<Option<JsonRpcResponse>> {
        let id = match request.id.clone() {
            Some(id) => id,
            None => {
                return Err(GatewayError::Transport(
                    "deliver_request called with a notification".to_string(),
                )
                .into())
            }
        };

        let (reply_tx, mut reply_rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().await;
            if inner.connection != ConnectionState::Connected {
                let state = inner.connection;
                drop(inner);
                tracing::warn!(
                    session_id = %self.session_id,
                    method = %request.method,
                    state = %state,
                    "Request delivered to a transport that is not connected"
                );
                return Ok(Some(self.not_connected_response(id, state)));
            }
            if !inner.exchange.transition(ExchangeState::AwaitingReply) {
                return Err(GatewayError::Transport(format!(
                    "transport already carried an exchange ({:?})",
                    inner.exchange.state
                ))
                .into());
            }
            inner.exchange.request_id = Some(id.clone());
            inner.exchange.reply_tx = Some(reply_tx);
        }

        let method = request.method.clone();
        let metrics = ExchangeMetrics::new(&method);
        tracing::debug!(session_id = %self.session_id, method = %method, id = %id, "Delivering request");
        self.spawn_handler(JsonRpcMessage::Request(request), true);

        match tokio::time::timeout(self.settings.request_timeout, &mut reply_rx).await {
            Ok(Ok(response)) => {
                metrics.record_outcome("resolved");
                Ok(Some(response))
            }
            Ok(Err(_)) => {
                metrics.record_outcome("empty");
                Ok(None)
            }
            Err(_) => Ok(self.expire(id, &method, reply_rx, &metrics).await),
        }
    }

    /// Hand a notification to the protocol server and return immediately.
    ///
    /// Anything the server later sends back as a response is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the transport is not
    /// connected.
    pub async fn deliver_notification(self: &Arc<Self>, notification: JsonRpcNotification) -> Result<()> {
        let state = self.inner.lock().await.connection;
        if state != ConnectionState::Connected {
            return Err(GatewayError::Transport(format!(
                "Connection not established - current state: {}",
                state
            ))
            .into());
        }

        tracing::debug!(session_id = %self.session_id, method = %notification.method, "Delivering notification");
        self.spawn_handler(JsonRpcMessage::Notification(notification), false);
        Ok(())
    }

    /// Disconnect and fire the close observer. Repeated calls do nothing.
    pub async fn close(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return;
            }
            inner.closed = true;
            if matches!(
                inner.connection,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                inner.connection = ConnectionState::Disconnected;
            }
        }

        tracing::trace!(session_id = %self.session_id, "Transport closed");
        if let Some(observer) = &self.on_close {
            observer();
        }
    }

    fn spawn_handler(self: &Arc<Self>, message: JsonRpcMessage, awaits_reply: bool) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let server = Arc::clone(&this.server);
            let outbound: Arc<dyn Outbound> = this.clone();
            let method = message.method().unwrap_or_default().to_string();

            let panicked = AssertUnwindSafe(server.handle(message, outbound))
                .catch_unwind()
                .await
                .is_err();
            if panicked {
                tracing::error!(session_id = %this.session_id, method = %method, "Protocol server panicked");
            }
            if awaits_reply {
                this.finish_exchange(panicked).await;
            }
        });
    }

    /// The handler returned. Resolve an exchange it left unanswered.
    async fn finish_exchange(&self, panicked: bool) {
        let (reply_tx, id) = {
            let mut inner = self.inner.lock().await;
            if !inner.exchange.transition(ExchangeState::Resolved) {
                return;
            }
            (
                inner.exchange.reply_tx.take(),
                inner.exchange.request_id.clone().unwrap_or(Value::Null),
            )
        };

        if panicked {
            if let Some(tx) = reply_tx {
                let _ = tx.send(JsonRpcResponse::from_error(
                    id,
                    JsonRpcError::internal("Protocol server failed while handling the request"),
                ));
            }
        } else {
            tracing::debug!(session_id = %self.session_id, id = %id, "Protocol server returned without replying");
        }
    }

    async fn expire(
        &self,
        id: Value,
        method: &str,
        mut reply_rx: oneshot::Receiver<JsonRpcResponse>,
        metrics: &ExchangeMetrics,
    ) -> Option<JsonRpcResponse> {
        let mut inner = self.inner.lock().await;
        if !inner.exchange.transition(ExchangeState::TimedOut) {
            // Settled between the deadline and taking the lock.
            drop(inner);
            return match reply_rx.try_recv() {
                Ok(response) => {
                    metrics.record_outcome("resolved");
                    Some(response)
                }
                Err(_) => {
                    metrics.record_outcome("empty");
                    None
                }
            };
        }

        inner.exchange.reply_tx = None;
        inner.connection = ConnectionState::Error;
        let duration = inner.started_at.map(|t| t.elapsed()).unwrap_or_default();
        drop(inner);

        metrics.record_outcome("timeout");
        let timeout_ms = self.settings.request_timeout.as_millis() as u64;
        tracing::warn!(
            session_id = %self.session_id,
            method = %method,
            timeout_ms,
            "Request timed out, transport marked as error"
        );
        Some(self.timeout_response(id, duration, timeout_ms))
    }

    fn not_connected_response(&self, id: Value, state: ConnectionState) -> JsonRpcResponse {
        let mut extra = Map::new();
        extra.insert("connectionState".to_string(), json!(state.as_str()));
        JsonRpcResponse::from_error(
            id,
            JsonRpcError::reconnectable(
                format!(
                    "Connection not established - current state: {}. Retry the request to reconnect.",
                    state
                ),
                self.settings.connect_retry_after_ms,
                extra,
            ),
        )
    }

    fn timeout_response(&self, id: Value, duration: Duration, timeout_ms: u64) -> JsonRpcResponse {
        let retry_after_ms = self.settings.timeout_retry_after_ms;
        let mut extra = Map::new();
        extra.insert(
            "instruction".to_string(),
            json!("Retry the same JSON-RPC request to reconnect automatically"),
        );
        extra.insert(
            "connectionDuration".to_string(),
            json!(duration.as_millis() as u64),
        );
        extra.insert("timeoutMs".to_string(), json!(timeout_ms));
        JsonRpcResponse::from_error(
            id,
            JsonRpcError::reconnectable(
                format!(
                    "Connection closed - request timeout. To reconnect, retry this exact same request to the same MCP endpoint. Wait {}ms before retrying.",
                    retry_after_ms
                ),
                retry_after_ms,
                extra,
            ),
        )
    }

    fn report_error(&self, error: GatewayError) {
        tracing::warn!(session_id = %self.session_id, error = %error, "Transport error");
        if let Some(observer) = &self.on_error {
            observer(&error);
        }
    }
}

#[async_trait]
impl Outbound for SessionTransport {
    async fn send(&self, message: JsonRpcMessage) {
        // Pushes outlive the exchange that triggered them.
        let message = match message {
            JsonRpcMessage::Notification(notification) => {
                self.push.deliver(&notification).await;
                return;
            }
            other => other,
        };

        let mut inner = self.inner.lock().await;
        if inner.connection != ConnectionState::Connected {
            let state = inner.connection;
            drop(inner);
            self.report_error(GatewayError::Transport(format!(
                "{} sent while transport is {}; dropped",
                message.kind(),
                state
            )));
            return;
        }

        match message {
            JsonRpcMessage::Response(response) => {
                let awaiting = inner.exchange.state == ExchangeState::AwaitingReply
                    && inner.exchange.request_id.as_ref() == Some(&response.id);
                if !awaiting {
                    let state = inner.exchange.state;
                    drop(inner);
                    self.report_error(GatewayError::Transport(format!(
                        "response {} does not match the pending exchange ({:?})",
                        response.id, state
                    )));
                    return;
                }
                inner.exchange.transition(ExchangeState::Resolved);
                if let Some(tx) = inner.exchange.reply_tx.take() {
                    // The waiting caller may have gone away with its HTTP connection.
                    let _ = tx.send(response);
                }
            }
            // Pushed before the state check.
            JsonRpcMessage::Notification(_) => {}
            JsonRpcMessage::Request(request) => {
                drop(inner);
                self.report_error(GatewayError::Transport(format!(
                    "server-initiated request {} has no return path",
                    request.method
                )));
            }
        }
    }
}
