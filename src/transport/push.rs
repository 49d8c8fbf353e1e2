//! Server push delivery
//!
//! Messages a protocol server sends without an id are not replies; they go
//! to whichever long-lived client connection is currently attached to the
//! session. A session holds zero or one live sink. A failed write closes the
//! sink and drops the message, but the session and its protocol server carry
//! on until a new sink attaches.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, RwLock};

use crate::error::{GatewayError, Result};
use crate::jsonrpc::JsonRpcNotification;
use crate::metrics;

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// A client connection able to receive pushed messages.
pub trait PushSink: Send + Sync + fmt::Debug {
    /// Process-unique identifier, used in logs.
    fn id(&self) -> u64;

    fn is_open(&self) -> bool;

    /// Write one message as a discrete event. A failure closes the sink.
    fn push(&self, message: &JsonRpcNotification) -> Result<()>;

    /// Stop accepting messages and end the client's stream.
    fn close(&self);
}

/// Sink feeding an SSE response body through a bounded channel.
///
/// Each pushed message becomes one serialized JSON string on the channel;
/// the HTTP layer frames each string as an SSE `message` event.
pub struct SsePushSink {
    id: u64,
    sender: Mutex<Option<mpsc::Sender<String>>>,
    open: AtomicBool,
}

impl SsePushSink {
    /// Create a sink and the receiver the HTTP layer streams from.
    ///
    /// # Examples
    ///
    /// ```
    /// use fngate::transport::{PushSink, SsePushSink};
    ///
    /// let (sink, _rx) = SsePushSink::channel(8);
    /// assert!(sink.is_open());
    /// ```
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            id: NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed),
            sender: Mutex::new(Some(tx)),
            open: AtomicBool::new(true),
        };
        (sink, rx)
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

impl fmt::Debug for SsePushSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsePushSink")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

impl PushSink for SsePushSink {
    fn id(&self) -> u64 {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn push(&self, message: &JsonRpcNotification) -> Result<()> {
        let frame = serde_json::to_string(message)?;

        let outcome = match self.sender.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(tx) => tx.try_send(frame).map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => "client is not draining events",
                    mpsc::error::TrySendError::Closed(_) => "client disconnected",
                }),
                None => Err("sink closed"),
            },
            Err(_) => Err("sink lock poisoned"),
        };

        outcome.map_err(|reason| {
            self.mark_closed();
            GatewayError::Transport(format!("push to sink {} failed: {}", self.id, reason)).into()
        })
    }

    fn close(&self) {
        self.mark_closed();
    }
}

/// What happened to a pushed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// No live sink attached.
    Dropped,
    /// The attached sink failed and has been detached.
    Failed,
}

/// Per-session slot holding at most one live sink.
#[derive(Debug, Clone, Default)]
pub struct PushChannel {
    slot: Arc<RwLock<Option<Arc<dyn PushSink>>>>,
}

impl PushChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `sink`, closing any sink it replaces.
    pub async fn attach(&self, sink: Arc<dyn PushSink>) {
        let previous = self.slot.write().await.replace(Arc::clone(&sink));
        if let Some(previous) = previous {
            tracing::debug!(old = previous.id(), new = sink.id(), "Replacing push sink");
            previous.close();
        }
    }

    /// Detach the current sink, closing it.
    pub async fn detach(&self) {
        if let Some(sink) = self.slot.write().await.take() {
            sink.close();
        }
    }

    /// `true` when a sink is attached and still open.
    pub async fn is_attached(&self) -> bool {
        self.slot
            .read()
            .await
            .as_ref()
            .map(|s| s.is_open())
            .unwrap_or(false)
    }

    /// Write `message` to the attached sink.
    pub async fn deliver(&self, message: &JsonRpcNotification) -> PushOutcome {
        let current = self.slot.read().await.clone();
        let sink = match current {
            Some(sink) if sink.is_open() => sink,
            Some(_) => {
                self.detach_if_current(None).await;
                tracing::debug!(method = %message.method, "Push sink closed, dropping message");
                metrics::record_push("dropped");
                return PushOutcome::Dropped;
            }
            None => {
                tracing::debug!(method = %message.method, "No push sink attached, dropping message");
                metrics::record_push("dropped");
                return PushOutcome::Dropped;
            }
        };

        match sink.push(message) {
            Ok(()) => {
                metrics::record_push("delivered");
                PushOutcome::Delivered
            }
            Err(e) => {
                tracing::warn!(sink = sink.id(), error = %e, "Push delivery failed, detaching sink");
                self.detach_if_current(Some(sink.id())).await;
                metrics::record_push("failed");
                PushOutcome::Failed
            }
        }
    }

    /// Remove the attached sink when it is closed, or when it is the sink
    /// with `id`. A sink attached in the meantime is left alone.
    async fn detach_if_current(&self, id: Option<u64>) {
        let mut slot = self.slot.write().await;
        let stale = match (slot.as_ref(), id) {
            (Some(current), Some(id)) => current.id() == id,
            (Some(current), None) => !current.is_open(),
            (None, _) => false,
        };
        if stale {
            slot.take();
        }
    }
}
