use async_trait::async_trait;
use remote_proto::Envelope;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod hub;
pub mod mock;
pub mod policy;
pub mod websocket;

pub use policy::ConnectionPolicy;

/// How a connection reaches the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    /// Straight WebSocket upgrade on the hub URL.
    Direct,
    /// Negotiate first, then upgrade with the issued connection token.
    Negotiated,
}

impl TransportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportMode::Direct => "direct",
            TransportMode::Negotiated => "negotiated",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications a live connection raises after `start` succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(Envelope),
    Reconnecting { error: Option<String> },
    Reconnected,
    Closed { error: Option<String> },
}

/// A [`TransportEvent`] stamped with the generation of the connection that
/// produced it, so events from replaced handles can be told apart.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the receiving side has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("negotiate request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("negotiate returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("hub handshake failed: {0}")]
    Handshake(String),
    #[error("hub protocol error: {0}")]
    Protocol(String),
    #[error("invalid hub url: {0}")]
    InvalidUrl(String),
    #[error("hub invocation failed: {0}")]
    Invocation(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("timed out while {0}")]
    Timeout(&'static str),
    #[error("connection is not established")]
    NotConnected,
    #[error("connection closed")]
    Closed,
}

/// One connection attempt to the hub. Handles are single-use: a replaced or
/// failed handle is stopped and a fresh one is built for the next attempt.
#[async_trait]
pub trait HubConnection: Send + Sync {
    fn mode(&self) -> TransportMode;

    /// Opens the connection and completes the hub handshake.
    async fn start(&self) -> Result<(), TransportError>;

    /// Queues a non-blocking invocation. Calls made in order are written in
    /// order; delivery is not confirmed.
    fn send(&self, method: &str, args: Vec<Value>) -> Result<(), TransportError>;

    /// Invokes a hub method and waits for its completion.
    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, TransportError>;

    /// Closes the connection without raising `Closed`.
    async fn stop(&self);
}

pub trait TransportFactory: Send + Sync {
    fn build(
        &self,
        mode: TransportMode,
        policy: &ConnectionPolicy,
        events: EventSink,
    ) -> Arc<dyn HubConnection>;
}
