//! Transport abstraction for event-based sockets.
//!
//! The session layer needs four things from a socket: emit a named event,
//! receive named events, learn about lifecycle changes, and close it.
//! Production uses a Socket.IO client over WebSocket (`transport` feature),
//! tests use an in-memory transport from the harness crate.

use async_trait::async_trait;
use lingua_core::TransportSignal;
use lingua_proto::ProtocolError;
use serde_json::Value;
use thiserror::Error;

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Lifecycle change (connect, disconnect, retries).
    Signal(TransportSignal),
    /// Named event from the relay with its first argument.
    Event {
        /// Event name.
        name: String,
        /// Payload, `Null` when absent.
        data: Value,
    },
}

/// Transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport was closed.
    #[error("transport closed")]
    Closed,

    /// Event could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Endpoint is not a usable URL.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidUrl {
        /// Endpoint as configured.
        endpoint: String,
        /// Parser message.
        reason: String,
    },

    /// Socket.IO handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// WebSocket failure.
    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// Bidirectional event socket.
///
/// `emit` never blocks: it queues the event and returns. `recv` is
/// cancel-safe so it can sit in a `select!`.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Queue `data` under event `name`.
    fn emit(&mut self, name: &str, data: Value) -> Result<(), TransportError>;

    /// Next event. `None` once the transport has gone away for good.
    async fn recv(&mut self) -> Option<TransportEvent>;

    /// Close the socket. Further emits fail with [`TransportError::Closed`].
    fn close(&mut self);
}
