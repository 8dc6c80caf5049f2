//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while decoding or encoding wire data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Event name is not part of the relay protocol.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Payload did not match the shape expected for the event.
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload {
        /// Event whose payload failed to decode.
        event: String,
        /// Decoder message.
        reason: String,
    },

    /// Text frame is not a well-formed Engine.IO / Socket.IO packet.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Packet type is valid but not handled by this client (binary events).
    #[error("unsupported packet type: {0}")]
    Unsupported(char),

    /// Payload could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}
