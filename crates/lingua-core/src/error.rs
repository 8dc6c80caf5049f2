//! Error types for session and connection configuration.

use thiserror::Error;

/// Invalid configuration supplied by the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Room id is empty or whitespace.
    #[error("room id must not be empty")]
    EmptyRoom,

    /// A language tag was given but is empty.
    #[error("{field} must not be empty when given")]
    EmptyLanguage {
        /// Offending field.
        field: &'static str,
    },

    /// Relay endpoint is empty.
    #[error("endpoint must not be empty")]
    EmptyEndpoint,

    /// Relay endpoint does not use a supported scheme.
    #[error("unsupported endpoint {0}: expected http(s):// or ws(s)://")]
    InvalidEndpoint(String),

    /// Minimum reconnect delay exceeds the maximum.
    #[error("reconnect delay {min_ms}ms exceeds maximum {max_ms}ms")]
    InvalidDelay {
        /// Configured minimum, in milliseconds.
        min_ms: u64,
        /// Configured maximum, in milliseconds.
        max_ms: u64,
    },

    /// Handshake timeout is zero.
    #[error("handshake timeout must be positive")]
    ZeroTimeout,
}

/// Errors raised by [`crate::session::ChatSession`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session configuration rejected.
    #[error("invalid session config: {0}")]
    Config(#[from] ConfigError),

    /// Operation on a session that was already torn down.
    #[error("session for room {room_id} was torn down")]
    TornDown {
        /// Room of the disposed session.
        room_id: String,
    },
}

/// History fetch failed. Never fatal: the session continues with what it has.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HydrationError {
    /// Server answered with a non-success status.
    #[error("history request failed with HTTP {status}")]
    Http {
        /// HTTP status code.
        status: u16,
    },

    /// Request could not be sent or the response could not be read.
    #[error("history request failed: {0}")]
    Transport(String),

    /// Response body was not a list of history records.
    #[error("history response could not be decoded: {0}")]
    Decode(String),
}
