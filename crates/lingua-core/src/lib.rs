//! Lingua chat session core logic
//!
//! Pure state machine logic for a bilingual customer/agent chat, completely
//! decoupled from I/O. This enables deterministic testing.
//!
//! # Architecture
//!
//! Session logic in this crate is implemented as deterministic state
//! machines that are isolated from I/O, time, randomness, and scheduling.
//! All external effects are supplied explicitly by the caller.
//!
//! State transitions produce declarative actions that describe intended
//! effects rather than executing them directly. A runtime or test harness
//! is responsible for interpreting and executing these actions.
//!
//! # Components
//!
//! - [`connection`]: Connection-state tracker (connected, reconnecting)
//! - [`session`]: Chat session state machine (join, hydration, presence)
//! - [`projection`]: Role-relative choice of primary and secondary text
//! - [`message`]: Normalized message log entries
//! - [`backoff`]: Reconnect delay schedule
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`error`]: Session and configuration error types

pub mod backoff;
pub mod connection;
pub mod env;
pub mod error;
pub mod message;
pub mod projection;
pub mod session;

pub use backoff::Backoff;
pub use connection::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, DisconnectReason,
    TransportSignal,
};
pub use env::{Environment, SystemEnv};
pub use error::{ConfigError, HydrationError, SessionError};
pub use message::{DeliveryStatus, Direction, Message, MessageId, MessageOrigin};
pub use session::{
    ActivationId, ChatSession, Hydration, SessionAction, SessionCommand, SessionConfig,
    SessionEvent, SessionNotice,
};
