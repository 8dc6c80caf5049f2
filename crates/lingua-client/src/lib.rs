//! Async runtime layer for Lingua chat sessions.
//!
//! Wires the pure state machines of `lingua-core` to real I/O:
//!
//! - [`ConnectionManager`] owns one [`Transport`], tracks its health, filters
//!   relay events by subscription and drops outbound events while the
//!   connection is down.
//! - [`SessionRuntime`] drives one `ChatSession` on a task and hands out a
//!   [`SessionHandle`] for commands, notices and view snapshots.
//! - [`HistorySource`] fetches persisted messages for hydration.
//!
//! With the `transport` feature, [`SocketIoTransport`] (WebSocket, via
//! `tokio-tungstenite`) and [`HttpHistorySource`] (via `reqwest`) provide the
//! production implementations.
#![forbid(unsafe_code)]

pub mod history;
pub mod manager;
pub mod runtime;
pub mod transport;
#[cfg(feature = "transport")]
pub mod ws;

#[cfg(feature = "transport")]
pub use history::HttpHistorySource;
pub use history::{HistoryConfig, HistorySource, NoHistory};
pub use manager::{ConnectionManager, ManagerEvent};
pub use runtime::{NOTICE_CAPACITY, SessionHandle, SessionRuntime, SessionView};
pub use transport::{Transport, TransportError, TransportEvent};
#[cfg(feature = "transport")]
pub use ws::SocketIoTransport;
