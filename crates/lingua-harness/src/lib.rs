//! Deterministic simulation harness for Lingua chat sessions.
//!
//! - [`SimEnv`]: seeded clock and RNG.
//! - [`SimTransport`] / [`SimRemote`]: in-memory socket pair for runtime
//!   tests.
//! - [`ScriptedHistory`]: canned, optionally gated, history replies.
//! - [`SimRelay`]: routes and "translates" between a customer and an agent.
//! - [`ModelSession`]: reference model for model-based property tests.
//! - [`scenario`]: two-participant scenarios verified by oracles.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod scenario;
pub mod scripted_history;
pub mod sim_env;
pub mod sim_relay;
pub mod sim_transport;

pub use model::{
    ModelSession, ObservableState, ObservedMessage, Operation, OperationError, OperationResult,
    PHRASES, history_records,
};
pub use scripted_history::ScriptedHistory;
pub use sim_env::SimEnv;
pub use sim_relay::{Delivery, SimRelay};
pub use sim_transport::{SimRemote, SimTransport};
