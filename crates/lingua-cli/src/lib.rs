//! Terminal client for Lingua chat rooms.
//!
//! A thin shell over [`lingua_client::SessionRuntime`]: stdin lines become
//! session commands, view snapshots become printed lines.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod app;
pub mod args;
pub mod commands;
pub mod render;

pub use app::{CliError, drive, run};
pub use args::{Args, RoleArg};
pub use commands::Command;
pub use render::Renderer;
