//! Scenario tests with mandatory oracles.
//!
//! A scenario seats a customer and an agent in one room behind a
//! [`SimRelay`](crate::SimRelay), connects and activates both sessions,
//! plays a list of [`Step`]s, and hands the final [`World`] to an oracle.
//! There is no way to run a scenario without one.

mod builder;
pub mod oracle;
mod world;

pub use builder::{RunnableScenario, Scenario, Step};
pub use world::World;

/// Verification run against the final world.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
