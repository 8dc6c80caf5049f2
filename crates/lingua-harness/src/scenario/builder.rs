//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenario tests that enforce
//! the Oracle Pattern.

use lingua_core::{ChatSession, ConnectionState, SessionCommand, SessionConfig};
use lingua_proto::{HistoryRecord, Role};

use crate::{
    SimEnv,
    scenario::{OracleFn, World},
    sim_relay::SimRelay,
};

/// One thing a participant does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send a chat turn.
    Send(Role, String),
    /// Start typing.
    Typing(Role),
    /// Stop typing.
    StopTyping(Role),
    /// Close the conversation.
    EndChat(Role),
    /// Lose the connection and get it back.
    Reconnect(Role),
    /// Lose the connection for good.
    Disconnect(Role),
    /// Start a new activation.
    Reactivate(Role),
    /// Dispose of the session.
    Teardown(Role),
}

impl Step {
    /// `role` sends `text`.
    pub fn send(role: Role, text: impl Into<String>) -> Self {
        Self::Send(role, text.into())
    }
}

/// Scenario builder.
///
/// Seat participants, configure the relay, list steps. Must call
/// `.oracle()` to get a [`RunnableScenario`] that can be executed.
pub struct Scenario {
    name: String,
    seed: u64,
    configs: Vec<SessionConfig>,
    relay: SimRelay,
    history: Vec<HistoryRecord>,
    steps: Vec<Step>,
}

impl Scenario {
    /// Create a new scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: 0,
            configs: Vec::new(),
            relay: SimRelay::new(),
            history: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Seed for the shared environment.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Seat a customer working in `language`.
    pub fn customer(mut self, language: impl Into<String>) -> Self {
        self.configs.push(SessionConfig::customer("room_1", language));
        self
    }

    /// Seat an agent.
    pub fn agent(mut self) -> Self {
        self.configs.push(SessionConfig::agent("room_1", Some("agent_001".into())));
        self
    }

    /// Seat a participant with custom configuration.
    pub fn participant(mut self, config: SessionConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Use `relay` instead of an empty one.
    pub fn relay(mut self, relay: SimRelay) -> Self {
        self.relay = relay;
        self
    }

    /// Answer every history fetch with `records`.
    pub fn history(mut self, records: Vec<HistoryRecord>) -> Self {
        self.history = records;
        self
    }

    /// Append a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// 1. Every participant connects and activates, in seating order, and the
    ///    world settles after each.
    /// 2. Each step runs and the world settles.
    /// 3. The oracle verifies the final world.
    pub fn run(self) -> Result<(), String> {
        let Scenario { name, seed, configs, relay, history, steps } = self.scenario;
        let env = SimEnv::with_seed(seed);
        let mut world = World::new(relay, history);

        let mut roles = Vec::with_capacity(configs.len());
        for config in configs {
            let role = config.role;
            let session = ChatSession::new(env.clone(), config)
                .map_err(|e| format!("Scenario '{name}': {role} session rejected: {e}"))?;
            world.add_session(session);
            roles.push(role);
        }

        for role in roles {
            world.set_connection(role, ConnectionState::Connected);
            world.settle()?;
            activate(&mut world, role).map_err(|e| format!("Scenario '{name}': {e}"))?;
            world.settle()?;
        }

        for (i, step) in steps.into_iter().enumerate() {
            apply(&mut world, &step).map_err(|e| format!("Scenario '{name}' step {i}: {e}"))?;
            world.settle().map_err(|e| format!("Scenario '{name}' step {i}: {e}"))?;
        }

        (self.oracle)(&world).map_err(|e| format!("Scenario '{name}': {e}"))
    }
}

fn activate(world: &mut World, role: Role) -> Result<(), String> {
    let session = world.session_mut(role).ok_or_else(|| format!("{role} not seated"))?;
    let actions = session.activate().map_err(|e| format!("{role} activate failed: {e}"))?;
    world.execute(role, actions);
    Ok(())
}

fn apply(world: &mut World, step: &Step) -> Result<(), String> {
    let (role, command) = match step {
        Step::Send(role, text) => (*role, SessionCommand::SendMessage(text.clone())),
        Step::Typing(role) => (*role, SessionCommand::Typing),
        Step::StopTyping(role) => (*role, SessionCommand::StopTyping),
        Step::EndChat(role) => (*role, SessionCommand::EndChat),
        Step::Reconnect(role) => {
            world.set_connection(*role, ConnectionState::Reconnecting);
            world.set_connection(*role, ConnectionState::Connected);
            return Ok(());
        },
        Step::Disconnect(role) => {
            world.set_connection(*role, ConnectionState::Disconnected);
            return Ok(());
        },
        Step::Reactivate(role) => return activate(world, *role),
        Step::Teardown(role) => {
            let session = world.session_mut(*role).ok_or_else(|| format!("{role} not seated"))?;
            session.teardown();
            return Ok(());
        },
    };

    let session = world.session_mut(role).ok_or_else(|| format!("{role} not seated"))?;
    let actions = session.handle_command(command);
    world.execute(role, actions);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_requires_oracle() {
        // This should compile - oracle provided
        let _scenario = Scenario::new("test").customer("vi").oracle(Box::new(|_world| Ok(())));

        // This should NOT compile - no oracle
        // let scenario = Scenario::new("test").customer("vi");
        // scenario.run(); // ERROR: no method `run` on type `Scenario`
    }

    #[test]
    fn scenario_seats_participants() {
        let scenario = Scenario::new("test").customer("vi").agent().oracle(Box::new(|world| {
            assert!(world.session(Role::Customer).is_some());
            assert!(world.session(Role::Agent).is_some());
            assert_eq!(world.roles(), vec![Role::Customer, Role::Agent]);
            Ok(())
        }));

        scenario.run().expect("scenario should succeed");
    }

    #[test]
    fn invalid_participant_fails_the_run() {
        let result = Scenario::new("blank language")
            .customer("  ")
            .oracle(Box::new(|_world| Ok(())))
            .run();
        assert!(result.is_err());
    }
}
