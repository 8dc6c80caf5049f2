//! World state for scenario execution.
//!
//! The World owns both sessions and the relay, executes session actions
//! synchronously, and keeps per-participant counters and notices for the
//! oracle.

use std::collections::{HashMap, VecDeque};

use lingua_core::{ChatSession, ConnectionState, SessionAction, SessionEvent, SessionNotice};
use lingua_proto::{HistoryRecord, InboundEvent, Role};
use tracing::trace;

use crate::{SimEnv, sim_relay::SimRelay};

/// Upper bound on deliveries per settle, against routing loops.
const MAX_DELIVERIES: usize = 10_000;

/// Both participants, the relay and what happened between them.
pub struct World {
    sessions: HashMap<Role, ChatSession<SimEnv>>,
    relay: SimRelay,
    history: Vec<HistoryRecord>,
    pending: VecDeque<(Role, SessionEvent)>,
    notices: HashMap<Role, Vec<SessionNotice>>,
    frames_sent: HashMap<Role, usize>,
    frames_received: HashMap<Role, usize>,
    fetches: HashMap<Role, usize>,
}

impl World {
    /// World around `relay`. Every history fetch is answered with `history`.
    pub fn new(relay: SimRelay, history: Vec<HistoryRecord>) -> Self {
        Self {
            sessions: HashMap::new(),
            relay,
            history,
            pending: VecDeque::new(),
            notices: HashMap::new(),
            frames_sent: HashMap::new(),
            frames_received: HashMap::new(),
            fetches: HashMap::new(),
        }
    }

    /// Seat a participant.
    pub fn add_session(&mut self, session: ChatSession<SimEnv>) {
        self.sessions.insert(session.role(), session);
    }

    /// Session of `role`.
    pub fn session(&self, role: Role) -> Option<&ChatSession<SimEnv>> {
        self.sessions.get(&role)
    }

    /// Mutable session of `role`.
    pub fn session_mut(&mut self, role: Role) -> Option<&mut ChatSession<SimEnv>> {
        self.sessions.get_mut(&role)
    }

    /// The relay.
    pub fn relay(&self) -> &SimRelay {
        &self.relay
    }

    /// Notices raised by `role`'s session, oldest first.
    pub fn notices(&self, role: Role) -> &[SessionNotice] {
        self.notices.get(&role).map_or(&[], Vec::as_slice)
    }

    /// Commands `role` sent to the relay.
    pub fn frames_sent(&self, role: Role) -> usize {
        self.frames_sent.get(&role).copied().unwrap_or(0)
    }

    /// Events the relay delivered to `role`.
    pub fn frames_received(&self, role: Role) -> usize {
        self.frames_received.get(&role).copied().unwrap_or(0)
    }

    /// History fetches `role` requested.
    pub fn fetches(&self, role: Role) -> usize {
        self.fetches.get(&role).copied().unwrap_or(0)
    }

    /// Roles seated in the world.
    pub fn roles(&self) -> Vec<Role> {
        [Role::Customer, Role::Agent].into_iter().filter(|r| self.sessions.contains_key(r)).collect()
    }

    /// Feed a connection change to `role`'s session.
    pub fn set_connection(&mut self, role: Role, state: ConnectionState) {
        self.pending.push_back((role, SessionEvent::ConnectionChanged(state)));
    }

    /// Execute actions produced by `role`'s session.
    pub fn execute(&mut self, role: Role, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::Emit(command) => {
                    *self.frames_sent.entry(role).or_insert(0) += 1;
                    for delivery in self.relay.route(role, command) {
                        self.pending.push_back((delivery.to, SessionEvent::Inbound(delivery.event)));
                    }
                },
                SessionAction::FetchHistory { activation, .. } => {
                    *self.fetches.entry(role).or_insert(0) += 1;
                    self.pending.push_back((
                        role,
                        SessionEvent::HistoryLoaded { activation, result: Ok(self.history.clone()) },
                    ));
                },
                SessionAction::Notify(notice) => {
                    self.notices.entry(role).or_default().push(notice);
                },
            }
        }
    }

    /// Process queued events until the world is quiet.
    pub fn settle(&mut self) -> Result<(), String> {
        let mut delivered = 0;
        while let Some((role, event)) = self.pending.pop_front() {
            delivered += 1;
            if delivered > MAX_DELIVERIES {
                return Err(format!("world did not settle after {MAX_DELIVERIES} deliveries"));
            }
            if matches!(event, SessionEvent::Inbound(_)) {
                *self.frames_received.entry(role).or_insert(0) += 1;
            }
            if let SessionEvent::Inbound(InboundEvent::NewMessage(message)) = &event {
                trace!(%role, sender = %message.sender_type, "delivering message");
            }

            let Some(session) = self.sessions.get_mut(&role) else {
                continue;
            };
            let actions = session.handle_event(event);
            self.execute(role, actions);
        }
        Ok(())
    }
}
