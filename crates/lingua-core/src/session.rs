//! Chat session state machine.
//!
//! One [`ChatSession`] is one participant's view of one room. It turns relay
//! events into a normalized message log plus presence and typing flags, and
//! turns UI commands into relay commands.
//!
//! # Architecture
//!
//! Same action pattern as [`crate::connection`]: every input returns a list
//! of [`SessionAction`]s and the runtime executes them. The session never
//! sends anything, never fetches anything and never sleeps.
//!
//! ```text
//!   SessionCommand ──┐                      ┌──> Emit(OutboundEvent)
//!                    ├──> ChatSession ──────┼──> FetchHistory { activation }
//!   SessionEvent ────┘                      └──> Notify(SessionNotice)
//! ```
//!
//! # Activations
//!
//! [`ChatSession::activate`] starts an activation with a fresh
//! [`ActivationId`]. `join_room` goes out immediately when connected, or on the
//! next transition into `Connected` otherwise, and again on every reconnect.
//! The first `joined_room` of an activation requests history once; the result
//! comes back as [`SessionEvent::HistoryLoaded`] tagged with the activation it
//! belongs to, so late results of an old activation or of a torn-down session
//! are dropped.
//!
//! # Hydration ordering
//!
//! If no live message arrived since activation, a successful fetch replaces
//! the log. Otherwise the records go in front of the live messages of this
//! activation.

use std::collections::HashSet;

use lingua_proto::{
    BASE_LANGUAGE, ChatEnded, EndChat, HistoryRecord, InboundEvent, JoinRoom, NewMessage,
    OutboundEvent, Role, RoomId, RoomRef, SendMessage,
};
use tracing::{debug, info, trace, warn};

use crate::{
    connection::ConnectionState,
    env::Environment,
    error::{ConfigError, HydrationError, SessionError},
    message::{Message, MessageId},
};

/// Random suffixes tried before falling back to a sequence suffix.
const LIVE_ID_RETRIES: usize = 4;

/// Explicit session configuration. Nothing is read from ambient storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Room to join.
    pub room_id: RoomId,
    /// Role of this participant.
    pub role: Role,
    /// Working language of a customer.
    pub language: Option<String>,
    /// Identity of an agent. The relay assigns one when absent.
    pub agent_id: Option<String>,
    /// Language used when no working language is set.
    pub base_language: String,
}

impl SessionConfig {
    /// Customer session writing in `language`.
    pub fn customer(room_id: impl Into<RoomId>, language: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            role: Role::Customer,
            language: Some(language.into()),
            agent_id: None,
            base_language: BASE_LANGUAGE.to_string(),
        }
    }

    /// Agent session.
    pub fn agent(room_id: impl Into<RoomId>, agent_id: Option<String>) -> Self {
        Self {
            room_id: room_id.into(),
            role: Role::Agent,
            language: None,
            agent_id,
            base_language: BASE_LANGUAGE.to_string(),
        }
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.room_id.is_blank() {
            return Err(ConfigError::EmptyRoom);
        }
        if self.language.as_deref().is_some_and(|l| l.trim().is_empty()) {
            return Err(ConfigError::EmptyLanguage { field: "language" });
        }
        if self.base_language.trim().is_empty() {
            return Err(ConfigError::EmptyLanguage { field: "base_language" });
        }
        Ok(())
    }

    /// Language stamped on outgoing messages.
    pub fn outbound_language(&self) -> &str {
        self.language.as_deref().unwrap_or(&self.base_language)
    }
}

/// Monotonic id of one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivationId(pub u64);

/// History hydration progress within the current activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    /// Waiting for the first `joined_room`.
    NotStarted,
    /// Fetch issued, result outstanding.
    InFlight,
    /// Records applied.
    Applied,
    /// Fetch failed; continuing without history.
    Failed,
}

/// Input events.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connection state changed.
    ConnectionChanged(ConnectionState),
    /// Event relayed by the server.
    Inbound(InboundEvent),
    /// A history fetch finished.
    HistoryLoaded {
        /// Activation that requested it.
        activation: ActivationId,
        /// Records or failure.
        result: Result<Vec<HistoryRecord>, HydrationError>,
    },
}

/// UI commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Send a chat turn.
    SendMessage(String),
    /// We started typing.
    Typing,
    /// We stopped typing.
    StopTyping,
    /// Close the conversation.
    EndChat,
}

/// Observable change, for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The relay acknowledged the join.
    Joined,
    /// A live message was appended.
    MessageAppended(MessageId),
    /// History was applied.
    HistoryHydrated {
        /// Records applied.
        count: usize,
    },
    /// History could not be fetched.
    HistoryUnavailable {
        /// Failure description.
        reason: String,
    },
    /// The counterpart is in the room.
    CounterpartOnline,
    /// The counterpart's typing flag changed.
    TypingChanged(bool),
    /// The conversation was closed.
    ChatEnded {
        /// Who closed it, when known.
        ended_by: Option<String>,
    },
    /// The relay reported a fault.
    RelayError {
        /// Relay message.
        message: String,
    },
}

/// Effects for the runtime to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Send a command to the relay.
    Emit(OutboundEvent),
    /// Fetch the room's history and report back with
    /// [`SessionEvent::HistoryLoaded`].
    FetchHistory {
        /// Activation to tag the result with.
        activation: ActivationId,
        /// Room to fetch.
        room_id: RoomId,
    },
    /// Tell the UI something changed.
    Notify(SessionNotice),
}

/// One participant's session in one room.
#[derive(Debug)]
pub struct ChatSession<E: Environment> {
    env: E,
    config: SessionConfig,
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    connected: bool,
    activation: Option<ActivationId>,
    next_activation: u64,
    hydration: Hydration,
    live_since_activation: usize,
    joined: bool,
    counterpart_online: bool,
    counterpart_typing: bool,
    counterpart_language: Option<String>,
    ended: bool,
    ended_by: Option<String>,
    torn_down: bool,
    id_seq: u64,
}

impl<E: Environment> ChatSession<E> {
    /// Create an inactive session.
    pub fn new(env: E, config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            env,
            config,
            messages: Vec::new(),
            ids: HashSet::new(),
            connected: false,
            activation: None,
            next_activation: 1,
            hydration: Hydration::NotStarted,
            live_since_activation: 0,
            joined: false,
            counterpart_online: false,
            counterpart_typing: false,
            counterpart_language: None,
            ended: false,
            ended_by: None,
            torn_down: false,
            id_seq: 0,
        })
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// This participant's role.
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Room of the session.
    pub fn room_id(&self) -> &RoomId {
        &self.config.room_id
    }

    /// Message log, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Current activation.
    pub fn activation(&self) -> Option<ActivationId> {
        self.activation
    }

    /// Hydration progress of the current activation.
    pub fn hydration(&self) -> Hydration {
        self.hydration
    }

    /// Last known connection state is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The relay acknowledged the current activation's join.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// The counterpart was seen in the room. Never resets.
    pub fn counterpart_online(&self) -> bool {
        self.counterpart_online
    }

    /// The counterpart is typing.
    pub fn counterpart_typing(&self) -> bool {
        self.counterpart_typing
    }

    /// Customer language announced by `customer_online` (agent sessions).
    pub fn counterpart_language(&self) -> Option<&str> {
        self.counterpart_language.as_deref()
    }

    /// The conversation was closed.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Who closed the conversation, when known.
    pub fn ended_by(&self) -> Option<&str> {
        self.ended_by.as_deref()
    }

    /// The session was disposed.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Start a new activation and join the room.
    pub fn activate(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        if self.torn_down {
            return Err(SessionError::TornDown { room_id: self.config.room_id.to_string() });
        }

        let activation = ActivationId(self.next_activation);
        self.next_activation += 1;
        self.activation = Some(activation);
        self.hydration = Hydration::NotStarted;
        self.live_since_activation = 0;
        self.joined = false;

        info!(
            room_id = %self.config.room_id,
            role = %self.config.role,
            activation = activation.0,
            "session activated"
        );

        if self.connected {
            Ok(vec![self.join()])
        } else {
            debug!(room_id = %self.config.room_id, "not connected, join deferred");
            Ok(Vec::new())
        }
    }

    /// Dispose of the session. Every later input is ignored.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        if self.hydration == Hydration::InFlight {
            debug!(room_id = %self.config.room_id, "teardown with history fetch in flight");
        }
        self.torn_down = true;
        self.activation = None;
        info!(room_id = %self.config.room_id, "session torn down");
    }

    /// Apply a UI command.
    pub fn handle_command(&mut self, command: SessionCommand) -> Vec<SessionAction> {
        if self.torn_down {
            debug!(?command, "session torn down, dropping command");
            return Vec::new();
        }

        let room_id = self.config.room_id.clone();
        match command {
            SessionCommand::SendMessage(text) => {
                if text.trim().is_empty() {
                    trace!("ignoring blank message");
                    return Vec::new();
                }
                let language = self.config.outbound_language().to_string();
                self.emit_if_connected(OutboundEvent::SendMessage(SendMessage {
                    room_id,
                    text,
                    language,
                }))
            },
            SessionCommand::Typing => self.emit_if_connected(OutboundEvent::Typing(RoomRef { room_id })),
            SessionCommand::StopTyping => {
                self.emit_if_connected(OutboundEvent::StopTyping(RoomRef { room_id }))
            },
            SessionCommand::EndChat => {
                let role = self.config.role;
                let mut actions =
                    self.emit_if_connected(OutboundEvent::EndChat(EndChat { room_id, ended_by: role }));
                // Only a close the relay heard about ends the chat.
                if !actions.is_empty() {
                    actions.extend(self.mark_ended(Some(role.to_string())));
                }
                actions
            },
        }
    }

    /// Apply an input event.
    pub fn handle_event(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        if self.torn_down {
            debug!(room_id = %self.config.room_id, "session torn down, discarding event");
            return Vec::new();
        }

        match event {
            SessionEvent::ConnectionChanged(state) => self.handle_connection(state),
            SessionEvent::Inbound(event) => self.handle_inbound(event),
            SessionEvent::HistoryLoaded { activation, result } => {
                self.handle_history(activation, result)
            },
        }
    }

    fn handle_connection(&mut self, state: ConnectionState) -> Vec<SessionAction> {
        let was_connected = self.connected;
        self.connected = state == ConnectionState::Connected;

        if !self.connected {
            self.joined = false;
            return Vec::new();
        }
        if was_connected || self.activation.is_none() {
            return Vec::new();
        }
        vec![self.join()]
    }

    fn handle_inbound(&mut self, event: InboundEvent) -> Vec<SessionAction> {
        match event {
            InboundEvent::ServerHello(hello) => {
                debug!(sid = ?hello.sid, "relay greeting");
                Vec::new()
            },
            InboundEvent::JoinedRoom(ack) => self.handle_joined(ack.room_id.as_ref()),
            InboundEvent::NewMessage(msg) => self.append_live(&msg),
            InboundEvent::Typing => self.set_typing(true),
            InboundEvent::StopTyping => self.set_typing(false),
            InboundEvent::AgentOnline => self.mark_online(Role::Agent, None),
            InboundEvent::CustomerOnline(online) => self.mark_online(Role::Customer, online.language),
            InboundEvent::ChatEnded(ChatEnded { ended_by, .. }) => self.mark_ended(ended_by),
            InboundEvent::RelayError(err) => {
                warn!(
                    room_id = %self.config.room_id,
                    message = %err.message,
                    detail = ?err.detail,
                    "relay error"
                );
                vec![SessionAction::Notify(SessionNotice::RelayError { message: err.message })]
            },
        }
    }

    fn handle_joined(&mut self, room_id: Option<&RoomId>) -> Vec<SessionAction> {
        let Some(activation) = self.activation else {
            debug!("joined_room before activation, ignoring");
            return Vec::new();
        };
        if room_id.is_some_and(|room| room != &self.config.room_id) {
            debug!(?room_id, "joined_room for another room, ignoring");
            return Vec::new();
        }

        self.joined = true;
        let mut actions = vec![SessionAction::Notify(SessionNotice::Joined)];
        if self.hydration == Hydration::NotStarted {
            self.hydration = Hydration::InFlight;
            debug!(room_id = %self.config.room_id, activation = activation.0, "fetching history");
            actions.push(SessionAction::FetchHistory {
                activation,
                room_id: self.config.room_id.clone(),
            });
        }
        actions
    }

    fn handle_history(
        &mut self,
        activation: ActivationId,
        result: Result<Vec<HistoryRecord>, HydrationError>,
    ) -> Vec<SessionAction> {
        if self.activation != Some(activation) || self.hydration != Hydration::InFlight {
            debug!(
                activation = activation.0,
                current = ?self.activation.map(|a| a.0),
                hydration = ?self.hydration,
                "discarding stale history result"
            );
            return Vec::new();
        }

        let records = match result {
            Ok(records) => records,
            Err(err) => {
                warn!(room_id = %self.config.room_id, error = %err, "history unavailable");
                self.hydration = Hydration::Failed;
                return vec![SessionAction::Notify(SessionNotice::HistoryUnavailable {
                    reason: err.to_string(),
                })];
            },
        };

        let mut seen = HashSet::new();
        let mut hydrated = Vec::with_capacity(records.len());
        for record in &records {
            let message = Message::from_history(self.config.role, record);
            if seen.insert(message.id.clone()) {
                hydrated.push(message);
            } else {
                debug!(id = %message.id, "duplicate history record skipped");
            }
        }
        let count = hydrated.len();

        let live = self.messages.split_off(self.messages.len() - self.live_since_activation);
        if !live.is_empty() {
            debug!(live = live.len(), "history arrived after live messages, placing it first");
        }
        self.messages = hydrated;
        self.messages.extend(live);
        self.ids = self.messages.iter().map(|m| m.id.clone()).collect();
        self.hydration = Hydration::Applied;

        info!(room_id = %self.config.room_id, count, "history hydrated");
        vec![SessionAction::Notify(SessionNotice::HistoryHydrated { count })]
    }

    fn append_live(&mut self, event: &NewMessage) -> Vec<SessionAction> {
        let id = self.next_live_id();
        let message = Message::from_live(id.clone(), self.config.role, event, self.env.wall_clock());
        trace!(%id, direction = ?message.direction, "message appended");

        self.ids.insert(id.clone());
        self.messages.push(message);
        if self.activation.is_some() {
            self.live_since_activation += 1;
        }
        vec![SessionAction::Notify(SessionNotice::MessageAppended(id))]
    }

    fn next_live_id(&mut self) -> MessageId {
        let millis = self.env.wall_clock().timestamp_millis();
        let mut suffix = String::new();
        for _ in 0..LIVE_ID_RETRIES {
            suffix = format!("{:08x}", self.env.random_u32());
            let id = MessageId::live(millis, &suffix);
            if !self.ids.contains(&id) {
                return id;
            }
        }

        debug!(millis, "live id collisions, using sequence suffix");
        loop {
            self.id_seq += 1;
            let id = MessageId::live(millis, &format!("{suffix}-{}", self.id_seq));
            if !self.ids.contains(&id) {
                return id;
            }
        }
    }

    fn set_typing(&mut self, typing: bool) -> Vec<SessionAction> {
        if self.counterpart_typing == typing {
            return Vec::new();
        }
        self.counterpart_typing = typing;
        vec![SessionAction::Notify(SessionNotice::TypingChanged(typing))]
    }

    fn mark_online(&mut self, who: Role, language: Option<String>) -> Vec<SessionAction> {
        if who != self.config.role.counterpart() {
            trace!(role = %who, "own presence echo");
            return Vec::new();
        }
        if language.is_some() {
            self.counterpart_language = language;
        }
        if self.counterpart_online {
            return Vec::new();
        }
        self.counterpart_online = true;
        info!(room_id = %self.config.room_id, counterpart = %who, "counterpart online");
        vec![SessionAction::Notify(SessionNotice::CounterpartOnline)]
    }

    fn mark_ended(&mut self, ended_by: Option<String>) -> Vec<SessionAction> {
        self.ended = true;
        if ended_by.is_some() {
            self.ended_by.clone_from(&ended_by);
        }
        info!(room_id = %self.config.room_id, ?ended_by, "chat ended");
        vec![SessionAction::Notify(SessionNotice::ChatEnded { ended_by })]
    }

    fn join(&self) -> SessionAction {
        let agent_id = match self.config.role {
            Role::Agent => self.config.agent_id.clone(),
            Role::Customer => None,
        };
        debug!(room_id = %self.config.room_id, role = %self.config.role, "joining room");
        SessionAction::Emit(OutboundEvent::JoinRoom(JoinRoom {
            room_id: self.config.room_id.clone(),
            user_type: self.config.role,
            language: self.config.language.clone(),
            agent_id,
        }))
    }

    fn emit_if_connected(&self, event: OutboundEvent) -> Vec<SessionAction> {
        if self.connected {
            vec![SessionAction::Emit(event)]
        } else {
            debug!(event = event.name(), "not connected, dropping command");
            Vec::new()
        }
    }
}
