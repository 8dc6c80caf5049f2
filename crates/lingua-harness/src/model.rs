//! Reference model of one chat session.
//!
//! [`ModelSession`] restates the connection and session rules in the
//! simplest possible form: no actions, no logging, no ids. Model-based tests
//! apply the same [`Operation`] sequence to it and to the real
//! `Connection` + `ChatSession` pair, then compare [`ObservableState`]s.

use chrono::{DateTime, TimeZone, Utc};
use lingua_core::{ConnectionState, Direction, Hydration, MessageOrigin};
use lingua_proto::{HistoryRecord, Role};

/// Phrases the generators pick from.
pub const PHRASES: [&str; 4] = ["Xin chào", "안녕하세요", "Cảm ơn", "도와드릴까요?"];

/// One step of a generated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Transport connected.
    Connect,
    /// Unintentional transport loss.
    Drop,
    /// Relay closed the socket on purpose.
    ServerClose,
    /// Retry `n` started.
    Attempt(u8),
    /// Retry `n` succeeded.
    Reconnect(u8),
    /// Retry budget ran out.
    GiveUp,
    /// First connect failed.
    ConnectError,
    /// Start an activation.
    Activate,
    /// Dispose of the session.
    Teardown,
    /// Relay acknowledged the join.
    Joined,
    /// Relay delivered a chat turn.
    Receive {
        /// Author.
        sender: Role,
        /// Index into [`PHRASES`].
        phrase: u8,
        /// Whether the relay attached a translation.
        translated: bool,
    },
    /// Local user sent text.
    Send(String),
    /// Local user typed.
    LocalTyping,
    /// Counterpart typing flag.
    RemoteTyping(bool),
    /// Presence announcement of `role`.
    Online(Role),
    /// History result arrived.
    HistoryLoaded {
        /// Tag it with the previous activation instead of the current one.
        stale: bool,
        /// Number of records, see [`history_records`].
        records: u8,
        /// Fail instead of returning records.
        fail: bool,
    },
    /// Local user ended the chat.
    EndChat,
    /// Relay reported the chat closed by `by`.
    RelayEnded(Option<Role>),
}

/// Result of applying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Applied (possibly as a no-op).
    Ok,
    /// Refused.
    Error(OperationError),
}

impl OperationResult {
    /// True for [`OperationResult::Ok`].
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// Why an operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// The session was torn down.
    TornDown,
}

/// A message as the UI would render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedMessage {
    /// Live or hydrated.
    pub origin: MessageOrigin,
    /// Relative to the local role.
    pub direction: Direction,
    /// Text in the reader's language.
    pub primary: String,
    /// Original text under the translation.
    pub secondary: Option<String>,
}

/// Everything the comparison looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Connection state.
    pub connection: ConnectionState,
    /// Retry counter.
    pub attempt: u32,
    /// Retry budget spent.
    pub exhausted: bool,
    /// Join acknowledged.
    pub joined: bool,
    /// Hydration progress.
    pub hydration: Hydration,
    /// Counterpart typing.
    pub typing: bool,
    /// Counterpart seen.
    pub online: bool,
    /// Chat closed.
    pub ended: bool,
    /// Who closed it.
    pub ended_by: Option<String>,
    /// Message log.
    pub messages: Vec<ObservedMessage>,
    /// Names of every event emitted so far.
    pub emitted: Vec<&'static str>,
    /// History fetches requested so far.
    pub fetches: usize,
}

/// Records served for `HistoryLoaded { records: n }`.
///
/// Ids repeat every five records so longer histories carry duplicates.
pub fn history_records(n: u8) -> Vec<HistoryRecord> {
    let created_at: DateTime<Utc> = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();
    (0..n)
        .map(|i| {
            let sender = if i % 2 == 0 { Role::Customer } else { Role::Agent };
            HistoryRecord {
                id: (i % 5).to_string(),
                room_id: None,
                sender_type: sender,
                sender_id: None,
                original_text: PHRASES[usize::from(i) % PHRASES.len()].to_string(),
                translated_text: Some(format!("t{i}")),
                source_lang: "vi".into(),
                target_lang: Some("ko".into()),
                created_at,
            }
        })
        .collect()
}

/// Reference session for one role.
#[derive(Debug, Clone)]
pub struct ModelSession {
    role: Role,
    connection: ConnectionState,
    attempt: u32,
    exhausted: bool,
    activation: Option<u64>,
    next_activation: u64,
    hydration: Hydration,
    live_since_activation: usize,
    joined: bool,
    typing: bool,
    online: bool,
    ended: bool,
    ended_by: Option<String>,
    torn_down: bool,
    messages: Vec<ObservedMessage>,
    emitted: Vec<&'static str>,
    fetches: usize,
}

impl ModelSession {
    /// Fresh, inactive, disconnected session.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            connection: ConnectionState::Disconnected,
            attempt: 0,
            exhausted: false,
            activation: None,
            next_activation: 1,
            hydration: Hydration::NotStarted,
            live_since_activation: 0,
            joined: false,
            typing: false,
            online: false,
            ended: false,
            ended_by: None,
            torn_down: false,
            messages: Vec::new(),
            emitted: Vec::new(),
            fetches: 0,
        }
    }

    /// Current activation number.
    pub fn activation(&self) -> Option<u64> {
        self.activation
    }

    /// Apply one operation.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Connect | Operation::Reconnect(_) => {
                self.signal_state(ConnectionState::Connected, Some(0));
            },
            Operation::Drop => self.signal_state(ConnectionState::Reconnecting, None),
            Operation::ServerClose | Operation::ConnectError => {
                self.signal_state(ConnectionState::Disconnected, None);
            },
            Operation::Attempt(n) => {
                self.signal_state(ConnectionState::Reconnecting, Some(u32::from(*n)));
            },
            Operation::GiveUp => {
                if !self.exhausted {
                    self.signal_state(ConnectionState::Disconnected, None);
                    self.exhausted = true;
                }
            },
            Operation::Activate => return self.activate(),
            Operation::Teardown => {
                self.torn_down = true;
                self.activation = None;
            },
            _ if self.torn_down => {},
            Operation::Joined => self.joined_room(),
            Operation::Receive { sender, phrase, translated } => {
                let text = PHRASES[usize::from(*phrase) % PHRASES.len()];
                let translation = translated.then(|| format!("{text}*"));
                self.push_live(*sender, text, translation.as_deref());
            },
            Operation::Send(text) => {
                if !text.trim().is_empty() {
                    self.emit("send_message");
                }
            },
            Operation::LocalTyping => self.emit("typing"),
            Operation::RemoteTyping(typing) => self.typing = *typing,
            Operation::Online(role) => {
                if *role == self.role.counterpart() {
                    self.online = true;
                }
            },
            Operation::HistoryLoaded { stale, records, fail } => {
                self.history_loaded(*stale, *records, *fail);
            },
            Operation::EndChat => {
                if self.connection == ConnectionState::Connected {
                    self.emit("end_chat");
                    self.ended = true;
                    self.ended_by = Some(self.role.to_string());
                }
            },
            Operation::RelayEnded(by) => {
                self.ended = true;
                if let Some(by) = by {
                    self.ended_by = Some(by.to_string());
                }
            },
        }
        OperationResult::Ok
    }

    /// Snapshot for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            connection: self.connection,
            attempt: self.attempt,
            exhausted: self.exhausted,
            joined: self.joined,
            hydration: self.hydration,
            typing: self.typing,
            online: self.online,
            ended: self.ended,
            ended_by: self.ended_by.clone(),
            messages: self.messages.clone(),
            emitted: self.emitted.clone(),
            fetches: self.fetches,
        }
    }

    fn signal_state(&mut self, to: ConnectionState, attempt: Option<u32>) {
        if self.exhausted {
            return;
        }
        if to != self.connection {
            let was_connected = self.connection == ConnectionState::Connected;
            self.connection = to;
            self.connection_changed(was_connected);
        }
        if let Some(attempt) = attempt {
            self.attempt = attempt;
        }
    }

    fn connection_changed(&mut self, was_connected: bool) {
        if self.torn_down {
            return;
        }
        if self.connection != ConnectionState::Connected {
            self.joined = false;
        } else if !was_connected && self.activation.is_some() {
            self.emit("join_room");
        }
    }

    fn activate(&mut self) -> OperationResult {
        if self.torn_down {
            return OperationResult::Error(OperationError::TornDown);
        }
        self.activation = Some(self.next_activation);
        self.next_activation += 1;
        self.hydration = Hydration::NotStarted;
        self.live_since_activation = 0;
        self.joined = false;
        if self.connection == ConnectionState::Connected {
            self.emit("join_room");
        }
        OperationResult::Ok
    }

    fn joined_room(&mut self) {
        if self.activation.is_none() {
            return;
        }
        self.joined = true;
        if self.hydration == Hydration::NotStarted {
            self.hydration = Hydration::InFlight;
            self.fetches += 1;
        }
    }

    fn push_live(&mut self, sender: Role, text: &str, translation: Option<&str>) {
        let message = if sender == self.role {
            ObservedMessage {
                origin: MessageOrigin::Live,
                direction: Direction::Sent,
                primary: text.to_string(),
                secondary: None,
            }
        } else {
            match translation {
                Some(translation) => ObservedMessage {
                    origin: MessageOrigin::Live,
                    direction: Direction::Received,
                    primary: translation.to_string(),
                    secondary: Some(text.to_string()),
                },
                None => ObservedMessage {
                    origin: MessageOrigin::Live,
                    direction: Direction::Received,
                    primary: text.to_string(),
                    secondary: None,
                },
            }
        };
        self.messages.push(message);
        if self.activation.is_some() {
            self.live_since_activation += 1;
        }
    }

    fn history_loaded(&mut self, stale: bool, records: u8, fail: bool) {
        if self.activation.is_none() || stale || self.hydration != Hydration::InFlight {
            return;
        }
        if fail {
            self.hydration = Hydration::Failed;
            return;
        }

        let mut seen = Vec::new();
        let mut hydrated = Vec::new();
        for record in history_records(records) {
            if seen.contains(&record.id) {
                continue;
            }
            seen.push(record.id.clone());
            let own = record.sender_type == self.role;
            hydrated.push(ObservedMessage {
                origin: MessageOrigin::History,
                direction: if own { Direction::Sent } else { Direction::Received },
                primary: if own {
                    record.original_text.clone()
                } else {
                    record.translated_text.clone().unwrap_or_else(|| record.original_text.clone())
                },
                secondary: if own { None } else { Some(record.original_text.clone()) },
            });
        }

        let keep = self.messages.len() - self.live_since_activation;
        let live = self.messages.split_off(keep);
        self.messages = hydrated;
        self.messages.extend(live);
        self.hydration = Hydration::Applied;
    }

    fn emit(&mut self, name: &'static str) {
        if self.connection == ConnectionState::Connected {
            self.emitted.push(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_waits_for_connection() {
        let mut model = ModelSession::new(Role::Customer);
        model.apply(&Operation::Activate);
        assert!(model.observable_state().emitted.is_empty());
        model.apply(&Operation::Connect);
        assert_eq!(model.observable_state().emitted, vec!["join_room"]);
    }

    #[test]
    fn torn_down_model_refuses_activation() {
        let mut model = ModelSession::new(Role::Agent);
        model.apply(&Operation::Teardown);
        assert_eq!(model.apply(&Operation::Activate), OperationResult::Error(OperationError::TornDown));
    }

    #[test]
    fn history_records_repeat_ids() {
        let records = history_records(7);
        assert_eq!(records[0].id, records[5].id);
    }
}
