//! Relay simulator.
//!
//! Routes commands between the customer and the agent of one room the way the
//! relay server does:
//!
//! - `join_room` is acknowledged to the joiner, who is then told whether the
//!   counterpart is already present.
//! - `send_message` is translated, delivered to the counterpart and echoed to
//!   the sender. Customers are translated into Korean, agents into the
//!   customer's language.
//! - `typing` and `stop_typing` go to the counterpart only.
//! - `end_chat` is broadcast to everyone who joined.
//!
//! Translation is a fixed dictionary. Unknown phrases come back tagged with
//! the target language, and phrases marked as failing produce a relay
//! `error` for the sender instead of a message.
//!
//! [`SimRelay::route`] is pure and drives synchronous scenarios.
//! [`SimRelay::pump`] moves frames between attached [`SimRemote`]s for
//! runtime tests.

use std::collections::{HashMap, HashSet};

use lingua_proto::{
    BASE_LANGUAGE, ChatEnded, CustomerOnline, EndChat, InboundEvent, JoinRoom, JoinedRoom,
    NewMessage, OutboundEvent, RelayError, Role, RoomId, SendMessage,
};
use tracing::{debug, warn};

use crate::sim_transport::SimRemote;

/// Language assumed for a customer who never announced one.
const FALLBACK_CUSTOMER_LANGUAGE: &str = "en";

/// An event addressed to one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Recipient.
    pub to: Role,
    /// Event to deliver.
    pub event: InboundEvent,
}

/// In-memory relay for one room.
#[derive(Default)]
pub struct SimRelay {
    dictionary: HashMap<(String, String), String>,
    failing: HashSet<String>,
    joined: HashSet<Role>,
    customer_language: Option<String>,
    ended: bool,
    remotes: HashMap<Role, SimRemote>,
    routed: usize,
}

impl SimRelay {
    /// Empty relay with an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate `text` into `target` as `translation`.
    pub fn with_translation(
        mut self,
        text: impl Into<String>,
        target: impl Into<String>,
        translation: impl Into<String>,
    ) -> Self {
        self.dictionary.insert((text.into(), target.into()), translation.into());
        self
    }

    /// Make translating `text` fail.
    pub fn failing_on(mut self, text: impl Into<String>) -> Self {
        self.failing.insert(text.into());
        self
    }

    /// Connect a participant's socket for [`SimRelay::pump`].
    pub fn attach(&mut self, role: Role, remote: SimRemote) {
        self.remotes.insert(role, remote);
    }

    /// The attached socket of `role`.
    pub fn remote(&self, role: Role) -> Option<&SimRemote> {
        self.remotes.get(&role)
    }

    /// Mutable access to the attached socket of `role`.
    pub fn remote_mut(&mut self, role: Role) -> Option<&mut SimRemote> {
        self.remotes.get_mut(&role)
    }

    /// True once `role` joined.
    pub fn has_joined(&self, role: Role) -> bool {
        self.joined.contains(&role)
    }

    /// Language the customer announced.
    pub fn customer_language(&self) -> Option<&str> {
        self.customer_language.as_deref()
    }

    /// True once someone ended the chat.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Commands routed so far.
    pub fn routed(&self) -> usize {
        self.routed
    }

    /// Translate `text` into `target`.
    pub fn translate(&self, text: &str, target: &str) -> Result<String, String> {
        if self.failing.contains(text) {
            return Err(format!("no translation for {text:?}"));
        }
        Ok(self
            .dictionary
            .get(&(text.to_string(), target.to_string()))
            .cloned()
            .unwrap_or_else(|| format!("[{target}] {text}")))
    }

    /// Route one command sent by `from`.
    pub fn route(&mut self, from: Role, command: OutboundEvent) -> Vec<Delivery> {
        self.routed += 1;
        match command {
            OutboundEvent::JoinRoom(join) => self.join(from, join),
            OutboundEvent::SendMessage(send) => self.relay_message(from, send),
            OutboundEvent::Typing(_) => self.to_counterpart(from, InboundEvent::Typing),
            OutboundEvent::StopTyping(_) => self.to_counterpart(from, InboundEvent::StopTyping),
            OutboundEvent::EndChat(end) => self.end(end),
        }
    }

    /// Move every pending command between attached sockets until none is left.
    ///
    /// Returns the number of commands routed.
    pub fn pump(&mut self) -> usize {
        let mut routed = 0;
        loop {
            let mut pending = Vec::new();
            for role in [Role::Customer, Role::Agent] {
                let Some(remote) = self.remotes.get_mut(&role) else { continue };
                while let Some(command) = remote.try_take() {
                    match command {
                        Ok(command) => pending.push((role, command)),
                        Err(err) => warn!(%role, error = %err, "relay dropped undecodable command"),
                    }
                }
            }
            if pending.is_empty() {
                return routed;
            }

            for (from, command) in pending {
                routed += 1;
                for delivery in self.route(from, command) {
                    self.deliver(&delivery);
                }
            }
        }
    }

    fn deliver(&self, delivery: &Delivery) {
        let Some(remote) = self.remotes.get(&delivery.to) else {
            debug!(to = %delivery.to, "no socket attached, dropping delivery");
            return;
        };
        if let Err(err) = remote.deliver(&delivery.event) {
            warn!(to = %delivery.to, error = %err, "failed to encode delivery");
        }
    }

    fn join(&mut self, from: Role, join: JoinRoom) -> Vec<Delivery> {
        if from == Role::Customer {
            self.customer_language = join.language.clone().or(self.customer_language.take());
        }
        self.joined.insert(from);

        let mut deliveries = vec![Delivery {
            to: from,
            event: InboundEvent::JoinedRoom(JoinedRoom {
                room_id: Some(join.room_id),
                user_type: Some(join.user_type),
            }),
        }];

        let counterpart = from.counterpart();
        if self.joined.contains(&counterpart) {
            let presence = match counterpart {
                Role::Agent => InboundEvent::AgentOnline,
                Role::Customer => InboundEvent::CustomerOnline(CustomerOnline {
                    language: self.customer_language.clone(),
                }),
            };
            deliveries.push(Delivery { to: from, event: presence });
        }
        deliveries
    }

    fn relay_message(&mut self, from: Role, send: SendMessage) -> Vec<Delivery> {
        let (source, target) = match from {
            Role::Customer => (send.language.clone(), BASE_LANGUAGE.to_string()),
            Role::Agent => (
                BASE_LANGUAGE.to_string(),
                self.customer_language
                    .clone()
                    .unwrap_or_else(|| FALLBACK_CUSTOMER_LANGUAGE.to_string()),
            ),
        };

        let translated = match self.translate(&send.text, &target) {
            Ok(translated) => translated,
            Err(detail) => {
                return vec![Delivery {
                    to: from,
                    event: InboundEvent::RelayError(RelayError {
                        message: "Translation failed".into(),
                        detail: Some(detail),
                    }),
                }];
            },
        };

        let message = InboundEvent::NewMessage(NewMessage {
            sender_type: from,
            text: send.text,
            translated_text: Some(translated),
            source_lang: source,
            target_lang: Some(target),
        });

        let mut deliveries = Vec::with_capacity(2);
        if self.joined.contains(&from.counterpart()) {
            deliveries.push(Delivery { to: from.counterpart(), event: message.clone() });
        }
        deliveries.push(Delivery { to: from, event: message });
        deliveries
    }

    fn to_counterpart(&self, from: Role, event: InboundEvent) -> Vec<Delivery> {
        let to = from.counterpart();
        if self.joined.contains(&to) { vec![Delivery { to, event }] } else { Vec::new() }
    }

    fn end(&mut self, end: EndChat) -> Vec<Delivery> {
        self.ended = true;
        let event = InboundEvent::ChatEnded(ChatEnded {
            room_id: Some(end.room_id),
            ended_by: Some(end.ended_by.to_string()),
        });
        [Role::Customer, Role::Agent]
            .into_iter()
            .filter(|role| self.joined.contains(role))
            .map(|to| Delivery { to, event: event.clone() })
            .collect()
    }
}

impl std::fmt::Debug for SimRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRelay")
            .field("joined", &self.joined)
            .field("customer_language", &self.customer_language)
            .field("ended", &self.ended)
            .field("routed", &self.routed)
            .finish_non_exhaustive()
    }
}

/// Room of a relay-side join, for assertions.
pub fn joined_room(delivery: &Delivery) -> Option<&RoomId> {
    match &delivery.event {
        InboundEvent::JoinedRoom(JoinedRoom { room_id, .. }) => room_id.as_ref(),
        _ => None,
    }
}
