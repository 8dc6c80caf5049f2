//! Relay events and their payloads.
//!
//! Every event the relay understands is a variant of a closed enum:
//! [`InboundEvent`] for relay → client, [`OutboundEvent`] for client → relay.
//! Payloads are strongly typed; the wire name and JSON shape only appear in
//! [`InboundEvent::decode`] and [`OutboundEvent::payload`].

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    errors::{ProtocolError, Result},
    role::{Role, RoomId},
};

/// Kinds of inbound events. Used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// `connected`
    ServerHello,
    /// `joined_room`
    JoinedRoom,
    /// `new_message`
    NewMessage,
    /// `typing`
    Typing,
    /// `stop_typing`
    StopTyping,
    /// `agent_online`
    AgentOnline,
    /// `customer_online`
    CustomerOnline,
    /// `chat_ended`
    ChatEnded,
    /// `error`
    RelayError,
}

impl EventKind {
    /// Every inbound kind.
    pub const ALL: [Self; 9] = [
        Self::ServerHello,
        Self::JoinedRoom,
        Self::NewMessage,
        Self::Typing,
        Self::StopTyping,
        Self::AgentOnline,
        Self::CustomerOnline,
        Self::ChatEnded,
        Self::RelayError,
    ];

    /// Event name on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Self::ServerHello => "connected",
            Self::JoinedRoom => "joined_room",
            Self::NewMessage => "new_message",
            Self::Typing => "typing",
            Self::StopTyping => "stop_typing",
            Self::AgentOnline => "agent_online",
            Self::CustomerOnline => "customer_online",
            Self::ChatEnded => "chat_ended",
            Self::RelayError => "error",
        }
    }

    /// Look up a kind by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Presence event a session of `role` waits for.
    pub fn presence_for(role: Role) -> Self {
        match role {
            Role::Customer => Self::AgentOnline,
            Role::Agent => Self::CustomerOnline,
        }
    }
}

/// Server greeting sent right after the socket connects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    /// Socket id assigned by the relay.
    #[serde(default)]
    pub sid: Option<String>,
}

/// Acknowledgement of `join_room`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedRoom {
    /// Room that was joined.
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Role the relay registered us under.
    #[serde(default)]
    pub user_type: Option<Role>,
}

/// A chat turn relayed with its translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Role of the author.
    pub sender_type: Role,
    /// Original text, in the author's language.
    pub text: String,
    /// Text translated into the counterpart's language.
    #[serde(default)]
    pub translated_text: Option<String>,
    /// Language of `text`.
    pub source_lang: String,
    /// Language of `translated_text`.
    #[serde(default)]
    pub target_lang: Option<String>,
}

/// Counterpart customer joined the room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerOnline {
    /// Customer's working language.
    #[serde(default)]
    pub language: Option<String>,
}

/// The conversation was closed by one of the participants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEnded {
    /// Room that ended.
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Who ended it. The relay sends `user` when unknown.
    #[serde(default)]
    pub ended_by: Option<String>,
}

impl ChatEnded {
    /// `ended_by` as a role, if it names one.
    pub fn ended_by_role(&self) -> Option<Role> {
        match self.ended_by.as_deref() {
            Some("customer") => Some(Role::Customer),
            Some("agent") => Some(Role::Agent),
            _ => None,
        }
    }
}

/// Relay-side failure (session missing, translation failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayError {
    /// Human readable message.
    pub message: String,
    /// Optional detail.
    #[serde(default)]
    pub detail: Option<String>,
}

/// Event received from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Server greeting.
    ServerHello(ServerHello),
    /// Join acknowledgement.
    JoinedRoom(JoinedRoom),
    /// Relayed chat turn.
    NewMessage(NewMessage),
    /// Counterpart started typing.
    Typing,
    /// Counterpart stopped typing.
    StopTyping,
    /// An agent is in the room.
    AgentOnline,
    /// A customer is in the room.
    CustomerOnline(CustomerOnline),
    /// Conversation closed.
    ChatEnded(ChatEnded),
    /// Relay-side failure.
    RelayError(RelayError),
}

impl InboundEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ServerHello(_) => EventKind::ServerHello,
            Self::JoinedRoom(_) => EventKind::JoinedRoom,
            Self::NewMessage(_) => EventKind::NewMessage,
            Self::Typing => EventKind::Typing,
            Self::StopTyping => EventKind::StopTyping,
            Self::AgentOnline => EventKind::AgentOnline,
            Self::CustomerOnline(_) => EventKind::CustomerOnline,
            Self::ChatEnded(_) => EventKind::ChatEnded,
            Self::RelayError(_) => EventKind::RelayError,
        }
    }

    /// Decode an event from its wire name and JSON payload.
    ///
    /// An absent or `null` payload is treated as `{}`. Unknown payload fields
    /// are ignored.
    pub fn decode(name: &str, data: Value) -> Result<Self> {
        let kind =
            EventKind::from_name(name).ok_or_else(|| ProtocolError::UnknownEvent(name.into()))?;
        let data = normalize(data);

        Ok(match kind {
            EventKind::ServerHello => Self::ServerHello(parse(name, data)?),
            EventKind::JoinedRoom => Self::JoinedRoom(parse(name, data)?),
            EventKind::NewMessage => Self::NewMessage(parse(name, data)?),
            EventKind::Typing => Self::Typing,
            EventKind::StopTyping => Self::StopTyping,
            EventKind::AgentOnline => Self::AgentOnline,
            EventKind::CustomerOnline => Self::CustomerOnline(parse(name, data)?),
            EventKind::ChatEnded => Self::ChatEnded(parse(name, data)?),
            EventKind::RelayError => Self::RelayError(parse(name, data)?),
        })
    }

    /// Encode the JSON payload. Signal-only events encode as `{}`.
    pub fn payload(&self) -> Result<Value> {
        Ok(match self {
            Self::ServerHello(p) => serde_json::to_value(p)?,
            Self::JoinedRoom(p) => serde_json::to_value(p)?,
            Self::NewMessage(p) => serde_json::to_value(p)?,
            Self::Typing | Self::StopTyping | Self::AgentOnline => Value::Object(Map::new()),
            Self::CustomerOnline(p) => serde_json::to_value(p)?,
            Self::ChatEnded(p) => serde_json::to_value(p)?,
            Self::RelayError(p) => serde_json::to_value(p)?,
        })
    }
}

/// Payload of `join_room`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoom {
    /// Room to enter.
    pub room_id: RoomId,
    /// Role of the joining participant.
    pub user_type: Role,
    /// Working language (customers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Agent identity (agents).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// Payload of `send_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Target room.
    pub room_id: RoomId,
    /// Text as typed.
    pub text: String,
    /// Language the text is written in.
    pub language: String,
}

/// Payload that only names a room (`typing`, `stop_typing`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRef {
    /// Target room.
    pub room_id: RoomId,
}

/// Payload of `end_chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndChat {
    /// Room to close.
    pub room_id: RoomId,
    /// Role closing the conversation.
    pub ended_by: Role,
}

/// Command sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Enter a room.
    JoinRoom(JoinRoom),
    /// Send a chat turn.
    SendMessage(SendMessage),
    /// We are typing.
    Typing(RoomRef),
    /// We stopped typing.
    StopTyping(RoomRef),
    /// Close the conversation.
    EndChat(EndChat),
}

impl OutboundEvent {
    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join_room",
            Self::SendMessage(_) => "send_message",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stop_typing",
            Self::EndChat(_) => "end_chat",
        }
    }

    /// Room this command targets.
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::JoinRoom(p) => &p.room_id,
            Self::SendMessage(p) => &p.room_id,
            Self::Typing(p) | Self::StopTyping(p) => &p.room_id,
            Self::EndChat(p) => &p.room_id,
        }
    }

    /// Encode the JSON payload.
    pub fn payload(&self) -> Result<Value> {
        Ok(match self {
            Self::JoinRoom(p) => serde_json::to_value(p)?,
            Self::SendMessage(p) => serde_json::to_value(p)?,
            Self::Typing(p) | Self::StopTyping(p) => serde_json::to_value(p)?,
            Self::EndChat(p) => serde_json::to_value(p)?,
        })
    }

    /// Decode a command from its wire name and payload (relay side).
    pub fn decode(name: &str, data: Value) -> Result<Self> {
        let data = normalize(data);
        Ok(match name {
            "join_room" => Self::JoinRoom(parse(name, data)?),
            "send_message" => Self::SendMessage(parse(name, data)?),
            "typing" => Self::Typing(parse(name, data)?),
            "stop_typing" => Self::StopTyping(parse(name, data)?),
            "end_chat" => Self::EndChat(parse(name, data)?),
            other => return Err(ProtocolError::UnknownEvent(other.into())),
        })
    }
}

fn normalize(data: Value) -> Value {
    if data.is_null() { Value::Object(Map::new()) } else { data }
}

fn parse<T: DeserializeOwned>(event: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn kinds_round_trip_through_names() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(EventKind::from_name("agent_receive_message"), None);
    }

    #[test]
    fn presence_kind_depends_on_role() {
        assert_eq!(EventKind::presence_for(Role::Customer), EventKind::AgentOnline);
        assert_eq!(EventKind::presence_for(Role::Agent), EventKind::CustomerOnline);
    }

    #[test]
    fn decode_new_message() {
        let event = InboundEvent::decode(
            "new_message",
            json!({
                "sender_type": "customer",
                "text": "Hello",
                "translated_text": "안녕하세요",
                "source_lang": "vi",
                "target_lang": "ko",
            }),
        )
        .unwrap();

        let InboundEvent::NewMessage(msg) = event else {
            panic!("expected NewMessage, got {event:?}");
        };
        assert_eq!(msg.sender_type, Role::Customer);
        assert_eq!(msg.translated_text.as_deref(), Some("안녕하세요"));
    }

    #[test]
    fn null_payload_is_empty_object() {
        assert_eq!(InboundEvent::decode("typing", Value::Null).unwrap(), InboundEvent::Typing);
        assert_eq!(
            InboundEvent::decode("customer_online", Value::Null).unwrap(),
            InboundEvent::CustomerOnline(CustomerOnline::default())
        );
    }

    #[test]
    fn unknown_event_is_rejected() {
        let err = InboundEvent::decode("message_sent", json!({})).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownEvent("message_sent".into()));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let err = InboundEvent::decode("new_message", json!({"text": 3})).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { event, .. } if event == "new_message"));
    }

    #[test]
    fn ended_by_user_is_not_a_role() {
        let ended = ChatEnded { room_id: None, ended_by: Some("user".into()) };
        assert_eq!(ended.ended_by_role(), None);
        let ended = ChatEnded { room_id: None, ended_by: Some("agent".into()) };
        assert_eq!(ended.ended_by_role(), Some(Role::Agent));
    }

    #[test]
    fn join_room_omits_absent_fields() {
        let join = OutboundEvent::JoinRoom(JoinRoom {
            room_id: "room_1".into(),
            user_type: Role::Agent,
            language: None,
            agent_id: Some("agent_7".into()),
        });
        let payload = join.payload().unwrap();
        assert_eq!(payload, json!({"room_id": "room_1", "user_type": "agent", "agent_id": "agent_7"}));
        assert_eq!(OutboundEvent::decode(join.name(), payload).unwrap(), join);
    }
}
