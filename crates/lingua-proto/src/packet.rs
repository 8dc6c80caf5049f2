//! Engine.IO v4 / Socket.IO v4 text packet codec.
//!
//! The relay speaks Socket.IO. Over a WebSocket every text frame is one
//! Engine.IO packet; Engine.IO `message` packets wrap one Socket.IO packet.
//!
//! ```text
//! 0{"sid":..,"pingInterval":..}   open
//! 2 / 3                           ping / pong
//! 40 / 40{"sid":..}               namespace connect
//! 41                              namespace disconnect
//! 42["event",{...}]               event
//! 44{"message":..}                connect error
//! ```
//!
//! Only the default namespace is used. A namespace prefix (`/admin,`) and a
//! numeric ack id on incoming events are accepted and ignored. Binary packets
//! are not supported.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, Result};

/// Handshake data carried by the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the server would upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Server ping interval in milliseconds.
    pub ping_interval: u64,
    /// Time the server waits for a pong, in milliseconds.
    pub ping_timeout: u64,
    /// Largest payload the server accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// One decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake.
    Open(OpenInfo),
    /// Engine.IO close.
    Close,
    /// Engine.IO ping (sent by the server in v4).
    Ping,
    /// Engine.IO pong.
    Pong,
    /// Engine.IO upgrade.
    Upgrade,
    /// Engine.IO noop.
    Noop,
    /// Socket.IO namespace connect. The server's reply carries a payload.
    Connect(Option<Value>),
    /// Socket.IO namespace disconnect.
    Disconnect,
    /// Socket.IO event.
    Event {
        /// Event name.
        name: String,
        /// First argument, `Null` when absent.
        data: Value,
    },
    /// Socket.IO namespace connect refused.
    ConnectError(Value),
}

impl Packet {
    /// Build an event packet.
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Self::Event { name: name.into(), data }
    }

    /// Decode one text frame.
    pub fn decode(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let engine = chars.next().ok_or_else(|| malformed("empty frame"))?;
        let rest = chars.as_str();

        match engine {
            '0' => Ok(Self::Open(
                serde_json::from_str(rest).map_err(|e| malformed(&format!("open: {e}")))?,
            )),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => decode_socket(rest),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(malformed(&format!("engine packet type {other:?}"))),
        }
    }

    /// Encode as one text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(match self {
            Self::Open(info) => format!("0{}", serde_json::to_string(info)?),
            Self::Close => "1".into(),
            Self::Ping => "2".into(),
            Self::Pong => "3".into(),
            Self::Upgrade => "5".into(),
            Self::Noop => "6".into(),
            Self::Connect(None) => "40".into(),
            Self::Connect(Some(data)) => format!("40{}", serde_json::to_string(data)?),
            Self::Disconnect => "41".into(),
            Self::Event { name, data } => {
                let args = if data.is_null() {
                    Value::Array(vec![Value::String(name.clone())])
                } else {
                    Value::Array(vec![Value::String(name.clone()), data.clone()])
                };
                format!("42{}", serde_json::to_string(&args)?)
            },
            Self::ConnectError(data) => format!("44{}", serde_json::to_string(data)?),
        })
    }
}

fn decode_socket(body: &str) -> Result<Packet> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or_else(|| malformed("empty socket packet"))?;
    let rest = strip_namespace(chars.as_str());

    match kind {
        '0' => {
            if rest.is_empty() {
                Ok(Packet::Connect(None))
            } else {
                Ok(Packet::Connect(Some(json(rest)?)))
            }
        },
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(rest),
        '4' => Ok(Packet::ConnectError(if rest.is_empty() { Value::Null } else { json(rest)? })),
        '3' | '5' | '6' => Err(ProtocolError::Unsupported(kind)),
        other => Err(malformed(&format!("socket packet type {other:?}"))),
    }
}

fn decode_event(body: &str) -> Result<Packet> {
    // Optional ack id precedes the argument array.
    let args = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let Value::Array(mut args) = json(args)? else {
        return Err(malformed("event arguments are not an array"));
    };
    if args.is_empty() {
        return Err(malformed("event without a name"));
    }
    let Value::String(name) = args.remove(0) else {
        return Err(malformed("event name is not a string"));
    };
    let data = if args.is_empty() { Value::Null } else { args.remove(0) };
    Ok(Packet::Event { name, data })
}

fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    }
}

fn json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| malformed(&e.to_string()))
}

fn malformed(reason: &str) -> ProtocolError {
    ProtocolError::MalformedPacket(reason.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_open() {
        let packet = Packet::decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        let Packet::Open(info) = packet else { panic!("expected open") };
        assert_eq!(info.ping_interval, 25_000);
        assert_eq!(info.ping_timeout, 20_000);
        assert_eq!(info.max_payload, Some(1_000_000));
    }

    #[test]
    fn decode_heartbeat_and_control() {
        assert_eq!(Packet::decode("2").unwrap(), Packet::Ping);
        assert_eq!(Packet::decode("3").unwrap(), Packet::Pong);
        assert_eq!(Packet::decode("6").unwrap(), Packet::Noop);
        assert_eq!(Packet::decode("41").unwrap(), Packet::Disconnect);
    }

    #[test]
    fn decode_connect_reply() {
        let packet = Packet::decode(r#"40{"sid":"abc"}"#).unwrap();
        assert_eq!(packet, Packet::Connect(Some(json!({"sid": "abc"}))));
        assert_eq!(Packet::decode("40").unwrap(), Packet::Connect(None));
    }

    #[test]
    fn decode_event_with_namespace_and_ack() {
        let packet = Packet::decode(r#"42/chat,17["typing",{}]"#).unwrap();
        assert_eq!(packet, Packet::event("typing", json!({})));
    }

    #[test]
    fn decode_event_without_payload() {
        let packet = Packet::decode(r#"42["agent_online"]"#).unwrap();
        assert_eq!(packet, Packet::event("agent_online", Value::Null));
    }

    #[test]
    fn encode_event() {
        let packet = Packet::event("stop_typing", json!({"room_id": "room_1"}));
        assert_eq!(packet.encode().unwrap(), r#"42["stop_typing",{"room_id":"room_1"}]"#);
    }

    #[test]
    fn rejects_binary_and_garbage() {
        assert_eq!(Packet::decode(r#"451-["x",{"_placeholder":true,"num":0}]"#).unwrap_err(), ProtocolError::Unsupported('5'));
        assert!(matches!(Packet::decode(""), Err(ProtocolError::MalformedPacket(_))));
        assert!(matches!(Packet::decode("9"), Err(ProtocolError::MalformedPacket(_))));
        assert!(matches!(Packet::decode("42{}"), Err(ProtocolError::MalformedPacket(_))));
        assert!(matches!(Packet::decode("42[1]"), Err(ProtocolError::MalformedPacket(_))));
    }
}
