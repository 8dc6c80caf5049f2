//! Wire format for the Lingua relay protocol.
//!
//! A customer and an agent talk through a relay that translates every chat
//! turn. The relay speaks Socket.IO: each text frame is an Engine.IO packet,
//! events are `42["name",{payload}]`. This crate owns the event vocabulary
//! and the packet codec, nothing else. No I/O happens here.
//!
//! Event dispatch is closed: inbound events decode into [`InboundEvent`],
//! outbound commands are [`OutboundEvent`]. Wire names and JSON shapes only
//! appear at the decode/encode boundary, so a typo in an event name is a
//! compile error everywhere else.
//!
//! Persisted turns fetched over HTTP decode into [`HistoryRecord`].
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod events;
pub mod history;
pub mod packet;
pub mod role;

pub use errors::{ProtocolError, Result};
pub use events::{
    ChatEnded, CustomerOnline, EndChat, EventKind, InboundEvent, JoinRoom, JoinedRoom,
    NewMessage, OutboundEvent, RelayError, RoomRef, SendMessage, ServerHello,
};
pub use history::HistoryRecord;
pub use packet::{OpenInfo, Packet};
pub use role::{BASE_LANGUAGE, Role, RoomId};
