//! Normalized chat messages.

use std::fmt;

use chrono::{DateTime, Utc};
use lingua_proto::{HistoryRecord, NewMessage, Role};
use serde::{Deserialize, Serialize};

use crate::projection::project;

/// Message id, unique within one session.
///
/// Live messages get `live-<unix-millis>-<hex>`, hydrated ones
/// `hist-<server id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Id for a message received live.
    pub fn live(unix_millis: i64, suffix: &str) -> Self {
        Self(format!("live-{unix_millis}-{suffix}"))
    }

    /// Id for a hydrated history record.
    pub fn history(server_id: &str) -> Self {
        Self(format!("hist-{server_id}"))
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who wrote a message, relative to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Written by this session's role.
    Sent,
    /// Written by the counterpart.
    Received,
}

/// Delivery progress of a self-authored message.
///
/// The relay echo is the only acknowledgment, so sessions only ever record
/// [`DeliveryStatus::Sent`]. The other states are reserved for front ends that
/// show a message optimistically before the echo arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Handed to the transport.
    Sending,
    /// Relayed back by the server.
    Sent,
    /// Seen by the counterpart.
    Delivered,
    /// Failed.
    Error,
}

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    /// Relayed while the session was active.
    Live,
    /// Fetched from the history endpoint.
    History,
}

/// One chat turn, projected for this session's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the session.
    pub id: MessageId,
    /// Derived from the sender role; never changes.
    pub direction: Direction,
    /// Role of the author.
    pub sender: Role,
    /// Text to show first.
    pub primary_text: String,
    /// Original text of a received message.
    pub secondary_text: Option<String>,
    /// Language of the original text.
    pub source_lang: String,
    /// Language of the translation.
    pub target_lang: Option<String>,
    /// Receipt time for live messages, server time for history.
    pub created_at: DateTime<Utc>,
    /// Only set on self-authored messages.
    pub delivery_status: Option<DeliveryStatus>,
    /// Live or hydrated.
    pub origin: MessageOrigin,
}

impl Message {
    /// Build a message from a relayed chat turn.
    pub fn from_live(
        id: MessageId,
        own: Role,
        event: &NewMessage,
        received_at: DateTime<Utc>,
    ) -> Self {
        let projection = project(own, event.sender_type, &event.text, event.translated_text.as_deref());
        Self {
            id,
            delivery_status: status_for(projection.direction),
            direction: projection.direction,
            sender: event.sender_type,
            primary_text: projection.primary,
            secondary_text: projection.secondary,
            source_lang: event.source_lang.clone(),
            target_lang: event.target_lang.clone(),
            created_at: received_at,
            origin: MessageOrigin::Live,
        }
    }

    /// Build a message from a persisted record.
    pub fn from_history(own: Role, record: &HistoryRecord) -> Self {
        let projection = project(
            own,
            record.sender_type,
            &record.original_text,
            record.translated_text.as_deref(),
        );
        Self {
            id: MessageId::history(&record.id),
            delivery_status: status_for(projection.direction),
            direction: projection.direction,
            sender: record.sender_type,
            primary_text: projection.primary,
            secondary_text: projection.secondary,
            source_lang: record.source_lang.clone(),
            target_lang: record.target_lang.clone(),
            created_at: record.created_at,
            origin: MessageOrigin::History,
        }
    }

    /// True when this session authored the message.
    pub fn is_sent(&self) -> bool {
        self.direction == Direction::Sent
    }

    /// Secondary text, if translation display is enabled.
    pub fn display_secondary(&self, show_translation: bool) -> Option<&str> {
        if show_translation { self.secondary_text.as_deref() } else { None }
    }
}

fn status_for(direction: Direction) -> Option<DeliveryStatus> {
    match direction {
        Direction::Sent => Some(DeliveryStatus::Sent),
        Direction::Received => None,
    }
}
