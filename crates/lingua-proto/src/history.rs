//! Persisted message records returned by the history endpoint.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};

use crate::role::{Role, RoomId};

/// One persisted chat turn.
///
/// The relay stores the original text with its translation. The server id
/// may arrive as a number or a string, and `created_at` with or without an
/// offset (naive timestamps are UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Server-assigned id.
    #[serde(deserialize_with = "server_id")]
    pub id: String,
    /// Room the record belongs to.
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Role of the author.
    pub sender_type: Role,
    /// Author identity, when recorded.
    #[serde(default)]
    pub sender_id: Option<String>,
    /// Text as typed by the author.
    pub original_text: String,
    /// Translation into the counterpart's language.
    #[serde(default)]
    pub translated_text: Option<String>,
    /// Language of `original_text`.
    pub source_lang: String,
    /// Language of `translated_text`.
    #[serde(default)]
    pub target_lang: Option<String>,
    /// Server-recorded creation time.
    #[serde(deserialize_with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Unsigned(u64),
    Signed(i64),
    Text(String),
}

fn server_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Unsigned(id) => id.to_string(),
        RawId::Signed(id) => id.to_string(),
        RawId::Text(id) => id,
    })
}

fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
}

/// Parse an ISO-8601 timestamp, treating naive values as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|naive| naive.and_utc())
}
