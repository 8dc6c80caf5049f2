//! Role-relative text projection.
//!
//! Every chat turn carries the author's original text and its translation into
//! the counterpart's language. Which of the two a participant reads first
//! depends only on whether they wrote it:
//!
//! | own role | direction | primary         | secondary |
//! |----------|-----------|-----------------|-----------|
//! | customer | sent      | original        | none      |
//! | customer | received  | translation     | original  |
//! | agent    | sent      | original        | none      |
//! | agent    | received  | translation     | original  |
//!
//! This is the only place in the crate where the role changes how text is
//! displayed.

use lingua_proto::Role;

use crate::message::Direction;

/// Display texts for one message as seen by one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// Sent when the viewer authored the message.
    pub direction: Direction,
    /// Text to show first.
    pub primary: String,
    /// Annotation shown when translation display is on.
    pub secondary: Option<String>,
}

/// Project `(original, translated)` for a viewer of role `own`.
///
/// A received message without a translation shows the original as primary
/// text and nothing as secondary.
pub fn project(own: Role, sender: Role, original: &str, translated: Option<&str>) -> Projection {
    let direction = if sender == own { Direction::Sent } else { Direction::Received };

    let (primary, secondary) = match (own, direction) {
        (Role::Customer, Direction::Sent) => (original, None),
        (Role::Customer, Direction::Received) => received(original, translated),
        (Role::Agent, Direction::Sent) => (original, None),
        (Role::Agent, Direction::Received) => received(original, translated),
    };

    Projection {
        direction,
        primary: primary.to_string(),
        secondary: secondary.map(str::to_string),
    }
}

fn received<'a>(original: &'a str, translated: Option<&'a str>) -> (&'a str, Option<&'a str>) {
    match translated {
        Some(translated) => (translated, Some(original)),
        None => (original, None),
    }
}
