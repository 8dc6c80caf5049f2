//! Reusable oracles.

use std::collections::HashSet;

use lingua_core::{Direction, Message};
use lingua_proto::Role;

use crate::scenario::{OracleFn, World};

/// Run every oracle; the first failure wins.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| oracles.iter().try_for_each(|oracle| oracle(world)))
}

/// Every seated session has its join acknowledged.
pub fn all_joined() -> OracleFn {
    Box::new(|world| {
        for role in world.roles() {
            let session = world.session(role).ok_or_else(|| format!("{role} missing"))?;
            if !session.is_joined() {
                return Err(format!("{role} is not joined"));
            }
        }
        Ok(())
    })
}

/// Message ids are unique within each session.
pub fn ids_unique() -> OracleFn {
    Box::new(|world| {
        for role in world.roles() {
            let messages = messages(world, role)?;
            let mut seen = HashSet::new();
            if let Some(dup) = messages.iter().find(|m| !seen.insert(m.id.clone())) {
                return Err(format!("{role} has duplicate message id {}", dup.id));
            }
        }
        Ok(())
    })
}

/// A participant's own messages never carry a secondary text, and a
/// received message with a translation shows the original underneath.
pub fn projection_holds() -> OracleFn {
    Box::new(|world| {
        for role in world.roles() {
            for message in messages(world, role)? {
                match message.direction {
                    Direction::Sent if message.secondary_text.is_some() => {
                        return Err(format!("{role}: own message {} has secondary text", message.id));
                    },
                    Direction::Sent if message.sender != role => {
                        return Err(format!("{role}: message {} marked sent by {}", message.id, message.sender));
                    },
                    Direction::Received if message.sender == role => {
                        return Err(format!("{role}: own message {} marked received", message.id));
                    },
                    _ => {},
                }
            }
        }
        Ok(())
    })
}

/// `role`'s newest message reads `primary` over `secondary`.
pub fn last_message(role: Role, direction: Direction, primary: &str, secondary: Option<&str>) -> OracleFn {
    let primary = primary.to_string();
    let secondary = secondary.map(str::to_string);
    Box::new(move |world| {
        let last = messages(world, role)?.last().ok_or_else(|| format!("{role} has no messages"))?;
        if last.direction != direction {
            return Err(format!("{role}: expected {direction:?}, got {:?}", last.direction));
        }
        if last.primary_text != primary {
            return Err(format!("{role}: expected primary {primary:?}, got {:?}", last.primary_text));
        }
        if last.secondary_text != secondary {
            return Err(format!(
                "{role}: expected secondary {secondary:?}, got {:?}",
                last.secondary_text
            ));
        }
        Ok(())
    })
}

/// `role` sees its counterpart typing exactly when `typing`.
pub fn counterpart_typing(role: Role, typing: bool) -> OracleFn {
    Box::new(move |world| {
        let session = world.session(role).ok_or_else(|| format!("{role} missing"))?;
        if session.counterpart_typing() == typing {
            Ok(())
        } else {
            Err(format!("{role}: expected typing={typing}, got {}", session.counterpart_typing()))
        }
    })
}

/// Both sessions hold `count` messages.
pub fn message_count(count: usize) -> OracleFn {
    Box::new(move |world| {
        for role in world.roles() {
            let actual = messages(world, role)?.len();
            if actual != count {
                return Err(format!("{role}: expected {count} messages, got {actual}"));
            }
        }
        Ok(())
    })
}

fn messages(world: &World, role: Role) -> Result<&[Message], String> {
    world.session(role).map(|s| s.messages()).ok_or_else(|| format!("{role} missing"))
}
