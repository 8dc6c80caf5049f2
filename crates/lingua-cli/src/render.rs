//! Line-oriented rendering of session snapshots.
//!
//! The renderer remembers what it already printed and only writes the
//! difference for each new [`SessionView`]. When the log changes under it
//! (hydration put history in front of live messages) the whole log is
//! printed again.

use std::io::{self, Write};

use lingua_client::SessionView;
use lingua_core::{ConnectionState, Message, MessageId};
use lingua_proto::Role;

/// Prints what changed between snapshots.
#[derive(Debug)]
pub struct Renderer {
    own: Role,
    show_translation: bool,
    rendered: Vec<MessageId>,
    connection: Option<(ConnectionState, u32)>,
    online: bool,
    typing: bool,
    ended: bool,
    closed: bool,
}

impl Renderer {
    /// Renderer for a session seated as `own`.
    pub fn new(own: Role, show_translation: bool) -> Self {
        Self {
            own,
            show_translation,
            rendered: Vec::new(),
            connection: None,
            online: false,
            typing: false,
            ended: false,
            closed: false,
        }
    }

    /// Whether secondary text is printed.
    pub fn show_translation(&self) -> bool {
        self.show_translation
    }

    /// Flip secondary text display and print the log again.
    pub fn toggle_translation(&mut self, view: &SessionView, out: &mut impl Write) -> io::Result<()> {
        self.show_translation = !self.show_translation;
        let state = if self.show_translation { "on" } else { "off" };
        writeln!(out, "-- translation {state} --")?;
        self.rendered.clear();
        self.render_messages(view, out)
    }

    /// Print everything that changed since the last call.
    pub fn render(&mut self, view: &SessionView, out: &mut impl Write) -> io::Result<()> {
        self.render_connection(view, out)?;

        let counterpart = self.own.counterpart();
        if view.counterpart_online && !self.online {
            self.online = true;
            match &view.counterpart_language {
                Some(lang) => writeln!(out, "-- {counterpart} is online ({lang}) --")?,
                None => writeln!(out, "-- {counterpart} is online --")?,
            }
        }

        self.render_messages(view, out)?;

        if view.counterpart_typing != self.typing {
            self.typing = view.counterpart_typing;
            if self.typing {
                writeln!(out, "-- {counterpart} is typing... --")?;
            } else {
                writeln!(out, "-- {counterpart} stopped typing --")?;
            }
        }

        if view.ended && !self.ended {
            self.ended = true;
            match &view.ended_by {
                Some(by) => writeln!(out, "-- chat ended by {by} --")?,
                None => writeln!(out, "-- chat ended --")?,
            }
        }

        if view.closed && !self.closed {
            self.closed = true;
            writeln!(out, "-- session closed --")?;
        }
        Ok(())
    }

    /// One-line summary for `/status`.
    pub fn status(&self, view: &SessionView, out: &mut impl Write) -> io::Result<()> {
        let joined = if view.joined { "joined" } else { "not joined" };
        let translation = if self.show_translation { "on" } else { "off" };
        writeln!(
            out,
            "status: {}, {joined}, {} messages, translation {translation}",
            connection_label(view.connection, view.reconnect_attempt),
            view.messages.len(),
        )
    }

    fn render_connection(&mut self, view: &SessionView, out: &mut impl Write) -> io::Result<()> {
        let current = (view.connection, view.reconnect_attempt);
        if self.connection == Some(current) {
            return Ok(());
        }
        let first = self.connection.is_none();
        self.connection = Some(current);

        if first && view.connection == ConnectionState::Disconnected {
            writeln!(out, "-- connecting --")
        } else {
            writeln!(out, "-- {} --", connection_label(view.connection, view.reconnect_attempt))
        }
    }

    fn render_messages(&mut self, view: &SessionView, out: &mut impl Write) -> io::Result<()> {
        let unchanged = view.messages.len() >= self.rendered.len()
            && view.messages.iter().zip(&self.rendered).all(|(m, id)| m.id == *id);

        let start = if unchanged {
            self.rendered.len()
        } else {
            writeln!(out, "-- conversation reloaded --")?;
            self.rendered.clear();
            0
        };

        for message in &view.messages[start..] {
            write_message(message, self.show_translation, out)?;
            self.rendered.push(message.id.clone());
        }
        Ok(())
    }
}

fn connection_label(state: ConnectionState, attempt: u32) -> String {
    match state {
        ConnectionState::Reconnecting if attempt > 0 => format!("reconnecting (attempt {attempt})"),
        other => other.to_string(),
    }
}

fn write_message(message: &Message, show_translation: bool, out: &mut impl Write) -> io::Result<()> {
    let time = message.created_at.format("%H:%M");
    let who = if message.is_sent() { "you" } else { message.sender.as_str() };
    writeln!(out, "[{time}] {who}: {}", message.primary_text)?;
    if let Some(secondary) = message.display_secondary(show_translation) {
        writeln!(out, "        ({secondary})")?;
    }
    Ok(())
}
