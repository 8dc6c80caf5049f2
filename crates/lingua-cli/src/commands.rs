//! Command parsing for the terminal client.
//!
//! Lines starting with `/` are commands. Anything else is a chat message.

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line.
    Empty,

    /// Send a chat message.
    Message {
        /// Message text.
        content: String,
    },

    /// Tell the counterpart we are typing.
    Typing,

    /// Tell the counterpart we stopped typing.
    StopTyping,

    /// Close the conversation.
    EndChat,

    /// Show or hide the secondary text under messages.
    ToggleTranslation,

    /// Print connection and room status.
    Status,

    /// Leave the room and exit.
    Quit,

    /// Unknown command.
    Unknown {
        /// The original input.
        input: String,
    },

    /// Command with arguments it does not take.
    InvalidArgs {
        /// Command name.
        command: String,
        /// Error message.
        error: String,
    },
}

/// Parse a line of input.
pub fn parse(input: &str) -> Command {
    let input = input.trim();

    if input.is_empty() {
        return Command::Empty;
    }

    let Some(cmd_str) = input.strip_prefix('/') else {
        return Command::Message { content: input.to_string() };
    };

    let parts: Vec<&str> = cmd_str.split_whitespace().collect();
    let command = parts.first().copied().unwrap_or("");

    let parsed = match command {
        "typing" => Command::Typing,
        "stop" => Command::StopTyping,
        "end" => Command::EndChat,
        "translation" => Command::ToggleTranslation,
        "status" => Command::Status,
        "quit" | "q" => Command::Quit,
        _ => return Command::Unknown { input: input.to_string() },
    };

    if parts.len() > 1 {
        return Command::InvalidArgs {
            command: command.to_string(),
            error: format!("Usage: /{command}"),
        };
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_message() {
        assert_eq!(parse("Xin chào"), Command::Message { content: "Xin chào".into() });
    }

    #[test]
    fn parse_message_is_trimmed() {
        assert_eq!(parse("  Hello  \n"), Command::Message { content: "Hello".into() });
    }

    #[test]
    fn parse_empty() {
        assert_eq!(parse(""), Command::Empty);
        assert_eq!(parse("   "), Command::Empty);
    }

    #[test]
    fn parse_typing() {
        assert_eq!(parse("/typing"), Command::Typing);
        assert_eq!(parse("/stop"), Command::StopTyping);
    }

    #[test]
    fn parse_end() {
        assert_eq!(parse("/end"), Command::EndChat);
    }

    #[test]
    fn parse_translation_toggle() {
        assert_eq!(parse("/translation"), Command::ToggleTranslation);
    }

    #[test]
    fn parse_status() {
        assert_eq!(parse("/status"), Command::Status);
    }

    #[test]
    fn parse_quit() {
        assert_eq!(parse("/quit"), Command::Quit);
        assert_eq!(parse("/q"), Command::Quit);
    }

    #[test]
    fn parse_extra_arguments() {
        assert!(matches!(parse("/end now"), Command::InvalidArgs { command, .. } if command == "end"));
    }

    #[test]
    fn parse_unknown_command() {
        assert_eq!(parse("/join 42"), Command::Unknown { input: "/join 42".into() });
        assert!(matches!(parse("/"), Command::Unknown { .. }));
    }
}
