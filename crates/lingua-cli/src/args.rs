//! Command-line arguments.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use lingua_client::HistoryConfig;
use lingua_core::{ConnectionConfig, SessionConfig};
use lingua_proto::Role;

/// Seat to take in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Write in your own language.
    Customer,
    /// Write in the base language.
    Agent,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Customer => Role::Customer,
            RoleArg::Agent => Role::Agent,
        }
    }
}

/// Join a translated support chat from the terminal.
#[derive(Debug, Clone, Parser)]
#[command(name = "lingua-cli", version, about)]
pub struct Args {
    /// Room to join.
    #[arg(long)]
    pub room: String,

    /// Seat to take.
    #[arg(long, value_enum)]
    pub role: RoleArg,

    /// Customer language. Ignored for agents.
    #[arg(long, default_value = "en")]
    pub language: String,

    /// Agent identity announced on join.
    #[arg(long)]
    pub agent_id: Option<String>,

    /// Relay URL.
    #[arg(long, default_value = "http://localhost:8000")]
    pub endpoint: String,

    /// History API base URL. Defaults to the relay URL.
    #[arg(long)]
    pub api_url: Option<String>,

    /// Do not print the secondary text under messages.
    #[arg(long)]
    pub hide_translation: bool,

    /// Retries after an unintentional disconnect. Zero disables reconnection.
    #[arg(long, default_value_t = 10)]
    pub reconnect_attempts: u32,

    /// Base retry delay.
    #[arg(long, default_value_t = 1_000)]
    pub reconnect_delay_ms: u64,

    /// Retry delay cap.
    #[arg(long, default_value_t = 5_000)]
    pub reconnect_delay_max_ms: u64,

    /// Handshake and history request timeout.
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,
}

impl Args {
    /// Seat as a protocol role.
    pub fn role(&self) -> Role {
        self.role.into()
    }

    /// Transport options.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: self.endpoint.clone(),
            reconnection: self.reconnect_attempts > 0,
            reconnection_attempts: self.reconnect_attempts,
            reconnection_delay: Duration::from_millis(self.reconnect_delay_ms),
            reconnection_delay_max: Duration::from_millis(self.reconnect_delay_max_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// Session options for the chosen seat.
    pub fn session_config(&self) -> SessionConfig {
        match self.role {
            RoleArg::Customer => SessionConfig::customer(self.room.as_str(), self.language.as_str()),
            RoleArg::Agent => SessionConfig::agent(self.room.as_str(), self.agent_id.clone()),
        }
    }

    /// History endpoint options.
    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            api_base: self.api_url.clone().unwrap_or_else(|| self.endpoint.clone()),
            timeout: Duration::from_millis(self.timeout_ms),
            ..HistoryConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("lingua-cli").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_the_relay_client() {
        let args = parse(&["--room", "room_1", "--role", "customer"]);
        assert_eq!(args.connection_config(), ConnectionConfig::default());
        assert_eq!(args.history_config(), HistoryConfig::default());
        assert!(!args.hide_translation);
    }

    #[test]
    fn customer_carries_language() {
        let args = parse(&["--room", "room_1", "--role", "customer", "--language", "vi"]);
        let config = args.session_config();
        assert_eq!(config.role, Role::Customer);
        assert_eq!(config.language.as_deref(), Some("vi"));
    }

    #[test]
    fn agent_carries_id() {
        let args = parse(&["--room", "room_1", "--role", "agent", "--agent-id", "agent_001"]);
        let config = args.session_config();
        assert_eq!(config.role, Role::Agent);
        assert_eq!(config.agent_id.as_deref(), Some("agent_001"));
        assert_eq!(config.language, None);
    }

    #[test]
    fn api_url_overrides_endpoint() {
        let args = parse(&[
            "--room",
            "r",
            "--role",
            "agent",
            "--endpoint",
            "https://relay.example",
            "--api-url",
            "https://api.example",
        ]);
        assert_eq!(args.connection_config().endpoint, "https://relay.example");
        assert_eq!(args.history_config().api_base, "https://api.example");
    }

    #[test]
    fn zero_attempts_disables_reconnection() {
        let args = parse(&["--room", "r", "--role", "agent", "--reconnect-attempts", "0"]);
        assert!(!args.connection_config().reconnection);
    }

    #[test]
    fn role_is_required() {
        assert!(Args::try_parse_from(["lingua-cli", "--room", "r"]).is_err());
        assert!(Args::try_parse_from(["lingua-cli", "--room", "r", "--role", "admin"]).is_err());
    }
}
