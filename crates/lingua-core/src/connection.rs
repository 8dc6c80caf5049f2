//! Connection-state tracker.
//!
//! Turns the transport's raw lifecycle signals into a small, stable state the
//! session layer and the UI can read.
//!
//! # Architecture: Action-Based State Machine
//!
//! - [`Connection::handle_signal`] takes one [`TransportSignal`]
//! - it returns the [`ConnectionAction`]s describing what changed
//! - the caller forwards them (to the session, to the view)
//!
//! The tracker never retries anything itself. Retry timing belongs to the
//! transport; this type only records where the transport is.
//!
//! # State Machine
//!
//! ```text
//!                 connect / reconnect
//!   ┌──────────────┐ ─────────────────> ┌───────────┐
//!   │ Disconnected │                     │ Connected │
//!   └──────────────┘ <───────────────── └───────────┘
//!        ^   ^      intentional disconnect    │
//!        │   │                                │ other disconnect
//!        │   │      reconnect   ┌──────────────┐
//!        │   └──── failed ───── │ Reconnecting │ <┘
//!        │                      └──────────────┘
//!        └── connect_error        │   ^  reconnect_attempt(n)
//!                                 └───┘
//! ```
//!
//! After `reconnect_failed` the tracker is exhausted and ignores every
//! further signal. Recovery means building a new connection.

use std::{fmt, time::Duration};

use tracing::{debug, info, trace, warn};

use crate::error::ConfigError;

/// Connection state visible to the layer above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No usable connection.
    #[default]
    Disconnected,
    /// Socket is up.
    Connected,
    /// Transport lost the socket and is retrying.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        })
    }
}

/// Why the socket went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the socket on purpose.
    ServerDisconnect,
    /// We closed the socket on purpose.
    ClientDisconnect,
    /// The server stopped answering heartbeats.
    PingTimeout,
    /// The underlying connection closed.
    TransportClose,
    /// The underlying connection failed.
    TransportError,
    /// The server sent a packet we could not parse.
    ParseError,
    /// Any other reason text.
    Other(String),
}

impl DisconnectReason {
    /// Intentional closes never trigger reconnection.
    pub fn is_intentional(&self) -> bool {
        matches!(self, Self::ServerDisconnect | Self::ClientDisconnect)
    }

    /// Reason text as the transport reports it.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServerDisconnect => "io server disconnect",
            Self::ClientDisconnect => "io client disconnect",
            Self::PingTimeout => "ping timeout",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
            Self::ParseError => "parse error",
            Self::Other(reason) => reason,
        }
    }
}

impl From<&str> for DisconnectReason {
    fn from(reason: &str) -> Self {
        match reason {
            "io server disconnect" => Self::ServerDisconnect,
            "io client disconnect" => Self::ClientDisconnect,
            "ping timeout" => Self::PingTimeout,
            "transport close" => Self::TransportClose,
            "transport error" => Self::TransportError,
            "parse error" => Self::ParseError,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle signal reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// Initial connection established.
    Connect,
    /// Socket lost.
    Disconnect(DisconnectReason),
    /// Retry number `n` (1-based) is starting.
    ReconnectAttempt(u32),
    /// Reconnected after `n` attempts.
    Reconnect(u32),
    /// One retry failed; more may follow.
    ReconnectError(String),
    /// Retry budget exhausted.
    ReconnectFailed,
    /// Initial handshake failed.
    ConnectError(String),
    /// Transport-level fault that does not change the state.
    Error(String),
}

/// Connection options, passed through to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Relay URL (`http(s)://` or `ws(s)://`).
    pub endpoint: String,
    /// Retry after unintentional disconnects.
    pub reconnection: bool,
    /// Retries before giving up.
    pub reconnection_attempts: u32,
    /// Base retry delay.
    pub reconnection_delay: Duration,
    /// Retry delay cap.
    pub reconnection_delay_max: Duration,
    /// Handshake timeout.
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            reconnection: true,
            reconnection_attempts: 10,
            reconnection_delay: Duration::from_secs(1),
            reconnection_delay_max: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    /// Check the options are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if !["http://", "https://", "ws://", "wss://"].iter().any(|s| endpoint.starts_with(s)) {
            return Err(ConfigError::InvalidEndpoint(endpoint.to_string()));
        }
        if self.reconnection_delay > self.reconnection_delay_max {
            return Err(ConfigError::InvalidDelay {
                min_ms: self.reconnection_delay.as_millis() as u64,
                max_ms: self.reconnection_delay_max.as_millis() as u64,
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// What changed after a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    /// State transition.
    StateChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// Reconnect attempt counter changed.
    AttemptChanged(u32),
}

/// Connection-state tracker.
///
/// Pure state machine: no I/O, no timers.
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    reconnect_attempt: u32,
    reconnection: bool,
    exhausted: bool,
}

impl Connection {
    /// Create a tracker in `Disconnected`.
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_attempt: 0,
            reconnection: config.reconnection,
            exhausted: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while the socket is up.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// True while the transport is retrying.
    pub fn is_reconnecting(&self) -> bool {
        self.state == ConnectionState::Reconnecting
    }

    /// Current retry number, 0 when connected.
    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// True once the retry budget ran out.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Apply one transport signal.
    pub fn handle_signal(&mut self, signal: TransportSignal) -> Vec<ConnectionAction> {
        if self.exhausted {
            debug!(?signal, "connection exhausted, ignoring signal");
            return Vec::new();
        }

        let mut actions = Vec::new();
        match signal {
            TransportSignal::Connect | TransportSignal::Reconnect(_) => {
                self.transition(ConnectionState::Connected, &mut actions);
                self.set_attempt(0, &mut actions);
            },
            TransportSignal::Disconnect(reason) => {
                let to = if reason.is_intentional() || !self.reconnection {
                    ConnectionState::Disconnected
                } else {
                    ConnectionState::Reconnecting
                };
                info!(%reason, next = %to, "disconnected");
                self.transition(to, &mut actions);
            },
            TransportSignal::ReconnectAttempt(attempt) => {
                debug!(attempt, "reconnect attempt");
                self.transition(ConnectionState::Reconnecting, &mut actions);
                self.set_attempt(attempt, &mut actions);
            },
            TransportSignal::ReconnectError(err) => {
                warn!(attempt = self.reconnect_attempt, error = %err, "reconnect attempt failed");
            },
            TransportSignal::ReconnectFailed => {
                warn!(attempts = self.reconnect_attempt, "reconnection gave up");
                self.transition(ConnectionState::Disconnected, &mut actions);
                self.exhausted = true;
            },
            TransportSignal::ConnectError(err) => {
                warn!(error = %err, "connect error");
                self.transition(ConnectionState::Disconnected, &mut actions);
            },
            TransportSignal::Error(err) => {
                warn!(error = %err, "transport error");
            },
        }
        actions
    }

    fn transition(&mut self, to: ConnectionState, actions: &mut Vec<ConnectionAction>) {
        if self.state == to {
            trace!(state = %to, "state unchanged");
            return;
        }
        let from = std::mem::replace(&mut self.state, to);
        actions.push(ConnectionAction::StateChanged { from, to });
    }

    fn set_attempt(&mut self, attempt: u32, actions: &mut Vec<ConnectionAction>) {
        if self.reconnect_attempt != attempt {
            self.reconnect_attempt = attempt;
            actions.push(ConnectionAction::AttemptChanged(attempt));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> Connection {
        let mut conn = Connection::new(&ConnectionConfig::default());
        conn.handle_signal(TransportSignal::Connect);
        conn
    }

    #[test]
    fn connect_from_disconnected() {
        let mut conn = Connection::new(&ConnectionConfig::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let actions = conn.handle_signal(TransportSignal::Connect);
        assert_eq!(
            actions,
            vec![ConnectionAction::StateChanged {
                from: ConnectionState::Disconnected,
                to: ConnectionState::Connected
            }]
        );
        assert!(conn.is_connected());
        assert_eq!(conn.reconnect_attempt(), 0);
    }

    #[test]
    fn reconnect_cycle_resets_attempt() {
        let mut conn = connected();

        conn.handle_signal(TransportSignal::Disconnect(DisconnectReason::PingTimeout));
        assert!(conn.is_reconnecting());

        conn.handle_signal(TransportSignal::ReconnectAttempt(1));
        let actions = conn.handle_signal(TransportSignal::ReconnectAttempt(2));
        assert_eq!(actions, vec![ConnectionAction::AttemptChanged(2)]);
        assert_eq!(conn.reconnect_attempt(), 2);

        let actions = conn.handle_signal(TransportSignal::Reconnect(2));
        assert!(conn.is_connected());
        assert_eq!(conn.reconnect_attempt(), 0);
        assert!(actions.contains(&ConnectionAction::AttemptChanged(0)));
    }

    #[test]
    fn intentional_disconnect_does_not_reconnect() {
        for reason in [DisconnectReason::ServerDisconnect, DisconnectReason::ClientDisconnect] {
            let mut conn = connected();
            conn.handle_signal(TransportSignal::Disconnect(reason));
            assert_eq!(conn.state(), ConnectionState::Disconnected);
        }
    }

    #[test]
    fn reconnection_disabled() {
        let config = ConnectionConfig { reconnection: false, ..Default::default() };
        let mut conn = Connection::new(&config);
        conn.handle_signal(TransportSignal::Connect);
        conn.handle_signal(TransportSignal::Disconnect(DisconnectReason::TransportClose));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn reconnect_failed_is_terminal() {
        let mut conn = connected();
        conn.handle_signal(TransportSignal::Disconnect(DisconnectReason::TransportError));
        conn.handle_signal(TransportSignal::ReconnectAttempt(10));
        conn.handle_signal(TransportSignal::ReconnectFailed);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.is_exhausted());

        assert!(conn.handle_signal(TransportSignal::Connect).is_empty());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_error_and_plain_errors() {
        let mut conn = Connection::new(&ConnectionConfig::default());
        assert!(conn.handle_signal(TransportSignal::Error("boom".into())).is_empty());
        assert!(conn.handle_signal(TransportSignal::ReconnectError("refused".into())).is_empty());

        let mut conn = connected();
        conn.handle_signal(TransportSignal::ConnectError("handshake timeout".into()));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.is_exhausted());
    }

    #[test]
    fn disconnect_reason_parsing() {
        assert!(DisconnectReason::from("io server disconnect").is_intentional());
        assert!(DisconnectReason::from("io client disconnect").is_intentional());
        assert!(!DisconnectReason::from("ping timeout").is_intentional());
        assert_eq!(
            DisconnectReason::from("forced close"),
            DisconnectReason::Other("forced close".into())
        );
        assert_eq!(DisconnectReason::TransportClose.to_string(), "transport close");
    }

    #[test]
    fn config_validation() {
        assert!(ConnectionConfig::default().validate().is_ok());

        let config = ConnectionConfig { endpoint: " ".into(), ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::EmptyEndpoint));

        let config = ConnectionConfig { endpoint: "ftp://relay".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidEndpoint(_))));

        let config = ConnectionConfig {
            reconnection_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDelay { min_ms: 10_000, max_ms: 5_000 })
        );

        let config = ConnectionConfig { timeout: Duration::ZERO, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }
}
