//! Connection manager.
//!
//! Owns exactly one transport. Feeds the transport's lifecycle signals
//! through the [`Connection`] tracker, decodes relay events, filters them by
//! subscription, and gates outbound events on the connection being up.
//!
//! The transport is released exactly once: by [`ConnectionManager::close`] or,
//! failing that, on drop.

use std::collections::HashSet;

use lingua_core::{Connection, ConnectionAction, ConnectionConfig, ConnectionState};
use lingua_proto::{EventKind, InboundEvent, OutboundEvent, ProtocolError};
use tracing::{debug, trace, warn};

use crate::transport::{Transport, TransportEvent};

/// What the manager reports to the layer above.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    /// Connection state changed.
    StateChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// Reconnect attempt counter changed.
    AttemptChanged(u32),
    /// Relay event of a subscribed kind.
    Inbound(InboundEvent),
}

/// Owner of one transport connection.
pub struct ConnectionManager<T: Transport> {
    transport: Option<T>,
    connection: Connection,
    subscriptions: HashSet<EventKind>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Take ownership of `transport`.
    pub fn new(transport: T, config: &ConnectionConfig) -> Self {
        Self {
            transport: Some(transport),
            connection: Connection::new(config),
            subscriptions: HashSet::new(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// True while the socket is up.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// True while the transport is retrying.
    pub fn is_reconnecting(&self) -> bool {
        self.connection.is_reconnecting()
    }

    /// Current retry number.
    pub fn reconnect_attempt(&self) -> u32 {
        self.connection.reconnect_attempt()
    }

    /// True once the transport gave up.
    pub fn is_exhausted(&self) -> bool {
        self.connection.is_exhausted()
    }

    /// True once the transport was released.
    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Deliver events of `kind`.
    pub fn subscribe(&mut self, kind: EventKind) {
        self.subscriptions.insert(kind);
    }

    /// Stop delivering events of `kind`.
    pub fn unsubscribe(&mut self, kind: EventKind) {
        self.subscriptions.remove(&kind);
    }

    /// Stop delivering every kind.
    pub fn unsubscribe_all(&mut self) {
        self.subscriptions.clear();
    }

    /// True when `kind` is delivered.
    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.subscriptions.contains(&kind)
    }

    /// Hand `event` to the transport.
    ///
    /// Fire-and-forget. Returns `false` when the event was dropped because the
    /// connection is down, the transport is closed, or encoding failed.
    pub fn send(&mut self, event: &OutboundEvent) -> bool {
        if !self.connection.is_connected() {
            debug!(event = event.name(), state = %self.connection.state(), "not connected, dropping");
            return false;
        }
        let Some(transport) = self.transport.as_mut() else {
            debug!(event = event.name(), "transport closed, dropping");
            return false;
        };

        let payload = match event.payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(event = event.name(), error = %err, "failed to encode event");
                return false;
            },
        };
        match transport.emit(event.name(), payload) {
            Ok(()) => {
                trace!(event = event.name(), room_id = %event.room_id(), "emitted");
                true
            },
            Err(err) => {
                warn!(event = event.name(), error = %err, "emit failed");
                false
            },
        }
    }

    /// Wait for the next reportable change.
    ///
    /// Signals that change nothing and events nobody subscribed to are
    /// consumed silently. Returns `None` when the transport has gone away.
    /// Cancel-safe: the only await point is the transport's `recv`.
    pub async fn next_event(&mut self) -> Option<Vec<ManagerEvent>> {
        loop {
            let event = self.transport.as_mut()?.recv().await?;
            match event {
                TransportEvent::Signal(signal) => {
                    let actions = self.connection.handle_signal(signal);
                    if !actions.is_empty() {
                        return Some(actions.into_iter().map(ManagerEvent::from).collect());
                    }
                },
                TransportEvent::Event { name, data } => {
                    if let Some(event) = self.decode(&name, data) {
                        return Some(vec![ManagerEvent::Inbound(event)]);
                    }
                },
            }
        }
    }

    /// Release the transport. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            debug!("closing transport");
            transport.close();
        }
    }

    fn decode(&self, name: &str, data: serde_json::Value) -> Option<InboundEvent> {
        match InboundEvent::decode(name, data) {
            Ok(event) if self.subscriptions.contains(&event.kind()) => Some(event),
            Ok(event) => {
                trace!(kind = ?event.kind(), "no subscriber, dropping");
                None
            },
            Err(ProtocolError::UnknownEvent(name)) => {
                debug!(%name, "unknown relay event");
                None
            },
            Err(err) => {
                warn!(event = name, error = %err, "invalid relay event");
                None
            },
        }
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl From<ConnectionAction> for ManagerEvent {
    fn from(action: ConnectionAction) -> Self {
        match action {
            ConnectionAction::StateChanged { from, to } => Self::StateChanged { from, to },
            ConnectionAction::AttemptChanged(attempt) => Self::AttemptChanged(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use lingua_core::{DisconnectReason, TransportSignal};
    use lingua_proto::{RoomRef, Role};
    use serde_json::{Value, json};

    use super::*;
    use crate::transport::TransportError;

    /// Scripted transport: replays a queue, records emits and closes.
    struct ScriptTransport {
        script: VecDeque<TransportEvent>,
        emitted: Vec<(String, Value)>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptTransport {
        fn new(script: Vec<TransportEvent>) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            let transport =
                Self { script: script.into(), emitted: Vec::new(), closes: Arc::clone(&closes) };
            (transport, closes)
        }
    }

    #[async_trait]
    impl Transport for ScriptTransport {
        fn emit(&mut self, name: &str, data: Value) -> Result<(), TransportError> {
            self.emitted.push((name.to_string(), data));
            Ok(())
        }

        async fn recv(&mut self) -> Option<TransportEvent> {
            self.script.pop_front()
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn signal(signal: TransportSignal) -> TransportEvent {
        TransportEvent::Signal(signal)
    }

    fn event(name: &str, data: Value) -> TransportEvent {
        TransportEvent::Event { name: name.into(), data }
    }

    fn typing() -> OutboundEvent {
        OutboundEvent::Typing(RoomRef { room_id: "room_1".into() })
    }

    #[tokio::test]
    async fn send_is_gated_on_connection() {
        let (transport, _) = ScriptTransport::new(vec![signal(TransportSignal::Connect)]);
        let mut manager = ConnectionManager::new(transport, &ConnectionConfig::default());

        assert!(!manager.send(&typing()));

        let events = manager.next_event().await.unwrap();
        assert_eq!(
            events,
            vec![ManagerEvent::StateChanged {
                from: ConnectionState::Disconnected,
                to: ConnectionState::Connected
            }]
        );
        assert!(manager.send(&typing()));
        let emitted = &manager.transport.as_ref().unwrap().emitted;
        assert_eq!(emitted, &vec![("typing".to_string(), json!({"room_id": "room_1"}))]);
    }

    #[tokio::test]
    async fn events_filtered_by_subscription() {
        let (transport, _) = ScriptTransport::new(vec![
            event("typing", Value::Null),
            event("bogus_event", json!({})),
            event("new_message", json!({"text": 1})),
            event("agent_online", json!({})),
        ]);
        let mut manager = ConnectionManager::new(transport, &ConnectionConfig::default());
        manager.subscribe(EventKind::AgentOnline);
        manager.subscribe(EventKind::NewMessage);

        let events = manager.next_event().await.unwrap();
        assert_eq!(events, vec![ManagerEvent::Inbound(InboundEvent::AgentOnline)]);
        assert!(manager.next_event().await.is_none());
    }

    #[tokio::test]
    async fn reconnect_signals_surface_attempts() {
        let (transport, _) = ScriptTransport::new(vec![
            signal(TransportSignal::Connect),
            signal(TransportSignal::Disconnect(DisconnectReason::PingTimeout)),
            signal(TransportSignal::ReconnectAttempt(1)),
            signal(TransportSignal::Reconnect(1)),
        ]);
        let mut manager = ConnectionManager::new(transport, &ConnectionConfig::default());

        manager.next_event().await.unwrap();
        manager.next_event().await.unwrap();
        assert!(manager.is_reconnecting());

        let events = manager.next_event().await.unwrap();
        assert_eq!(events, vec![ManagerEvent::AttemptChanged(1)]);
        assert_eq!(manager.reconnect_attempt(), 1);

        let events = manager.next_event().await.unwrap();
        assert!(events.contains(&ManagerEvent::AttemptChanged(0)));
        assert!(manager.is_connected());
    }

    #[test]
    fn close_releases_transport_once() {
        let (transport, closes) = ScriptTransport::new(Vec::new());
        let mut manager = ConnectionManager::new(transport, &ConnectionConfig::default());
        manager.subscribe(EventKind::Typing);
        manager.unsubscribe_all();
        assert!(!manager.is_subscribed(EventKind::Typing));

        manager.close();
        manager.close();
        drop(manager);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let (transport, closes) = ScriptTransport::new(Vec::new());
        drop(ConnectionManager::new(transport, &ConnectionConfig::default()));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_manager_reports_end_of_stream() {
        let (transport, _) = ScriptTransport::new(vec![signal(TransportSignal::Connect)]);
        let mut manager = ConnectionManager::new(transport, &ConnectionConfig::default());
        manager.close();
        assert!(manager.is_closed());
        assert!(manager.next_event().await.is_none());
        assert!(!manager.send(&OutboundEvent::EndChat(lingua_proto::EndChat {
            room_id: "room_1".into(),
            ended_by: Role::Agent,
        })));
    }
}
