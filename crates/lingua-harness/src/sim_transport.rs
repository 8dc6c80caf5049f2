//! In-memory transport.
//!
//! [`SimTransport::pair`] returns the transport, which is handed to a
//! `ConnectionManager`, and a [`SimRemote`] kept by the test. The remote
//! plays the relay's side of the socket: it injects lifecycle signals and
//! events, and it reads back what the client emitted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use lingua_client::{Transport, TransportError, TransportEvent};
use lingua_core::{DisconnectReason, TransportSignal};
use lingua_proto::{InboundEvent, OutboundEvent, ProtocolError};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Default)]
struct Shared {
    emitted: Vec<(String, Value)>,
    closes: usize,
}

/// Client side of an in-memory socket.
pub struct SimTransport {
    incoming: mpsc::UnboundedReceiver<TransportEvent>,
    outgoing: mpsc::UnboundedSender<(String, Value)>,
    shared: Arc<Mutex<Shared>>,
    closed: bool,
}

/// Relay side of an in-memory socket.
pub struct SimRemote {
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    emitted: mpsc::UnboundedReceiver<(String, Value)>,
    shared: Arc<Mutex<Shared>>,
}

impl SimTransport {
    /// Connected pair of transport and remote.
    pub fn pair() -> (Self, SimRemote) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (emitted_tx, emitted_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared::default()));

        let transport = Self {
            incoming: events_rx,
            outgoing: emitted_tx,
            shared: Arc::clone(&shared),
            closed: false,
        };
        let remote = SimRemote { events: Some(events_tx), emitted: emitted_rx, shared };
        (transport, remote)
    }
}

#[async_trait]
impl Transport for SimTransport {
    fn emit(&mut self, name: &str, data: Value) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        lock(&self.shared).emitted.push((name.to_string(), data.clone()));
        self.outgoing.send((name.to_string(), data)).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        self.incoming.recv().await
    }

    fn close(&mut self) {
        self.closed = true;
        lock(&self.shared).closes += 1;
        trace!("sim transport closed");
    }
}

impl SimRemote {
    /// Report a lifecycle signal.
    pub fn signal(&self, signal: TransportSignal) {
        self.push(TransportEvent::Signal(signal));
    }

    /// Socket came up.
    pub fn connect(&self) {
        self.signal(TransportSignal::Connect);
    }

    /// Socket went down for `reason`.
    pub fn disconnect(&self, reason: DisconnectReason) {
        self.signal(TransportSignal::Disconnect(reason));
    }

    /// Unintentional drop followed by a successful first retry.
    pub fn bounce(&self) {
        self.disconnect(DisconnectReason::TransportClose);
        self.signal(TransportSignal::ReconnectAttempt(1));
        self.signal(TransportSignal::Reconnect(1));
    }

    /// Raw named event.
    pub fn event(&self, name: &str, data: Value) {
        self.push(TransportEvent::Event { name: name.to_string(), data });
    }

    /// Typed relay event.
    pub fn deliver(&self, event: &InboundEvent) -> Result<(), ProtocolError> {
        let data = event.payload()?;
        self.event(event.kind().name(), data);
        Ok(())
    }

    /// End the event stream, as a transport that is gone for good.
    pub fn hang_up(&mut self) {
        self.events = None;
    }

    /// Everything the client emitted so far, in order.
    pub fn emitted(&self) -> Vec<(String, Value)> {
        lock(&self.shared).emitted.clone()
    }

    /// Emitted names, in order.
    pub fn emitted_names(&self) -> Vec<String> {
        lock(&self.shared).emitted.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Next emitted command not yet taken, decoded as the relay would.
    pub fn try_take(&mut self) -> Option<Result<OutboundEvent, ProtocolError>> {
        let (name, data) = self.emitted.try_recv().ok()?;
        Some(OutboundEvent::decode(&name, data))
    }

    /// Times the client closed the transport.
    pub fn close_count(&self) -> usize {
        lock(&self.shared).closes
    }

    fn push(&self, event: TransportEvent) {
        let delivered = self.events.as_ref().is_some_and(|tx| tx.send(event).is_ok());
        if !delivered {
            trace!("sim transport receiver gone, dropping event");
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
