//! Socket.IO client transport over WebSocket.
//!
//! A background task owns the socket. It performs the Engine.IO/Socket.IO
//! handshake, answers heartbeats, forwards events, and on unintentional loss
//! reconnects with [`Backoff`] until the attempt budget runs out. Every
//! lifecycle step is reported as a [`TransportSignal`], in the order a
//! Socket.IO client would report it.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use lingua_core::{Backoff, ConnectionConfig, DisconnectReason, Environment, TransportSignal};
use lingua_proto::{OpenInfo, Packet, ProtocolError};
use serde_json::Value;
use tokio::{
    net::TcpStream,
    sync::mpsc::{self, error::TryRecvError},
    time::{Instant, timeout, timeout_at},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::transport::{Transport, TransportError, TransportEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Outgoing {
    Frame(String),
    Close,
}

/// Socket.IO transport.
pub struct SocketIoTransport {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    incoming: mpsc::UnboundedReceiver<TransportEvent>,
    closed: bool,
}

impl SocketIoTransport {
    /// Start connecting to `config.endpoint` in the background.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect<E: Environment>(env: E, config: ConnectionConfig) -> Result<Self, TransportError> {
        let url = socket_url(&config.endpoint)?;
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let driver = Driver { env, config, url, outgoing: outgoing_rx, events: incoming_tx };
        tokio::spawn(driver.run());

        Ok(Self { outgoing: outgoing_tx, incoming: incoming_rx, closed: false })
    }
}

#[async_trait]
impl Transport for SocketIoTransport {
    fn emit(&mut self, name: &str, data: Value) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let frame = Packet::event(name, data).encode()?;
        self.outgoing.send(Outgoing::Frame(frame)).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        self.incoming.recv().await
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.outgoing.send(Outgoing::Close).is_err() {
            trace!("socket task already finished");
        }
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        // The socket task exits on its own after sending the disconnect packet.
        self.close();
    }
}

/// Build the Engine.IO WebSocket URL for a relay endpoint.
pub fn socket_url(endpoint: &str) -> Result<String, TransportError> {
    let invalid = |reason: String| TransportError::InvalidUrl { endpoint: endpoint.to_string(), reason };

    let mut url = Url::parse(endpoint.trim()).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme).map_err(|()| invalid("cannot switch scheme".to_string()))?;
    url.set_path("/socket.io/");
    url.query_pairs_mut().clear().append_pair("EIO", "4").append_pair("transport", "websocket");
    Ok(url.into())
}

enum SessionEnd {
    Lost(DisconnectReason),
    Server,
    Client,
}

struct Driver<E: Environment> {
    env: E,
    config: ConnectionConfig,
    url: String,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl<E: Environment> Driver<E> {
    async fn run(mut self) {
        let mut backoff = Backoff::from_config(&self.config);
        let mut attempt: u32 = 0;
        let mut ever_connected = false;

        loop {
            if attempt > 0 {
                self.signal(TransportSignal::ReconnectAttempt(attempt));
            }

            match timeout(self.config.timeout, handshake(&self.url)).await {
                Ok(Ok((mut socket, open))) => {
                    if !self.drop_stale_frames() {
                        let _ = socket.send(Message::Text(encode(&Packet::Disconnect).into())).await;
                        let _ = socket.close(None).await;
                        return;
                    }
                    info!(sid = %open.sid, attempt, "socket connected");
                    if attempt > 0 {
                        self.signal(TransportSignal::Reconnect(attempt));
                    } else {
                        self.signal(TransportSignal::Connect);
                    }
                    ever_connected = true;
                    attempt = 0;
                    backoff.reset();

                    match self.serve(socket, &open).await {
                        SessionEnd::Client => {
                            self.signal(TransportSignal::Disconnect(DisconnectReason::ClientDisconnect));
                            return;
                        },
                        SessionEnd::Server => {
                            self.signal(TransportSignal::Disconnect(DisconnectReason::ServerDisconnect));
                            return;
                        },
                        SessionEnd::Lost(reason) => {
                            warn!(%reason, "socket lost");
                            self.signal(TransportSignal::Disconnect(reason));
                        },
                    }
                },
                Ok(Err(err)) => self.handshake_failed(attempt, ever_connected, &err.to_string()),
                Err(_) => self.handshake_failed(attempt, ever_connected, "handshake timeout"),
            }

            if !self.config.reconnection {
                return;
            }
            attempt = attempt.saturating_add(1);
            if attempt > self.config.reconnection_attempts {
                self.signal(TransportSignal::ReconnectFailed);
                return;
            }

            let delay = backoff.next_delay(&self.env);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting before reconnect");
            if !self.wait(delay).await {
                return;
            }
        }
    }

    fn handshake_failed(&self, attempt: u32, ever_connected: bool, err: &str) {
        if attempt == 0 && !ever_connected {
            self.signal(TransportSignal::ConnectError(err.to_string()));
        } else {
            self.signal(TransportSignal::ReconnectError(err.to_string()));
        }
    }

    /// Sleep for `delay`. Returns `false` if the transport was closed meanwhile.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = self.env.sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                outgoing = self.outgoing.recv() => match outgoing {
                    Some(Outgoing::Frame(_)) => trace!("not connected, dropping frame"),
                    Some(Outgoing::Close) | None => return false,
                },
            }
        }
    }

    /// Drop frames emitted while no socket was up. Returns `false` if the
    /// transport was closed meanwhile.
    fn drop_stale_frames(&mut self) -> bool {
        loop {
            match self.outgoing.try_recv() {
                Ok(Outgoing::Frame(_)) => trace!("emitted before connect, dropping frame"),
                Ok(Outgoing::Close) | Err(TryRecvError::Disconnected) => return false,
                Err(TryRecvError::Empty) => return true,
            }
        }
    }

    async fn serve(&mut self, socket: Socket, open: &OpenInfo) -> SessionEnd {
        let (mut write, mut read) = socket.split();
        let idle = Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout));
        let mut deadline = Instant::now() + idle;

        loop {
            tokio::select! {
                outgoing = self.outgoing.recv() => match outgoing {
                    Some(Outgoing::Frame(frame)) => {
                        if let Err(err) = write.send(Message::Text(frame.into())).await {
                            warn!(error = %err, "send failed");
                            return SessionEnd::Lost(DisconnectReason::TransportError);
                        }
                    },
                    Some(Outgoing::Close) | None => {
                        let _ = write.send(Message::Text(encode(&Packet::Disconnect).into())).await;
                        let _ = write.close().await;
                        return SessionEnd::Client;
                    },
                },
                message = timeout_at(deadline, read.next()) => {
                    let message = match message {
                        Err(_) => return SessionEnd::Lost(DisconnectReason::PingTimeout),
                        Ok(None) => return SessionEnd::Lost(DisconnectReason::TransportClose),
                        Ok(Some(Err(err))) => {
                            warn!(error = %err, "websocket read failed");
                            return SessionEnd::Lost(DisconnectReason::TransportError);
                        },
                        Ok(Some(Ok(message))) => message,
                    };
                    deadline = Instant::now() + idle;
                    let text = match message {
                        Message::Text(text) => text,
                        Message::Close(_) => return SessionEnd::Lost(DisconnectReason::TransportClose),
                        _ => continue,
                    };
                    match Packet::decode(text.as_str()) {
                        Ok(Packet::Ping) => {
                            if write.send(Message::Text(encode(&Packet::Pong).into())).await.is_err() {
                                return SessionEnd::Lost(DisconnectReason::TransportError);
                            }
                        },
                        Ok(Packet::Event { name, data }) => {
                            trace!(event = %name, "received");
                            if self.events.send(TransportEvent::Event { name, data }).is_err() {
                                return SessionEnd::Client;
                            }
                        },
                        Ok(Packet::Disconnect) => return SessionEnd::Server,
                        Ok(Packet::Close) => return SessionEnd::Lost(DisconnectReason::TransportClose),
                        Ok(other) => trace!(packet = ?other, "ignored packet"),
                        Err(ProtocolError::Unsupported(kind)) => {
                            debug!(%kind, "unsupported packet type ignored");
                        },
                        Err(err) => {
                            warn!(error = %err, "undecodable frame");
                            return SessionEnd::Lost(DisconnectReason::ParseError);
                        },
                    }
                },
            }
        }
    }

    fn signal(&self, signal: TransportSignal) {
        if self.events.send(TransportEvent::Signal(signal)).is_err() {
            trace!("no receiver for transport signal");
        }
    }
}

/// Connect and run the Engine.IO open plus Socket.IO connect exchange.
async fn handshake(url: &str) -> Result<(Socket, OpenInfo), TransportError> {
    let (mut socket, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;

    let open = match next_packet(&mut socket).await? {
        Packet::Open(open) => open,
        other => return Err(TransportError::Handshake(format!("expected open, got {other:?}"))),
    };

    socket
        .send(Message::Text(encode(&Packet::Connect(None)).into()))
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;

    loop {
        match next_packet(&mut socket).await? {
            Packet::Connect(_) => return Ok((socket, open)),
            Packet::ConnectError(data) => {
                return Err(TransportError::Handshake(format!("connect refused: {data}")));
            },
            Packet::Ping => {
                socket
                    .send(Message::Text(encode(&Packet::Pong).into()))
                    .await
                    .map_err(|e| TransportError::WebSocket(e.to_string()))?;
            },
            other => trace!(packet = ?other, "ignored during handshake"),
        }
    }
}

async fn next_packet(socket: &mut Socket) -> Result<Packet, TransportError> {
    loop {
        let message = socket
            .next()
            .await
            .ok_or_else(|| TransportError::Handshake("socket closed during handshake".into()))?
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        if let Message::Text(text) = message {
            return Ok(Packet::decode(text.as_str())?);
        }
    }
}

fn encode(packet: &Packet) -> String {
    // Control packets carry no payload and cannot fail to encode.
    packet.encode().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use lingua_core::SystemEnv;
    use serde_json::json;
    use tokio::{net::TcpListener, task::JoinHandle};

    use super::*;

    type Server = WebSocketStream<TcpStream>;

    fn config(endpoint: String, reconnection: bool) -> ConnectionConfig {
        ConnectionConfig {
            endpoint,
            reconnection,
            reconnection_attempts: 2,
            reconnection_delay: Duration::from_millis(1),
            reconnection_delay_max: Duration::from_millis(5),
            timeout: Duration::from_secs(2),
        }
    }

    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        (listener, endpoint)
    }

    /// Accept one client and run the Engine.IO open and Socket.IO connect
    /// exchange with the given heartbeat settings.
    async fn accept(listener: &TcpListener, ping_interval: u64, ping_timeout: u64) -> Server {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let open = format!(
            r#"0{{"sid":"s1","upgrades":[],"pingInterval":{ping_interval},"pingTimeout":{ping_timeout}}}"#
        );
        ws.send(Message::Text(open.into())).await.unwrap();
        assert_eq!(next_text(&mut ws).await, "40");
        ws.send(Message::Text(r#"40{"sid":"n1"}"#.into())).await.unwrap();
        ws
    }

    async fn next_text(ws: &mut Server) -> String {
        loop {
            let message = ws.next().await.unwrap().unwrap();
            if let Message::Text(text) = message {
                return text.as_str().to_string();
            }
        }
    }

    /// Next lifecycle signal, skipping relay events.
    async fn next_signal(transport: &mut SocketIoTransport) -> Option<TransportSignal> {
        loop {
            let event = timeout(Duration::from_secs(5), transport.recv()).await.unwrap();
            match event {
                Some(TransportEvent::Signal(signal)) => return Some(signal),
                Some(TransportEvent::Event { .. }) => {},
                None => return None,
            }
        }
    }

    fn hold(mut ws: Server) -> JoinHandle<()> {
        tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} })
    }

    #[test]
    fn socket_urls() {
        assert_eq!(
            socket_url("http://localhost:8000").unwrap(),
            "ws://localhost:8000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_url("https://relay.example.com/ignored?x=1").unwrap(),
            "wss://relay.example.com/socket.io/?EIO=4&transport=websocket"
        );
        assert!(matches!(socket_url("ftp://relay"), Err(TransportError::InvalidUrl { .. })));
        assert!(matches!(socket_url("not a url"), Err(TransportError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn ping_event_and_server_disconnect() {
        let (listener, endpoint) = listen().await;
        let mut transport = SocketIoTransport::connect(SystemEnv, config(endpoint, true)).unwrap();
        let mut ws = accept(&listener, 25_000, 20_000).await;

        assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::Connect));

        ws.send(Message::Text("2".into())).await.unwrap();
        assert_eq!(next_text(&mut ws).await, "3");

        ws.send(Message::Text(r#"42["joined_room",{"room_id":"room_1"}]"#.into())).await.unwrap();
        let event = timeout(Duration::from_secs(5), transport.recv()).await.unwrap();
        assert_eq!(
            event,
            Some(TransportEvent::Event { name: "joined_room".into(), data: json!({"room_id": "room_1"}) })
        );

        ws.send(Message::Text("41".into())).await.unwrap();
        assert_eq!(
            next_signal(&mut transport).await,
            Some(TransportSignal::Disconnect(DisconnectReason::ServerDisconnect))
        );
        assert_eq!(next_signal(&mut transport).await, None);
    }

    #[tokio::test]
    async fn close_sends_disconnect_packet() {
        let (listener, endpoint) = listen().await;
        let mut transport = SocketIoTransport::connect(SystemEnv, config(endpoint, true)).unwrap();
        let mut ws = accept(&listener, 25_000, 20_000).await;
        assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::Connect));

        transport.close();
        assert_eq!(next_text(&mut ws).await, "41");
        assert_eq!(
            next_signal(&mut transport).await,
            Some(TransportSignal::Disconnect(DisconnectReason::ClientDisconnect))
        );
        assert!(matches!(transport.emit("typing", json!({})), Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn missed_heartbeat_is_ping_timeout() {
        let (listener, endpoint) = listen().await;
        let mut transport = SocketIoTransport::connect(SystemEnv, config(endpoint, false)).unwrap();
        let ws = accept(&listener, 20, 20).await;
        let server = hold(ws);

        assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::Connect));
        assert_eq!(
            next_signal(&mut transport).await,
            Some(TransportSignal::Disconnect(DisconnectReason::PingTimeout))
        );
        assert_eq!(next_signal(&mut transport).await, None);
        server.abort();
    }

    #[tokio::test]
    async fn refused_first_connect_exhausts_the_budget() {
        let (listener, endpoint) = listen().await;
        drop(listener);
        let mut transport = SocketIoTransport::connect(SystemEnv, config(endpoint, true)).unwrap();

        assert!(matches!(next_signal(&mut transport).await, Some(TransportSignal::ConnectError(_))));
        assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::ReconnectAttempt(1)));
        assert!(matches!(next_signal(&mut transport).await, Some(TransportSignal::ReconnectError(_))));
        assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::ReconnectAttempt(2)));
        assert!(matches!(next_signal(&mut transport).await, Some(TransportSignal::ReconnectError(_))));
        assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::ReconnectFailed));
        assert_eq!(next_signal(&mut transport).await, None);
    }

    #[tokio::test]
    async fn lost_socket_reconnects_then_gives_up() {
        let (listener, endpoint) = listen().await;
        let mut transport = SocketIoTransport::connect(SystemEnv, config(endpoint, true)).unwrap();
        let ws = accept(&listener, 25_000, 20_000).await;
        assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::Connect));

        drop(ws);
        match next_signal(&mut transport).await {
            Some(TransportSignal::Disconnect(reason)) => assert!(!reason.is_intentional(), "{reason}"),
            other => panic!("expected disconnect, got {other:?}"),
        }
        assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::ReconnectAttempt(1)));
        let ws = accept(&listener, 25_000, 20_000).await;
        assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::Reconnect(1)));

        // Nothing left to reconnect to.
        drop(listener);
        drop(ws);
        assert!(matches!(next_signal(&mut transport).await, Some(TransportSignal::Disconnect(_))));
        for attempt in 1..=2 {
            assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::ReconnectAttempt(attempt)));
            assert!(matches!(next_signal(&mut transport).await, Some(TransportSignal::ReconnectError(_))));
        }
        assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::ReconnectFailed));
        assert_eq!(next_signal(&mut transport).await, None);
    }

    #[tokio::test]
    async fn frames_emitted_before_connect_are_dropped() {
        let (listener, endpoint) = listen().await;
        let mut transport = SocketIoTransport::connect(SystemEnv, config(endpoint, true)).unwrap();
        transport.emit("typing", json!({"room_id": "room_1"})).unwrap();

        let mut ws = accept(&listener, 25_000, 20_000).await;
        assert_eq!(next_signal(&mut transport).await, Some(TransportSignal::Connect));

        transport.emit("join_room", json!({"room_id": "room_1"})).unwrap();
        assert_eq!(next_text(&mut ws).await, r#"42["join_room",{"room_id":"room_1"}]"#);
    }
}
