//! WebSocket sync protocol and native client.
//!
//! Document updates travel as base64 encoded Loro bytes inside JSON messages.
//! The relay fans them out to every other member of the room and reports the
//! participant count whenever someone joins or leaves.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Document update (base64 encoded Loro bytes)
    Sync { data: String },
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join with current state
    Joined {
        room: String,
        peer_count: usize,
        /// Merged room document, if the room has history
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_sync: Option<String>,
    },
    /// Peer joined the room
    PeerJoined { peer_id: String, peer_count: usize },
    /// Peer left the room
    PeerLeft { peer_id: String, peer_count: usize },
    /// Document update from another peer
    Sync { from: String, data: String },
    /// Error message
    Error { message: String },
}

/// Sync client errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Not connected")]
    NotConnected,
    #[error("Send failed: {0}")]
    Send(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the WebSocket client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Connected to server
    Connected,
    /// Disconnected from server
    Disconnected,
    /// Joined a room
    JoinedRoom {
        room: String,
        peer_count: usize,
        initial_sync: Option<Vec<u8>>,
    },
    /// Someone joined; `peer_count` includes us
    PeerJoined { peer_id: String, peer_count: usize },
    /// Someone left
    PeerLeft { peer_id: String, peer_count: usize },
    /// Received a document update from a peer
    SyncReceived { from: String, data: Vec<u8> },
    /// Error occurred
    Error { message: String },
}

pub fn encode_update(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_update(data: &str) -> Option<Vec<u8>> {
    STANDARD.decode(data).ok()
}

impl ClientMessage {
    /// Wrap document bytes in a sync message.
    pub fn sync(bytes: &[u8]) -> Self {
        ClientMessage::Sync {
            data: encode_update(bytes),
        }
    }
}

impl SyncEvent {
    /// Translate a server message. Sync payloads that are not valid base64
    /// are dropped.
    pub fn from_server(msg: ServerMessage) -> Option<Self> {
        let event = match msg {
            ServerMessage::Joined {
                room,
                peer_count,
                initial_sync,
            } => SyncEvent::JoinedRoom {
                room,
                peer_count,
                initial_sync: initial_sync.and_then(|s| decode_update(&s)),
            },
            ServerMessage::PeerJoined {
                peer_id,
                peer_count,
            } => SyncEvent::PeerJoined {
                peer_id,
                peer_count,
            },
            ServerMessage::PeerLeft {
                peer_id,
                peer_count,
            } => SyncEvent::PeerLeft {
                peer_id,
                peer_count,
            },
            ServerMessage::Sync { from, data } => match decode_update(&data) {
                Some(data) => SyncEvent::SyncReceived { from, data },
                None => {
                    log::warn!("Dropping sync from {from}: payload is not base64");
                    return None;
                }
            },
            ServerMessage::Error { message } => SyncEvent::Error { message },
        };
        Some(event)
    }

    /// Parse and translate a raw server frame.
    pub fn from_json(json: &str) -> Option<Self> {
        match serde_json::from_str::<ServerMessage>(json) {
            Ok(msg) => Self::from_server(msg),
            Err(e) => {
                log::warn!("Failed to parse server message: {e}");
                None
            }
        }
    }
}

/// A connection to a relay, polled from the frame loop.
pub trait SyncTransport {
    fn connect(&mut self, url: &str) -> SyncResult<()>;
    fn disconnect(&mut self);
    fn send(&self, msg: &str) -> SyncResult<()>;
    /// Drain pending events without blocking.
    fn poll_events(&mut self) -> Vec<SyncEvent>;
    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

/// Accept only `ws://` and `wss://` URLs.
pub fn validate_url(url: &str) -> SyncResult<url::Url> {
    let parsed = url::Url::parse(url).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(SyncError::InvalidUrl(format!(
            "unsupported scheme `{other}`"
        ))),
    }
}

mod native_client {
    use super::*;
    use std::net::TcpStream;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::stream::MaybeTlsStream;
    use tungstenite::{Message, WebSocket, connect};

    /// Commands sent to the WebSocket thread.
    #[derive(Debug)]
    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation.
    pub struct NativeWebSocket {
        state: ConnectionState,
        events: Vec<SyncEvent>,
        cmd_tx: Option<Sender<WsCommand>>,
        event_rx: Option<Receiver<SyncEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        /// Create a new disconnected WebSocket client.
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                events: Vec::new(),
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }
    }

    fn set_timeouts(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) {
        match socket.get_mut() {
            MaybeTlsStream::Plain(tcp) => {
                let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
            }
            #[allow(unreachable_patterns)]
            _ => log::debug!("TLS or other stream, using default timeout handling"),
        }
    }

    /// What the socket loop does after the command queue is drained.
    #[derive(Debug, PartialEq, Eq)]
    enum Drained {
        Open,
        Close,
        Gone,
    }

    /// Hand every queued message to `send` before the next blocking read.
    fn drain_commands<E>(
        cmd_rx: &Receiver<WsCommand>,
        mut send: impl FnMut(String) -> Result<(), E>,
    ) -> Result<Drained, E> {
        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    log::trace!("WebSocket sending {} bytes", msg.len());
                    send(msg)?;
                }
                Ok(WsCommand::Close) => return Ok(Drained::Close),
                Err(TryRecvError::Disconnected) => return Ok(Drained::Gone),
                Err(TryRecvError::Empty) => return Ok(Drained::Open),
            }
        }
    }

    fn run(url: String, cmd_rx: Receiver<WsCommand>, event_tx: Sender<SyncEvent>) {
        log::info!("WebSocket thread: connecting to {url}");
        let mut socket = match connect(&url) {
            Ok((socket, response)) => {
                log::info!("WebSocket connected, status: {}", response.status());
                socket
            }
            Err(e) => {
                log::error!("WebSocket connection failed: {e}");
                let _ = event_tx.send(SyncEvent::Error {
                    message: format!("Connection failed: {e}"),
                });
                return;
            }
        };
        let _ = event_tx.send(SyncEvent::Connected);
        set_timeouts(&mut socket);

        loop {
            match drain_commands(&cmd_rx, |msg| socket.send(Message::Text(msg))) {
                Ok(Drained::Open) => {}
                Ok(Drained::Close) => {
                    log::info!("WebSocket close requested");
                    let _ = socket.close(None);
                    break;
                }
                Ok(Drained::Gone) => {
                    log::info!("WebSocket command channel disconnected");
                    break;
                }
                Err(e) => {
                    log::error!("WebSocket send error: {e}");
                    break;
                }
            }

            match socket.read() {
                Ok(Message::Text(txt)) => {
                    log::trace!("WebSocket received {} bytes", txt.len());
                    if let Some(event) = SyncEvent::from_json(&txt) {
                        let _ = event_tx.send(event);
                    }
                }
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket received close frame");
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    log::error!("WebSocket read error: {e}");
                    break;
                }
            }
        }

        log::info!("WebSocket thread exiting");
        let _ = event_tx.send(SyncEvent::Disconnected);
    }

    impl SyncTransport for NativeWebSocket {
        fn connect(&mut self, url: &str) -> SyncResult<()> {
            if self.cmd_tx.is_some() {
                return Err(SyncError::AlreadyConnected);
            }
            validate_url(url)?;

            self.state = ConnectionState::Connecting;
            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<SyncEvent>();
            let url = url.to_string();
            let handle = thread::spawn(move || run(url, cmd_rx, event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

        fn send(&self, msg: &str) -> SyncResult<()> {
            match &self.cmd_tx {
                Some(tx) => tx
                    .send(WsCommand::Send(msg.to_string()))
                    .map_err(|e| SyncError::Send(e.to_string())),
                None => Err(SyncError::NotConnected),
            }
        }

        fn poll_events(&mut self) -> Vec<SyncEvent> {
            if let Some(rx) = &self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    match &event {
                        SyncEvent::Connected => self.state = ConnectionState::Connected,
                        SyncEvent::Disconnected => self.state = ConnectionState::Disconnected,
                        SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                        _ => {}
                    }
                    self.events.push(event);
                }
            }
            if self.state != ConnectionState::Connecting
                && self.state != ConnectionState::Connected
            {
                // Thread is gone; allow a fresh connect.
                self.cmd_tx = None;
                self.event_rx = None;
                self._thread = None;
            }
            std::mem::take(&mut self.events)
        }

        fn state(&self) -> ConnectionState {
            self.state
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_backlog_sent_before_next_read() {
            let (tx, rx) = channel();
            for i in 0..5 {
                tx.send(WsCommand::Send(format!("m{i}"))).unwrap();
            }
            let mut sent = Vec::new();
            let drained = drain_commands(&rx, |msg| {
                sent.push(msg);
                Ok::<(), ()>(())
            });
            assert_eq!(drained, Ok(Drained::Open));
            assert_eq!(sent, vec!["m0", "m1", "m2", "m3", "m4"]);
        }

        #[test]
        fn test_close_stops_draining() {
            let (tx, rx) = channel();
            tx.send(WsCommand::Send("first".into())).unwrap();
            tx.send(WsCommand::Close).unwrap();
            tx.send(WsCommand::Send("after".into())).unwrap();
            let mut sent = Vec::new();
            let drained = drain_commands(&rx, |msg| {
                sent.push(msg);
                Ok::<(), ()>(())
            });
            assert_eq!(drained, Ok(Drained::Close));
            assert_eq!(sent, vec!["first"]);

            drop(tx);
            let mut sent = Vec::new();
            assert_eq!(
                drain_commands(&rx, |msg| {
                    sent.push(msg);
                    Ok::<(), ()>(())
                }),
                Ok(Drained::Gone)
            );
            assert_eq!(sent, vec!["after"]);
        }

        #[test]
        fn test_send_failure_and_dropped_sender() {
            let (tx, rx) = channel();
            tx.send(WsCommand::Send("a".into())).unwrap();
            assert_eq!(drain_commands(&rx, |_| Err("broken")), Err("broken"));
            drop(tx);
            assert_eq!(drain_commands(&rx, |_| Ok::<(), ()>(())), Ok(Drained::Gone));
        }
    }
}

pub use native_client::NativeWebSocket;
