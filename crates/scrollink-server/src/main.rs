//! Scrollink WebSocket Relay Server
//!
//! Fans document updates out to every other member of a room, keeps a
//! merged copy of the room document for late joiners and reports the
//! participant count whenever someone joins or leaves.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "room": "room-id" }
//! { "type": "sync", "data": "<base64-encoded-loro-bytes>" }
//! { "type": "leave" }
//! ```

mod rooms;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use rooms::{RejectReason, RoomEnvelope, Rooms};
use scrollink_core::sync::{ClientMessage, ServerMessage};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_ADDR: &str = "0.0.0.0:3030";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scrollink_server=info,tower_http=info".into()),
        )
        .init();

    let addr: SocketAddr = match std::env::var("SCROLLINK_RELAY_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid SCROLLINK_RELAY_ADDR: {}", e);
            return;
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Cannot bind {}: {}", addr, e);
            return;
        }
    };
    info!("Scrollink relay listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    if let Err(e) = axum::serve(listener, router(Arc::new(Rooms::new()))).await {
        error!("Server stopped: {}", e);
    }
}

fn router(rooms: Arc<Rooms>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(rooms)
}

async fn index() -> &'static str {
    "Scrollink Relay Server - Connect via WebSocket at /ws"
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(rooms): State<Arc<Rooms>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, rooms))
}

fn to_frame(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            error!("Cannot serialize {:?}: {}", msg, e);
            None
        }
    }
}

/// What the room channel produced for a connection.
#[derive(Debug)]
enum Broadcast {
    Message(RoomEnvelope),
    /// Messages were dropped; the peer needs the room state again.
    Lagged,
    Closed,
}

/// One connection's membership.
struct Peer {
    id: String,
    room: Option<String>,
    rx: Option<broadcast::Receiver<RoomEnvelope>>,
}

impl Peer {
    fn leave(&mut self, rooms: &Rooms) {
        if let Some(room) = self.room.take() {
            rooms.leave(&room, &self.id);
            info!("Peer {} left room {}", self.id, room);
        }
        self.rx = None;
    }

    /// Apply a client message. Returns the reply for this peer, if any.
    fn handle(&mut self, rooms: &Rooms, msg: ClientMessage) -> Option<ServerMessage> {
        match msg {
            ClientMessage::Join { room } => {
                if self.room.as_deref() == Some(room.as_str()) {
                    return self.resync(rooms);
                }
                self.leave(rooms);
                let joined = rooms.join(&room, &self.id);
                info!("Peer {} joined room {} ({} present)", self.id, room, joined.peer_count);
                self.rx = Some(joined.rx);
                self.room = Some(room.clone());
                Some(ServerMessage::Joined {
                    room,
                    peer_count: joined.peer_count,
                    initial_sync: joined.initial_sync,
                })
            }
            ClientMessage::Leave => {
                self.leave(rooms);
                None
            }
            ClientMessage::Sync { data } => {
                let room = self.room.clone().unwrap_or_default();
                let result = rooms.sync(&room, &self.id, data);
                self.reject(rooms, result)
            }
        }
    }

    fn handle_binary(&mut self, rooms: &Rooms, bytes: &[u8]) -> Option<ServerMessage> {
        let room = self.room.clone().unwrap_or_default();
        let result = rooms.sync_binary(&room, &self.id, bytes);
        self.reject(rooms, result)
    }

    /// A peer whose update does not apply gets the room state back.
    fn reject(&self, rooms: &Rooms, result: Result<(), RejectReason>) -> Option<ServerMessage> {
        match result {
            Ok(()) => None,
            Err(RejectReason::NotLoro(_)) => self.resync(rooms),
            Err(reason) => Some(ServerMessage::Error {
                message: reason.to_string(),
            }),
        }
    }

    /// The current room state, as a `Joined` reply.
    fn resync(&self, rooms: &Rooms) -> Option<ServerMessage> {
        let room = self.room.clone()?;
        let (peer_count, initial_sync) = rooms.state(&room, &self.id)?;
        debug!("Resyncing peer {} in room {}", self.id, room);
        Some(ServerMessage::Joined {
            room,
            peer_count,
            initial_sync,
        })
    }

    async fn next_broadcast(&mut self) -> Broadcast {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        match rx.recv().await {
            Ok(envelope) => Broadcast::Message(envelope),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Peer {} lagged, {} message(s) skipped", self.id, skipped);
                Broadcast::Lagged
            }
            Err(broadcast::error::RecvError::Closed) => Broadcast::Closed,
        }
    }
}

async fn handle_socket(socket: WebSocket, rooms: Arc<Rooms>) {
    let mut peer = Peer {
        id: Uuid::new_v4().to_string(),
        room: None,
        rx: None,
    };
    info!("New connection: {}", peer.id);

    let (mut sender, mut receiver) = socket.split();

    loop {
        let reply = tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => peer.handle(&rooms, client_msg),
                    Err(e) => {
                        warn!("Invalid message from {}: {}", peer.id, e);
                        Some(ServerMessage::Error {
                            message: format!("Invalid message: {}", e),
                        })
                    }
                },
                Some(Ok(Message::Binary(bytes))) => peer.handle_binary(&rooms, &bytes),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => None,
                Some(Err(e)) => {
                    warn!("WebSocket error for {}: {}", peer.id, e);
                    break;
                }
            },

            broadcast = peer.next_broadcast() => match broadcast {
                // Don't echo back to sender
                Broadcast::Message((from, msg)) if from != peer.id => Some(msg),
                Broadcast::Message(_) => None,
                Broadcast::Lagged => peer.resync(&rooms),
                Broadcast::Closed => {
                    peer.rx = None;
                    None
                }
            },
        };

        if let Some(frame) = reply.as_ref().and_then(to_frame) {
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    }

    peer.leave(&rooms);
    info!("Connection closed: {}", peer.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrollink_core::sync::encode_update;

    fn peer(id: &str) -> Peer {
        Peer {
            id: id.to_string(),
            room: None,
            rx: None,
        }
    }

    #[test]
    fn test_join_reply_carries_count() {
        let rooms = Rooms::new();
        let mut a = peer("a");
        let mut b = peer("b");
        a.handle(&rooms, ClientMessage::Join { room: "lobby".into() });
        let reply = b.handle(&rooms, ClientMessage::Join { room: "lobby".into() });
        assert_eq!(
            reply,
            Some(ServerMessage::Joined {
                room: "lobby".into(),
                peer_count: 2,
                initial_sync: None,
            })
        );
    }

    #[test]
    fn test_switching_rooms_leaves_the_old_one() {
        let rooms = Rooms::new();
        let mut a = peer("a");
        let mut b = peer("b");
        a.handle(&rooms, ClientMessage::Join { room: "one".into() });
        b.handle(&rooms, ClientMessage::Join { room: "one".into() });
        a.handle(&rooms, ClientMessage::Join { room: "two".into() });
        assert_eq!(rooms.peer_count("one"), 1);
        assert_eq!(rooms.peer_count("two"), 1);

        a.handle(&rooms, ClientMessage::Leave);
        assert_eq!(rooms.peer_count("two"), 0);
        assert!(a.rx.is_none());
    }

    #[test]
    fn test_sync_outside_room_is_an_error() {
        let rooms = Rooms::new();
        let mut a = peer("a");
        let reply = a.handle(
            &rooms,
            ClientMessage::Sync {
                data: encode_update(b"bytes"),
            },
        );
        assert!(matches!(reply, Some(ServerMessage::Error { .. })));
        assert!(matches!(
            a.handle_binary(&rooms, b"bytes"),
            Some(ServerMessage::Error { .. })
        ));
    }

    #[test]
    fn test_rejoining_same_room_resends_state() {
        let rooms = Rooms::new();
        let mut a = peer("a");
        let mut b = peer("b");
        a.handle(&rooms, ClientMessage::Join { room: "lobby".into() });
        b.handle(&rooms, ClientMessage::Join { room: "lobby".into() });
        let rx = b.rx.as_mut().unwrap();
        while rx.try_recv().is_ok() {}

        let reply = a.handle(&rooms, ClientMessage::Join { room: "lobby".into() });
        assert_eq!(
            reply,
            Some(ServerMessage::Joined {
                room: "lobby".into(),
                peer_count: 2,
                initial_sync: None,
            })
        );
        // Nobody hears a leave or join for a resync.
        assert!(b.rx.as_mut().unwrap().try_recv().is_err());
    }

    #[test]
    fn test_undecodable_update_answered_with_room_state() {
        let rooms = Rooms::new();
        let mut a = peer("a");
        a.handle(&rooms, ClientMessage::Join { room: "lobby".into() });
        let expected = Some(ServerMessage::Joined {
            room: "lobby".into(),
            peer_count: 1,
            initial_sync: None,
        });
        assert_eq!(a.handle_binary(&rooms, b"not a document"), expected);
        assert_eq!(
            a.handle(
                &rooms,
                ClientMessage::Sync {
                    data: encode_update(b"not a document"),
                },
            ),
            expected
        );
        assert!(matches!(
            a.handle(&rooms, ClientMessage::Sync { data: "***".into() }),
            Some(ServerMessage::Error { .. })
        ));
    }

    #[tokio::test]
    async fn test_lagging_peer_is_resynced() {
        let rooms = Rooms::new();
        let mut a = peer("a");
        a.handle(&rooms, ClientMessage::Join { room: "lobby".into() });
        // Churn overflows the room channel before `a` reads anything.
        for i in 0..200 {
            let id = format!("churn-{i}");
            let _ = rooms.join("lobby", &id);
            rooms.leave("lobby", &id);
        }

        assert!(matches!(a.next_broadcast().await, Broadcast::Lagged));
        let Some(ServerMessage::Joined { peer_count, .. }) = a.resync(&rooms) else {
            panic!("expected a Joined reply");
        };
        assert_eq!(peer_count, 1);
        assert!(matches!(a.next_broadcast().await, Broadcast::Message(_)));
    }

    #[test]
    fn test_frames_are_tagged_json() {
        let frame = to_frame(&ServerMessage::PeerLeft {
            peer_id: "a".into(),
            peer_count: 1,
        })
        .unwrap();
        let Message::Text(text) = frame else {
            panic!("expected a text frame");
        };
        assert_eq!(
            text.as_str(),
            r#"{"type":"peer_left","peer_id":"a","peer_count":1}"#
        );
    }

    #[tokio::test]
    async fn test_health_route() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let response = router(Arc::new(Rooms::new()))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
