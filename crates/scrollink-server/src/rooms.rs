//! Room registry: membership, fan-out channels and the merged document.

use dashmap::DashMap;
use scrollink_core::StrokeDocument;
use scrollink_core::sync::{ServerMessage, decode_update, encode_update};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 256;

/// A message on a room channel, tagged with the peer that caused it.
pub type RoomEnvelope = (String, ServerMessage);

/// Room state
struct Room {
    tx: broadcast::Sender<RoomEnvelope>,
    peers: HashSet<String>,
    /// Every update the room has seen, merged.
    doc: StrokeDocument,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashSet::new(),
            doc: StrokeDocument::new(),
        }
    }

    /// Current state without overwritten history. An emptied room still
    /// has one, or peers that join later cannot apply its updates.
    fn snapshot(&self) -> Option<String> {
        if self.doc.has_history() {
            Some(encode_update(&self.doc.export_shallow_snapshot()))
        } else {
            None
        }
    }
}

/// What a peer receives when it joins.
#[derive(Debug)]
pub struct Joined {
    pub rx: broadcast::Receiver<RoomEnvelope>,
    pub peer_count: usize,
    pub initial_sync: Option<String>,
}

/// Why an update was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NotInRoom,
    NotBase64,
    NotLoro(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NotInRoom => write!(f, "Join a room before syncing"),
            RejectReason::NotBase64 => write!(f, "Sync data is not base64"),
            RejectReason::NotLoro(e) => write!(f, "Sync data is not a document update: {e}"),
        }
    }
}

/// All active rooms. Empty rooms are dropped together with their document.
#[derive(Default)]
pub struct Rooms {
    rooms: DashMap<String, Room>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |room| room.peers.len())
    }

    /// Add a peer, announce it to the others and hand back the room state.
    pub fn join(&self, room_id: &str, peer_id: &str) -> Joined {
        let mut room = self.rooms.entry(room_id.to_string()).or_insert_with(Room::new);
        room.peers.insert(peer_id.to_string());
        let peer_count = room.peers.len();
        let _ = room.tx.send((
            peer_id.to_string(),
            ServerMessage::PeerJoined {
                peer_id: peer_id.to_string(),
                peer_count,
            },
        ));
        // Subscribe after the announcement so the joiner does not hear itself.
        let rx = room.tx.subscribe();
        Joined {
            rx,
            peer_count,
            initial_sync: room.snapshot(),
        }
    }

    /// Fresh state for a peer already in the room, used to resync it.
    pub fn state(&self, room_id: &str, peer_id: &str) -> Option<(usize, Option<String>)> {
        let room = self.rooms.get(room_id)?;
        if !room.peers.contains(peer_id) {
            return None;
        }
        Some((room.peers.len(), room.snapshot()))
    }

    /// Remove a peer and announce the new count to whoever remains.
    pub fn leave(&self, room_id: &str, peer_id: &str) {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return;
        };
        if !room.peers.remove(peer_id) {
            return;
        }
        if room.peers.is_empty() {
            drop(room);
            self.rooms.remove_if(room_id, |_, room| room.peers.is_empty());
            debug!("Room {} closed", room_id);
            return;
        }
        let peer_count = room.peers.len();
        let _ = room.tx.send((
            peer_id.to_string(),
            ServerMessage::PeerLeft {
                peer_id: peer_id.to_string(),
                peer_count,
            },
        ));
    }

    /// Merge an update into the room document and forward it to the others.
    pub fn sync(&self, room_id: &str, peer_id: &str, data: String) -> Result<(), RejectReason> {
        let bytes = decode_update(&data).ok_or(RejectReason::NotBase64)?;
        self.sync_bytes(room_id, peer_id, &bytes, data)
    }

    /// Same as [`Rooms::sync`] for a raw binary frame.
    pub fn sync_binary(&self, room_id: &str, peer_id: &str, bytes: &[u8]) -> Result<(), RejectReason> {
        self.sync_bytes(room_id, peer_id, bytes, encode_update(bytes))
    }

    fn sync_bytes(
        &self,
        room_id: &str,
        peer_id: &str,
        bytes: &[u8],
        data: String,
    ) -> Result<(), RejectReason> {
        let mut room = self.rooms.get_mut(room_id).ok_or(RejectReason::NotInRoom)?;
        if !room.peers.contains(peer_id) {
            return Err(RejectReason::NotInRoom);
        }
        match room.doc.merge(bytes) {
            Ok(true) => debug!("Update from {} in {} waits on missing changes", peer_id, room_id),
            Ok(false) => {}
            Err(e) => {
                warn!("Rejected update from {} in {}: {}", peer_id, room_id, e);
                return Err(RejectReason::NotLoro(e.to_string()));
            }
        }
        if room.doc.is_empty() {
            if let Err(e) = room.doc.compact() {
                warn!("Failed to compact {}: {}", room_id, e);
            }
        }
        let _ = room.tx.send((
            peer_id.to_string(),
            ServerMessage::Sync {
                from: peer_id.to_string(),
                data,
            },
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrollink_core::{Privilege, Stroke, StrokeColor, StrokePoint, Tool};

    fn stroke(id: &str) -> Stroke {
        let first = StrokePoint::new(10.0, 20.0, 0.5);
        let mut stroke = Stroke {
            id: id.to_string(),
            created_at: 1_000.0,
            tool: Tool::Ink,
            size: 10.0,
            color: StrokeColor::black(),
            points: vec![first, StrokePoint::new(30.0, 40.0, 0.5)],
            done: true,
            bbox: Stroke::placeholder_bbox(first),
            pen: false,
            privilege: Privilege::User,
        };
        stroke.bbox = stroke.precise_bbox(1.0);
        stroke
    }

    fn update_with(id: &str) -> Vec<u8> {
        let mut doc = StrokeDocument::new();
        doc.set(&stroke(id)).unwrap();
        doc.export_snapshot()
    }

    #[test]
    fn test_join_counts_and_announces() {
        let rooms = Rooms::new();
        let mut first = rooms.join("lobby", "a");
        assert_eq!(first.peer_count, 1);
        assert!(first.initial_sync.is_none());

        let mut second = rooms.join("lobby", "b");
        assert_eq!(second.peer_count, 2);
        assert!(second.rx.try_recv().is_err());
        let (from, msg) = first.rx.try_recv().unwrap();
        assert_eq!(from, "b");
        assert_eq!(
            msg,
            ServerMessage::PeerJoined {
                peer_id: "b".to_string(),
                peer_count: 2
            }
        );
    }

    #[test]
    fn test_late_joiner_gets_merged_document() {
        let rooms = Rooms::new();
        let _a = rooms.join("lobby", "a");
        rooms.sync("lobby", "a", encode_update(&update_with("s1"))).unwrap();
        rooms.sync_binary("lobby", "a", &update_with("s2")).unwrap();

        let late = rooms.join("lobby", "b");
        let bytes = decode_update(&late.initial_sync.unwrap()).unwrap();
        let doc = StrokeDocument::from_snapshot(&bytes).unwrap();
        assert_eq!(doc.ids(), vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn test_sync_forwarded_with_sender() {
        let rooms = Rooms::new();
        let _a = rooms.join("lobby", "a");
        let mut b = rooms.join("lobby", "b");
        let data = encode_update(&update_with("s1"));
        rooms.sync("lobby", "a", data.clone()).unwrap();
        assert_eq!(
            b.rx.try_recv().unwrap(),
            (
                "a".to_string(),
                ServerMessage::Sync {
                    from: "a".to_string(),
                    data
                }
            )
        );
    }

    #[test]
    fn test_bad_updates_rejected() {
        let rooms = Rooms::new();
        assert_eq!(
            rooms.sync("lobby", "a", encode_update(b"x")),
            Err(RejectReason::NotInRoom)
        );
        let mut a = rooms.join("lobby", "a");
        assert_eq!(
            rooms.sync("lobby", "a", "***".to_string()),
            Err(RejectReason::NotBase64)
        );
        assert!(matches!(
            rooms.sync_binary("lobby", "a", b"not loro"),
            Err(RejectReason::NotLoro(_))
        ));
        assert!(rooms.sync("lobby", "stranger", encode_update(&update_with("s"))).is_err());
        assert!(a.rx.try_recv().is_err());
    }

    #[test]
    fn test_first_message_after_join_is_someone_else() {
        let rooms = Rooms::new();
        let mut a = rooms.join("lobby", "a");
        let _b = rooms.join("lobby", "b");
        let (from, _) = a.rx.try_recv().unwrap();
        assert_eq!(from, "b");
        assert!(a.rx.try_recv().is_err());
    }

    #[test]
    fn test_emptied_room_still_hands_out_history() {
        let rooms = Rooms::new();
        let _a = rooms.join("lobby", "a");
        let mut writer = StrokeDocument::new();
        writer.set(&stroke("s1")).unwrap();
        rooms.sync_binary("lobby", "a", &writer.export_snapshot()).unwrap();
        let before = writer.version();
        writer.delete("s1").unwrap();
        rooms
            .sync_binary("lobby", "a", &writer.export_updates(&before))
            .unwrap();

        let late = rooms.join("lobby", "b");
        let bytes = decode_update(&late.initial_sync.expect("room has history")).unwrap();
        let mut doc = StrokeDocument::from_snapshot(&bytes).unwrap();
        assert!(doc.is_empty());

        // The next stroke from the original writer applies cleanly.
        let before = writer.version();
        writer.set(&stroke("s2")).unwrap();
        let outcome = doc.import(&writer.export_updates(&before)).unwrap();
        assert!(!outcome.pending);
        assert_eq!(doc.ids(), vec!["s2".to_string()]);
    }

    #[test]
    fn test_state_only_for_members() {
        let rooms = Rooms::new();
        let _a = rooms.join("lobby", "a");
        assert_eq!(rooms.state("lobby", "a"), Some((1, None)));
        assert_eq!(rooms.state("lobby", "b"), None);
        assert_eq!(rooms.state("attic", "a"), None);

        rooms.sync_binary("lobby", "a", &update_with("s1")).unwrap();
        let (count, snapshot) = rooms.state("lobby", "a").unwrap();
        assert_eq!(count, 1);
        assert!(snapshot.is_some());
    }

    #[test]
    fn test_leave_announces_and_closes_empty_rooms() {
        let rooms = Rooms::new();
        let _a = rooms.join("lobby", "a");
        let mut b = rooms.join("lobby", "b");
        rooms.leave("lobby", "a");
        assert_eq!(rooms.peer_count("lobby"), 1);
        assert_eq!(
            b.rx.try_recv().unwrap().1,
            ServerMessage::PeerLeft {
                peer_id: "a".to_string(),
                peer_count: 1
            }
        );

        rooms.leave("lobby", "a");
        rooms.leave("lobby", "b");
        assert_eq!(rooms.len(), 0);
        assert_eq!(rooms.peer_count("lobby"), 0);
    }
}
