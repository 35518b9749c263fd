//! Collaboration management for real-time multi-user drawing.
//!
//! Bridges the engine's local stroke lifecycle to the shared stroke document
//! and turns remote document changes back into external ingestion.

use crate::config::SyncConfig;
use crate::crdt::{StrokeDocument, VersionVector};
use crate::engine::{InkEngine, Origin};
use crate::events::EngineEvent;
use crate::paint::Surface;
use crate::stroke::Stroke;
use crate::sync::{ClientMessage, SyncEvent};

/// Where the manager is in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Not connected and not trying to be.
    Offline,
    /// Transport is connecting or the join is in flight.
    Connecting,
    /// Member of a room.
    Joined,
    /// Disconnected after an idle window. Reconnects on local activity.
    Idle,
}

/// Manages the shared document and the messages exchanged with the relay.
pub struct CollaborationManager {
    doc: StrokeDocument,
    config: SyncConfig,
    link: LinkState,
    room: Option<String>,
    peer_count: usize,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
    /// Version the relay has already seen from us.
    last_sent: VersionVector,
    last_activity: f64,
    active_since_idle: bool,
    /// A rejoin was requested to fetch the room state again.
    resyncing: bool,
}

impl CollaborationManager {
    pub fn new(config: SyncConfig, now: f64) -> Self {
        let doc = StrokeDocument::new();
        let last_sent = doc.version();
        Self {
            doc,
            config,
            link: LinkState::Offline,
            room: None,
            peer_count: 0,
            outgoing: Vec::new(),
            last_sent,
            last_activity: now,
            active_since_idle: false,
            resyncing: false,
        }
    }

    pub fn doc(&self) -> &StrokeDocument {
        &self.doc
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    pub fn current_room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn is_in_room(&self) -> bool {
        self.link == LinkState::Joined
    }

    /// Participants in the room, including us.
    pub fn peer_count(&self) -> usize {
        self.peer_count
    }

    /// Whether the room is busy enough to stay connected while idle.
    pub fn is_popular(&self) -> bool {
        self.peer_count > self.config.popular_room_threshold
    }

    /// The transport is about to connect.
    pub fn connecting(&mut self) {
        self.link = LinkState::Connecting;
        self.active_since_idle = false;
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn queue(&mut self, msg: &ClientMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::warn!("Failed to encode client message: {e}"),
        }
    }

    // --- Local side ---

    /// Mirror a local engine event into the shared document.
    pub fn handle_engine_event(&mut self, event: &EngineEvent, now: f64) {
        match event {
            EngineEvent::StrokeUpdated(stroke) => {
                self.touch(now);
                if let Err(e) = self.doc.set(stroke) {
                    log::warn!("Failed to write stroke {}: {e}", stroke.id);
                }
            }
            // The final snapshot already arrived as an update.
            EngineEvent::StrokeCompleted(_) => {}
            EngineEvent::StrokeDeleted(id) => {
                if let Err(e) = self.doc.delete(id) {
                    log::warn!("Failed to delete stroke {id}: {e}");
                }
            }
        }
    }

    /// Queue one sync message carrying every local change since the last one.
    pub fn publish(&mut self) {
        if !self.is_in_room() {
            return;
        }
        let version = self.doc.version();
        if version == self.last_sent {
            return;
        }
        let bytes = self.doc.export_updates(&self.last_sent);
        self.last_sent = version;
        self.queue(&ClientMessage::sync(&bytes));
    }

    fn touch(&mut self, now: f64) {
        self.last_activity = now;
        if self.link == LinkState::Idle {
            self.active_since_idle = true;
        }
    }

    // --- Remote side ---

    /// React to a transport event, ingesting remote strokes into `engine`.
    pub fn handle_sync_event<S: Surface>(&mut self, event: SyncEvent, engine: &mut InkEngine<S>) {
        match event {
            SyncEvent::Connected => {
                let room = self.config.room.clone();
                log::info!("Connected, joining room {room}");
                self.queue(&ClientMessage::Join { room });
            }
            SyncEvent::Disconnected => {
                log::info!("Disconnected from relay");
                self.room = None;
                self.resyncing = false;
                if self.link != LinkState::Idle {
                    self.link = LinkState::Offline;
                }
            }
            SyncEvent::JoinedRoom {
                room,
                peer_count,
                initial_sync,
            } => {
                log::info!("Joined room {room} with {peer_count} participant(s)");
                self.room = Some(room);
                self.peer_count = peer_count;
                self.link = LinkState::Joined;
                self.resyncing = false;
                self.replay(initial_sync.as_deref(), engine);
            }
            SyncEvent::PeerJoined {
                peer_id,
                peer_count,
            } => {
                log::debug!("Peer {peer_id} joined ({peer_count} present)");
                self.peer_count = peer_count;
            }
            SyncEvent::PeerLeft {
                peer_id,
                peer_count,
            } => {
                log::debug!("Peer {peer_id} left ({peer_count} present)");
                self.peer_count = peer_count;
            }
            SyncEvent::SyncReceived { from, data } => {
                self.import(&from, &data, engine);
            }
            SyncEvent::Error { message } => {
                log::warn!("Sync error: {message}");
                if self.link == LinkState::Connecting {
                    self.link = LinkState::Offline;
                }
            }
        }
    }

    /// Rebuild the document from the room state and push it into the engine.
    /// Local strokes the room does not know yet are written back.
    fn replay<S: Surface>(&mut self, initial: Option<&[u8]>, engine: &mut InkEngine<S>) {
        self.doc = StrokeDocument::new();
        if let Some(bytes) = initial {
            if let Err(e) = self.doc.import(bytes) {
                log::warn!("Failed to import room state: {e}");
            }
        }
        self.last_sent = self.doc.version();

        let mut remote: Vec<Stroke> = Vec::new();
        self.doc.for_each(|id, decoded| match decoded {
            Ok(stroke) => remote.push(stroke),
            Err(e) => log::debug!("Skipping stroke {id}: {e}"),
        });
        let count = remote.len();
        for stroke in remote {
            engine.put_stroke(stroke, Origin::External);
        }

        let missing: Vec<Stroke> = engine
            .strokes()
            .filter(|s| !self.doc.contains(&s.id))
            .cloned()
            .collect();
        for stroke in &missing {
            if let Err(e) = self.doc.set(stroke) {
                log::warn!("Failed to write stroke {}: {e}", stroke.id);
            }
        }
        log::info!(
            "Replayed {count} stroke(s), republishing {} local",
            missing.len()
        );
        self.publish();
    }

    fn import<S: Surface>(&mut self, from: &str, data: &[u8], engine: &mut InkEngine<S>) {
        // Local changes go out first so they are not folded into last_sent.
        self.publish();
        let outcome = match self.doc.import(data) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Rejected update from {from}: {e}");
                self.request_resync();
                return;
            }
        };
        self.last_sent = self.doc.version();
        if outcome.pending {
            log::info!("Update from {from} depends on changes we never saw");
            self.request_resync();
        }

        for id in &outcome.changed {
            match self.doc.get(id) {
                Ok(Some(stroke)) => {
                    engine.put_stroke(stroke, Origin::External);
                }
                Ok(None) => {}
                Err(e) => log::debug!("Skipping stroke {id} until it decodes: {e}"),
            }
        }
        if !outcome.removed.is_empty() {
            log::trace!("{} stroke(s) removed remotely", outcome.removed.len());
        }
    }

    /// Join the current room again so the relay sends its full state.
    fn request_resync(&mut self) {
        if self.resyncing || !self.is_in_room() {
            return;
        }
        if let Some(room) = self.room.clone() {
            self.resyncing = true;
            self.queue(&ClientMessage::Join { room });
        }
    }

    pub fn is_resyncing(&self) -> bool {
        self.resyncing
    }

    // --- Lifecycle ---

    /// Whether the idle window has passed and the room is not popular.
    pub fn should_idle_disconnect(&self, now: f64) -> bool {
        self.is_in_room()
            && !self.is_popular()
            && now - self.last_activity > self.config.idle_disconnect_secs as f64 * 1000.0
    }

    /// Record an idle disconnect. The transport is closed by the caller.
    pub fn idle_disconnected(&mut self) {
        log::info!("Idle, leaving room");
        self.queue(&ClientMessage::Leave);
        self.room = None;
        self.link = LinkState::Idle;
        self.active_since_idle = false;
    }

    /// Local activity happened after an idle disconnect.
    pub fn wants_reconnect(&self) -> bool {
        self.link == LinkState::Idle && self.active_since_idle
    }

    /// Leave unconditionally, e.g. when the process is closing.
    pub fn shutdown(&mut self) {
        if self.is_in_room() {
            self.publish();
            self.queue(&ClientMessage::Leave);
        }
        self.room = None;
        self.link = LinkState::Offline;
    }
}

impl std::fmt::Debug for CollaborationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaborationManager")
            .field("link", &self.link)
            .field("room", &self.room)
            .field("peer_count", &self.peer_count)
            .field("doc", &self.doc)
            .finish_non_exhaustive()
    }
}
