//! One participant: an engine, its merge layer, its transport and its
//! persistence queue, wired together explicitly.

use crate::collaboration::CollaborationManager;
use crate::config::ScrollinkConfig;
use crate::engine::{InkEngine, Origin};
use crate::events::EngineEvent;
use crate::frame::FrameHandle;
use crate::paint::Surface;
use crate::storage::{FlushQueue, StorageError, StorageResult, StrokeStore};
use crate::sync::SyncTransport;
use crate::viewport::Viewport;
use std::sync::mpsc;

/// Routes engine notifications to sync and persistence and remote changes
/// back into the engine. Everything runs on the caller's thread.
pub struct InkSession<S: Surface, T: SyncTransport> {
    engine: InkEngine<S>,
    collab: CollaborationManager,
    transport: T,
    flush: FlushQueue,
    events: mpsc::Receiver<EngineEvent>,
}

impl<S: Surface, T: SyncTransport> InkSession<S, T> {
    pub fn new(config: &ScrollinkConfig, mut engine: InkEngine<S>, transport: T) -> Self {
        let now = engine.now_ms();
        let events = engine.subscribe();
        Self {
            collab: CollaborationManager::new(config.sync.clone(), now),
            flush: FlushQueue::new(config.sync.room.clone(), config.persist.flush_interval_ms, now),
            engine,
            transport,
            events,
        }
    }

    pub fn engine(&self) -> &InkEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut InkEngine<S> {
        &mut self.engine
    }

    pub fn collab(&self) -> &CollaborationManager {
        &self.collab
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn flush_queue(&self) -> &FlushQueue {
        &self.flush
    }

    /// Size the surface, start rendering and connect.
    pub fn mount(&mut self, viewport: &Viewport) {
        self.resize(viewport);
        self.engine.start();
        self.connect();
    }

    pub fn resize(&mut self, viewport: &Viewport) {
        self.engine
            .resize(viewport.backing_size(), viewport.device_pixel_ratio());
    }

    /// Open the transport to the configured relay. An empty URL keeps the
    /// session offline.
    pub fn connect(&mut self) {
        let url = self.collab.config().server_url.clone();
        if url.is_empty() {
            log::info!("No relay configured, staying offline");
            return;
        }
        match self.transport.connect(&url) {
            Ok(()) => self.collab.connecting(),
            Err(e) => log::warn!("Cannot connect to {url}: {e}"),
        }
    }

    /// Run one engine frame, then exchange everything it produced.
    pub fn on_animation_frame(&mut self, handle: FrameHandle) {
        self.engine.on_animation_frame(handle);
        self.pump();
    }

    /// Deliver remote events, route local events and send what is queued.
    pub fn pump(&mut self) {
        for event in self.transport.poll_events() {
            self.collab.handle_sync_event(event, &mut self.engine);
        }

        let now = self.engine.now_ms();
        for event in self.events.try_iter() {
            self.collab.handle_engine_event(&event, now);
            if let EngineEvent::StrokeCompleted(stroke) = &event {
                self.flush.push(stroke);
            }
        }
        self.collab.publish();

        if self.collab.should_idle_disconnect(now) {
            self.collab.idle_disconnected();
            self.send_outgoing();
            self.transport.disconnect();
        } else if self.collab.wants_reconnect() {
            log::info!("Activity after idle, reconnecting");
            self.connect();
        }
        self.send_outgoing();
    }

    fn send_outgoing(&mut self) {
        for msg in self.collab.take_outgoing() {
            if let Err(e) = self.transport.send(&msg) {
                log::debug!("Dropping outgoing message: {e}");
            }
        }
    }

    /// Write completed strokes to `store` if the flush interval elapsed.
    pub async fn flush<St: StrokeStore + ?Sized>(&mut self, store: &St) -> StorageResult<usize> {
        let now = self.engine.now_ms();
        self.flush.flush_if_due(store, now).await
    }

    /// Load strokes from `store` that are still on screen.
    pub async fn restore<St: StrokeStore + ?Sized>(&mut self, store: &St) -> StorageResult<usize> {
        let now = self.engine.now_ms();
        let min_y = self.engine.scroll().offset(now);
        let rows = match store.load_visible(self.flush.room(), min_y).await {
            Ok(rows) => rows,
            Err(StorageError::NotFound(_)) => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut restored = 0;
        for row in rows {
            if self.engine.put_stroke(row.stroke, Origin::External) {
                restored += 1;
            }
        }
        log::info!("Restored {restored} stroke(s) from storage");
        Ok(restored)
    }

    /// Leave the room, close the transport, write everything queued and
    /// stop rendering.
    pub async fn shutdown<St: StrokeStore + ?Sized>(&mut self, store: &St) -> StorageResult<usize> {
        self.pump();
        self.collab.shutdown();
        self.send_outgoing();
        self.transport.disconnect();
        self.engine.stop();
        let now = self.engine.now_ms();
        self.flush.flush(store, now).await
    }
}

impl<S, T> std::fmt::Debug for InkSession<S, T>
where
    S: Surface + std::fmt::Debug,
    T: SyncTransport,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InkSession")
            .field("engine", &self.engine)
            .field("collab", &self.collab)
            .field("connection", &self.transport.state())
            .field("pending_flush", &self.flush.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaboration::LinkState;
    use crate::config::{ScrollAnchor, SyncConfig};
    use crate::frame::ManualFrames;
    use crate::input::PointerSample;
    use crate::paint::RecordingSurface;
    use crate::storage::testing::{block_on, done_stroke};
    use crate::storage::{MemoryStore, StrokeRow};
    use crate::sync::{ConnectionState, SyncError, SyncEvent, SyncResult};
    use kurbo::Size;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    /// Transport whose traffic is inspected and injected by the test.
    #[derive(Clone, Default)]
    struct Loopback {
        inner: Rc<RefCell<LoopbackState>>,
    }

    #[derive(Default)]
    struct LoopbackState {
        connected: bool,
        connects: usize,
        sent: Vec<String>,
        inbox: Vec<SyncEvent>,
    }

    impl Loopback {
        fn deliver(&self, event: SyncEvent) {
            self.inner.borrow_mut().inbox.push(event);
        }

        fn sent(&self) -> Vec<String> {
            std::mem::take(&mut self.inner.borrow_mut().sent)
        }
    }

    impl SyncTransport for Loopback {
        fn connect(&mut self, _url: &str) -> SyncResult<()> {
            let mut state = self.inner.borrow_mut();
            state.connected = true;
            state.connects += 1;
            state.inbox.push(SyncEvent::Connected);
            Ok(())
        }

        fn disconnect(&mut self) {
            let mut state = self.inner.borrow_mut();
            if state.connected {
                state.connected = false;
                state.inbox.push(SyncEvent::Disconnected);
            }
        }

        fn send(&self, msg: &str) -> SyncResult<()> {
            let mut state = self.inner.borrow_mut();
            if !state.connected {
                return Err(SyncError::NotConnected);
            }
            state.sent.push(msg.to_string());
            Ok(())
        }

        fn poll_events(&mut self) -> Vec<SyncEvent> {
            std::mem::take(&mut self.inner.borrow_mut().inbox)
        }

        fn state(&self) -> ConnectionState {
            if self.inner.borrow().connected {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            }
        }
    }

    struct Fixture {
        session: InkSession<RecordingSurface, Loopback>,
        wire: Loopback,
        clock: ManualClock,
        frames: ManualFrames,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_server("ws://relay.test/ws")
        }

        fn with_server(url: &str) -> Self {
            let clock = ManualClock::new(0.0);
            let frames = ManualFrames::new();
            let mut config = ScrollinkConfig::default();
            config.engine.speed = 1.0;
            config.engine.scroll_anchor = ScrollAnchor::Now;
            config.sync = SyncConfig {
                server_url: url.into(),
                room: "lobby".into(),
                idle_disconnect_secs: 1,
                popular_room_threshold: 5,
            };
            config.persist.flush_interval_ms = 100;
            let engine = InkEngine::new(
                config.engine.clone(),
                Arc::new(clock.clone()),
                RecordingSurface::new(Size::new(10.0, 10.0)),
                Box::new(frames.clone()),
            );
            let wire = Loopback::default();
            let session = InkSession::new(&config, engine, wire.clone());
            Self {
                session,
                wire,
                clock,
                frames,
            }
        }

        fn mount(&mut self) {
            self.session
                .mount(&Viewport::mount(Size::new(400.0, 300.0), 2.0));
            self.session.pump();
            self.wire.deliver(SyncEvent::JoinedRoom {
                room: "lobby".into(),
                peer_count: 1,
                initial_sync: None,
            });
            self.session.pump();
        }

        fn frame(&mut self, ms: f64) {
            self.clock.advance(ms);
            let handle = self.frames.next_frame().expect("pending frame");
            self.session.on_animation_frame(handle);
        }

        fn draw(&mut self) {
            let engine = self.session.engine_mut();
            engine.pointer_down(&PointerSample::mouse(50.0, 50.0));
            self.frame(20.0);
            self.session
                .engine_mut()
                .pointer_move(&PointerSample::mouse(60.0, 60.0));
            self.frame(20.0);
            self.session
                .engine_mut()
                .pointer_up(&PointerSample::mouse(60.0, 60.0));
            self.frame(20.0);
        }
    }

    #[test]
    fn test_mount_sizes_surface_and_joins() {
        let mut fx = Fixture::new();
        fx.session
            .mount(&Viewport::mount(Size::new(400.0, 300.0), 2.0));
        assert_eq!(fx.session.engine().surface().size(), Size::new(800.0, 600.0));
        assert!(fx.session.engine().is_running());

        fx.session.pump();
        assert_eq!(fx.wire.sent(), vec![r#"{"type":"join","room":"lobby"}"#.to_string()]);
    }

    #[test]
    fn test_local_stroke_synced_and_queued_for_storage() {
        let mut fx = Fixture::new();
        fx.mount();
        fx.wire.sent();
        fx.draw();

        let sent = fx.wire.sent();
        assert!(!sent.is_empty());
        assert!(sent.iter().all(|m| m.contains(r#""type":"sync""#)));
        assert_eq!(fx.session.flush_queue().len(), 1);
        assert_eq!(fx.session.collab().doc().len(), 1);
    }

    #[test]
    fn test_flush_writes_completed_strokes() {
        let mut fx = Fixture::new();
        fx.mount();
        fx.draw();
        let store = MemoryStore::new();
        fx.clock.advance(200.0);
        assert_eq!(block_on(fx.session.flush(&store)).unwrap(), 1);
        assert_eq!(store.len("lobby"), 1);
        assert!(fx.session.flush_queue().is_empty());
    }

    #[test]
    fn test_restore_loads_visible_strokes() {
        let mut fx = Fixture::new();
        let store = MemoryStore::new();
        let rows = vec![
            StrokeRow::new("lobby", done_stroke("a", 0.0, 100.0)),
            StrokeRow::new("lobby", done_stroke("b", 0.0, 200.0)),
        ];
        block_on(store.upsert("lobby", &rows)).unwrap();

        assert_eq!(block_on(fx.session.restore(&store)).unwrap(), 2);
        assert_eq!(fx.session.engine().stroke_count(), 2);
        assert_eq!(block_on(fx.session.restore(&MemoryStore::new())).unwrap(), 0);
    }

    #[test]
    fn test_idle_disconnect_and_reconnect_on_activity() {
        let mut fx = Fixture::new();
        fx.mount();
        fx.wire.sent();

        fx.frame(1500.0);
        assert_eq!(fx.wire.sent(), vec![r#"{"type":"leave"}"#.to_string()]);
        assert_eq!(fx.session.transport().state(), ConnectionState::Disconnected);
        fx.frame(20.0);
        assert_eq!(fx.session.collab().link(), LinkState::Idle);

        fx.draw();
        assert_eq!(fx.wire.inner.borrow().connects, 2);
        assert_eq!(fx.session.collab().link(), LinkState::Connecting);
        fx.session.pump();
        assert!(fx.wire.sent().contains(&r#"{"type":"join","room":"lobby"}"#.to_string()));
    }

    #[test]
    fn test_shutdown_leaves_and_flushes() {
        let mut fx = Fixture::new();
        fx.mount();
        fx.draw();
        fx.wire.sent();

        let store = MemoryStore::new();
        assert_eq!(block_on(fx.session.shutdown(&store)).unwrap(), 1);
        assert_eq!(fx.wire.sent(), vec![r#"{"type":"leave"}"#.to_string()]);
        assert!(!fx.session.engine().is_running());
        assert_eq!(store.len("lobby"), 1);
    }

    #[test]
    fn test_offline_without_server_url() {
        let mut fx = Fixture::with_server("");
        fx.session
            .mount(&Viewport::mount(Size::new(400.0, 300.0), 1.0));
        assert_eq!(fx.wire.inner.borrow().connects, 0);
        assert_eq!(fx.session.collab().link(), LinkState::Offline);
    }
}
