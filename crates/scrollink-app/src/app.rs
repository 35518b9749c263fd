//! Core application state and lifecycle.

use crate::frames::IntervalFrames;
use crate::script::ScribbleScript;
use kurbo::Size;
use scrollink_core::{
    ConfigError, FileStore, InkEngine, InkSession, NativeWebSocket, ScrollinkConfig, StorageError,
    StrokeStore, SystemClock, Clock, SyncTransport, Viewport, config::env_parse,
};
use scrollink_render::VelloSurface;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Settings for one headless run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub scrollink: ScrollinkConfig,
    /// Logical size of the canvas parent.
    pub width: f64,
    pub height: f64,
    /// Strokes the script draws before the app only watches.
    pub strokes: u64,
    /// Seconds to run before shutting down.
    pub run_secs: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scrollink: ScrollinkConfig::default(),
            width: 1280.0,
            height: 720.0,
            strokes: 8,
            run_secs: 30.0,
        }
    }
}

impl AppConfig {
    /// Read a JSON file holding the canvas configuration plus the app keys.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.scrollink = self.scrollink.with_env_overrides();
        self.width = env_parse("SCROLLINK_WIDTH", self.width);
        self.height = env_parse("SCROLLINK_HEIGHT", self.height);
        self.strokes = env_parse("SCROLLINK_STROKES", self.strokes);
        self.run_secs = env_parse("SCROLLINK_RUN_SECS", self.run_secs);
        self
    }

    fn viewport(&self) -> Viewport {
        Viewport::mount(
            Size::new(self.width, self.height),
            self.scrollink.engine.device_pixel_ratio,
        )
    }
}

/// Counters reported when a run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub restored: usize,
    pub persisted: usize,
    pub live_strokes: usize,
}

/// A headless participant.
pub struct App<T: SyncTransport> {
    session: InkSession<VelloSurface, T>,
    frames: IntervalFrames,
    script: ScribbleScript,
    viewport: Viewport,
    frame_count: u64,
}

impl App<NativeWebSocket> {
    /// Run against the configured relay and the local file store until
    /// `run_secs` elapse.
    pub async fn run(config: AppConfig) {
        let store = match FileStore::from_config(&config.scrollink.persist) {
            Ok(store) => store,
            Err(e) => {
                log::error!("Cannot open stroke store: {e}");
                return;
            }
        };
        log::info!("Storing strokes in {}", store.base_path().display());

        let mut app = App::new(&config, NativeWebSocket::new());
        let deadline = app.now_ms() + config.run_secs * 1000.0;
        match app.run_until(&store, deadline, true).await {
            Ok(summary) => log::info!(
                "Done after {} frame(s): {} restored, {} persisted, {} on screen",
                summary.frames,
                summary.restored,
                summary.persisted,
                summary.live_strokes
            ),
            Err(e) => log::error!("Run failed: {e}"),
        }
    }
}

impl<T: SyncTransport> App<T> {
    pub fn new(config: &AppConfig, transport: T) -> Self {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, transport: T, clock: Arc<dyn Clock>) -> Self {
        let frames = IntervalFrames::new(clock.clone(), config.scrollink.engine.frame_interval_ms);
        let viewport = config.viewport();
        let engine = InkEngine::new(
            config.scrollink.engine.clone(),
            clock,
            VelloSurface::new(viewport.backing_size()),
            Box::new(frames.clone()),
        );
        Self {
            session: InkSession::new(&config.scrollink, engine, transport),
            frames,
            script: ScribbleScript::new(viewport.parent_size(), config.strokes),
            viewport,
            frame_count: 0,
        }
    }

    pub fn session(&self) -> &InkSession<VelloSurface, T> {
        &self.session
    }

    fn now_ms(&self) -> f64 {
        self.session.engine().now_ms()
    }

    /// Feed the script and render one frame if it is due. Returns whether
    /// a frame ran.
    pub fn tick(&mut self) -> bool {
        let Some(handle) = self.frames.due() else {
            return false;
        };
        let step = self.script.step(self.frame_count);
        let engine = self.session.engine_mut();
        if let Some(key) = step.key {
            engine.style_mut().handle_key(key);
        }
        if let Some(event) = step.pointer {
            engine.handle_pointer(&event);
        }
        self.session.on_animation_frame(handle);
        // The scene would go to a vello renderer here; headless runs drop it.
        let _scene = self.session.engine_mut().surface_mut().take_scene();
        self.frame_count += 1;
        true
    }

    /// Restore, mount, animate until `deadline_ms`, then shut down.
    /// `sleep` paces frames in real time; tests drive without it.
    pub async fn run_until<St: StrokeStore + ?Sized>(
        &mut self,
        store: &St,
        deadline_ms: f64,
        sleep: bool,
    ) -> Result<RunSummary, StorageError> {
        let restored = self.session.restore(store).await?;
        self.session.mount(&self.viewport);

        let mut persisted = 0;
        while self.now_ms() < deadline_ms {
            if sleep {
                if let Some(wait) = self.frames.wait() {
                    std::thread::sleep(wait);
                }
            }
            if self.tick() {
                persisted += self.session.flush(store).await.unwrap_or_else(|e| {
                    log::warn!("Flush failed: {e}");
                    0
                });
            }
        }

        persisted += self.session.shutdown(store).await?;
        Ok(RunSummary {
            frames: self.frame_count,
            restored,
            persisted,
            live_strokes: self.session.engine().stroke_count(),
        })
    }
}

impl<T: SyncTransport> std::fmt::Debug for App<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("viewport", &self.viewport)
            .field("frames", &self.frame_count)
            .finish()
    }
}
