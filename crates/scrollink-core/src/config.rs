//! Tunable configuration for the engine, the merge layer and persistence.
//!
//! Every threshold that varied between historical revisions of the canvas
//! (eraser budget, idle disconnect, popular room size, long stroke ceiling)
//! lives here instead of being hard-coded at the call site.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where the scroll coordinate system is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScrollAnchor {
    /// Midnight UTC of the day the engine starts. Participants of the same
    /// room share this anchor, so their scroll spaces line up.
    #[default]
    UtcMidnight,
    /// A fixed wall-clock instant in milliseconds since the Unix epoch.
    Epoch { epoch_ms: f64 },
    /// The instant the engine is constructed.
    Now,
}

/// Engine (capture, render loop, cache) parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scroll speed multiplier. Observed useful range is 0.1 to 2.0.
    pub speed: f64,
    /// Nominal frame duration used by the scroll formula.
    pub frame_interval_ms: f64,
    /// Minimum wall-clock time between throttled ticks.
    pub tick_interval_ms: f64,
    /// Device pixel ratio of the mounted surface.
    pub device_pixel_ratio: f64,
    /// Point ceiling after which an active stroke is split.
    pub max_points_per_stroke: usize,
    /// Number of throttled ticks an eraser may stay down in one go.
    pub eraser_budget_ticks: u32,
    /// Pressure reported for devices without pressure sensing.
    pub placeholder_pressure: f64,
    /// Anchor of the scroll coordinate system.
    pub scroll_anchor: ScrollAnchor,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            speed: 0.618,
            frame_interval_ms: 16.0,
            tick_interval_ms: 16.0,
            device_pixel_ratio: 1.0,
            max_points_per_stroke: 1000,
            eraser_budget_ticks: 180,
            placeholder_pressure: 0.5,
            scroll_anchor: ScrollAnchor::UtcMidnight,
        }
    }
}

/// Merge layer and transport parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Relay endpoint, e.g. `ws://localhost:3030/ws`.
    pub server_url: String,
    /// Room joined on mount.
    pub room: String,
    /// Seconds without local stroke activity before disconnecting.
    pub idle_disconnect_secs: u64,
    /// Participant count above which idle disconnect is suppressed.
    pub popular_room_threshold: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:3030/ws".to_string(),
            room: "lobby".to_string(),
            idle_disconnect_secs: 45,
            popular_room_threshold: 5,
        }
    }
}

/// Persistence parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Milliseconds between flushes of completed strokes.
    pub flush_interval_ms: u64,
    /// Directory for the file store; platform data dir when unset.
    pub data_dir: Option<PathBuf>,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 5_000,
            data_dir: None,
        }
    }
}

/// Top level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScrollinkConfig {
    pub engine: EngineConfig,
    pub sync: SyncConfig,
    pub persist: PersistConfig,
}

impl ScrollinkConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Apply `SCROLLINK_*` environment overrides on top of this configuration.
    pub fn with_env_overrides(mut self) -> Self {
        let engine = &mut self.engine;
        engine.speed = env_parse("SCROLLINK_SPEED", engine.speed);
        engine.device_pixel_ratio = env_parse("SCROLLINK_DPR", engine.device_pixel_ratio);
        engine.max_points_per_stroke =
            env_parse("SCROLLINK_MAX_POINTS_PER_STROKE", engine.max_points_per_stroke);
        engine.eraser_budget_ticks =
            env_parse("SCROLLINK_ERASER_BUDGET_TICKS", engine.eraser_budget_ticks);

        let sync = &mut self.sync;
        if let Ok(url) = std::env::var("SCROLLINK_SERVER_URL") {
            sync.server_url = url;
        }
        if let Ok(room) = std::env::var("SCROLLINK_ROOM") {
            sync.room = room;
        }
        sync.idle_disconnect_secs =
            env_parse("SCROLLINK_IDLE_DISCONNECT_SECS", sync.idle_disconnect_secs);
        sync.popular_room_threshold =
            env_parse("SCROLLINK_POPULAR_ROOM_THRESHOLD", sync.popular_room_threshold);

        let persist = &mut self.persist;
        persist.flush_interval_ms =
            env_parse("SCROLLINK_FLUSH_INTERVAL_MS", persist.flush_interval_ms);
        if let Ok(dir) = std::env::var("SCROLLINK_DATA_DIR") {
            persist.data_dir = Some(PathBuf::from(dir));
        }
        self
    }
}

/// Read an env var and parse it, falling back to `default` when missing or invalid.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
