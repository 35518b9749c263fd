//! Time based scroll model.
//!
//! The canvas never scrolls by user input. Instead a virtual vertical offset
//! grows linearly with wall-clock time:
//!
//! ```text
//! offset(t) = (t - start) / (frame_interval / speed)
//! ```
//!
//! Stroke points are stored in scroll space (`screen_y + offset(capture time)`),
//! so translating by `-offset(now)` puts every stroke at its current screen
//! position and older strokes drift further up.

use crate::clock::utc_midnight;
use crate::config::{EngineConfig, ScrollAnchor};
use kurbo::Affine;

/// Converts wall-clock time into a scroll offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollModel {
    start_time: f64,
    frame_interval_ms: f64,
    speed: f64,
}

impl ScrollModel {
    /// Create a model anchored at `start_time` (epoch milliseconds).
    pub fn new(start_time: f64, frame_interval_ms: f64, speed: f64) -> Self {
        Self {
            start_time,
            frame_interval_ms: frame_interval_ms.max(f64::EPSILON),
            speed,
        }
    }

    /// Create a model from configuration, resolving the anchor against `now`.
    pub fn from_config(config: &EngineConfig, now: f64) -> Self {
        let start_time = match config.scroll_anchor {
            ScrollAnchor::UtcMidnight => utc_midnight(now),
            ScrollAnchor::Epoch { epoch_ms } => epoch_ms,
            ScrollAnchor::Now => now,
        };
        Self::new(start_time, config.frame_interval_ms, config.speed)
    }

    /// The fixed anchor of the coordinate system.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Scroll distance at wall-clock `time`.
    pub fn offset(&self, time: f64) -> f64 {
        (time - self.start_time) / (self.frame_interval_ms / self.speed)
    }

    /// Engine-relative timestamp, as stored in `Stroke::created_at`.
    pub fn relative(&self, time: f64) -> f64 {
        time - self.start_time
    }

    /// Scroll offset at an engine-relative timestamp.
    pub fn offset_at_relative(&self, created_at: f64) -> f64 {
        self.offset(self.start_time + created_at)
    }

    /// How far a stroke created at `created_at` has scrolled by `now`.
    pub fn scrolled_since(&self, created_at: f64, now: f64) -> f64 {
        self.offset(now) - self.offset_at_relative(created_at)
    }

    /// Transform from scroll space to screen space at `now`.
    pub fn screen_transform(&self, now: f64) -> Affine {
        Affine::translate((0.0, -self.offset(now)))
    }

    /// Whether a shape whose lowest edge sits at `max_y` (scroll space) has
    /// not yet passed the top edge of the screen. Touching the edge counts.
    pub fn is_on_screen(&self, max_y: f64, now: f64) -> bool {
        max_y - self.offset(now) >= 0.0
    }
}
