//! Pointer session state machine.
//!
//! [`StrokeCapture`] decides what a pointer event means for the stroke being
//! drawn. It never touches strokes itself: each handler returns a
//! [`CaptureCommand`] that the engine carries out, and the current pointer
//! sample is pulled by the engine once per frame.

use crate::config::EngineConfig;
use crate::input::PointerSample;
use crate::stroke::{StrokePoint, Tool};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Pointing,
}

/// What the engine should do in response to an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    /// Nothing to do.
    Ignore,
    /// The pointer sample moved. The next frame appends it.
    Track,
    /// Start a new stroke at the current sample.
    Begin,
    /// Discard the current stroke's points and continue from the sample.
    Restart,
    /// Finish the current stroke.
    Complete,
}

/// Result of one throttled tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// The eraser budget ran out; the session is already idle.
    ForceComplete,
}

/// Pointer session for one local participant.
#[derive(Debug, Clone)]
pub struct StrokeCapture {
    state: CaptureState,
    pointing_id: Option<i64>,
    pen_mode: bool,
    /// Latest sample in device pixels, screen space.
    sample: StrokePoint,
    device_pixel_ratio: f64,
    placeholder_pressure: f64,
    eraser_budget: u32,
    eraser_budget_max: u32,
}

impl StrokeCapture {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: CaptureState::Idle,
            pointing_id: None,
            pen_mode: false,
            sample: StrokePoint::new(0.0, 0.0, config.placeholder_pressure),
            device_pixel_ratio: config.device_pixel_ratio,
            placeholder_pressure: config.placeholder_pressure,
            eraser_budget: config.eraser_budget_ticks,
            eraser_budget_max: config.eraser_budget_ticks,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_pointing(&self) -> bool {
        self.state == CaptureState::Pointing
    }

    /// Whether the current session reports genuine pressure.
    pub fn is_pen(&self) -> bool {
        self.pen_mode
    }

    pub fn eraser_budget(&self) -> u32 {
        self.eraser_budget
    }

    pub fn set_device_pixel_ratio(&mut self, device_pixel_ratio: f64) {
        self.device_pixel_ratio = device_pixel_ratio;
    }

    /// Latest pointer sample in screen space.
    pub fn sample(&self) -> StrokePoint {
        self.sample
    }

    /// Latest pointer sample moved into scroll space.
    pub fn sample_at(&self, offset: f64) -> StrokePoint {
        StrokePoint::new(self.sample.x, self.sample.y + offset, self.sample.pressure)
    }

    pub fn pointer_down(&mut self, sample: &PointerSample, tool: Tool) -> CaptureCommand {
        if self.state == CaptureState::Pointing {
            return CaptureCommand::Ignore;
        }
        if tool == Tool::Eraser && self.eraser_budget == 0 {
            log::debug!("Eraser budget exhausted, ignoring pointer down");
            return CaptureCommand::Ignore;
        }
        self.record(sample);
        self.pointing_id = Some(sample.pointer_id);
        self.pen_mode = sample.is_pen();
        self.state = CaptureState::Pointing;
        CaptureCommand::Begin
    }

    pub fn pointer_move(&mut self, sample: &PointerSample) -> CaptureCommand {
        match self.state {
            CaptureState::Idle => {
                self.record(sample);
                CaptureCommand::Ignore
            }
            CaptureState::Pointing if self.pen_mode => {
                if !sample.is_pen() {
                    return CaptureCommand::Ignore;
                }
                self.record(sample);
                CaptureCommand::Track
            }
            CaptureState::Pointing if sample.is_pen() => {
                // A pen took over a touch or mouse session.
                log::debug!("Pen interrupted pointer {:?}, restarting stroke", self.pointing_id);
                self.pen_mode = true;
                self.pointing_id = Some(sample.pointer_id);
                self.record(sample);
                CaptureCommand::Restart
            }
            CaptureState::Pointing => {
                if self.pointing_id != Some(sample.pointer_id) {
                    return CaptureCommand::Ignore;
                }
                self.record(sample);
                CaptureCommand::Track
            }
        }
    }

    pub fn pointer_up(&mut self, sample: &PointerSample) -> CaptureCommand {
        if self.state == CaptureState::Idle {
            return CaptureCommand::Ignore;
        }
        if self.pen_mode && !sample.is_pen() {
            return CaptureCommand::Ignore;
        }
        if !self.pen_mode && self.pointing_id != Some(sample.pointer_id) {
            return CaptureCommand::Ignore;
        }
        self.record(sample);
        self.reset();
        CaptureCommand::Complete
    }

    /// Apply the eraser budget for one throttled tick. `active_tool` is the
    /// tool of the stroke being drawn, if any.
    pub fn on_tick(&mut self, active_tool: Option<Tool>) -> TickOutcome {
        if self.state != CaptureState::Pointing {
            return TickOutcome::Continue;
        }
        match active_tool {
            Some(Tool::Eraser) => {
                self.eraser_budget = self.eraser_budget.saturating_sub(1);
                if self.eraser_budget == 0 {
                    log::debug!("Eraser budget reached zero, completing stroke");
                    self.reset();
                    return TickOutcome::ForceComplete;
                }
            }
            Some(Tool::Ink | Tool::Highlighter) => {
                self.eraser_budget = (self.eraser_budget + 1).min(self.eraser_budget_max);
            }
            None => {}
        }
        TickOutcome::Continue
    }

    /// Abandon the session without completing anything.
    pub fn cancel(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.state = CaptureState::Idle;
        self.pointing_id = None;
        self.pen_mode = false;
    }

    fn record(&mut self, sample: &PointerSample) {
        let pressure = if sample.is_pen() {
            sample.pressure.unwrap_or(self.placeholder_pressure)
        } else {
            self.placeholder_pressure
        };
        self.sample = StrokePoint::new(
            sample.position.x * self.device_pixel_ratio,
            sample.position.y * self.device_pixel_ratio,
            pressure,
        );
    }
}
