//! The ink engine: stroke table, capture session and render loop.
//!
//! One [`InkEngine`] owns one drawing surface. The host forwards pointer
//! events and delivers animation frames; everything else (appending samples,
//! splitting long strokes, the eraser budget, culling, painting) happens
//! inside [`InkEngine::on_animation_frame`].
//!
//! Each frame:
//!
//! 1. If a stroke is active, append the current pointer sample to it.
//! 2. If more than `tick_interval_ms` passed since the last tick, publish the
//!    active stroke, apply the eraser budget and cull off-screen strokes.
//! 3. Repaint everything, oldest first, privileged strokes last.
//! 4. Request the next frame.

use crate::cache;
use crate::capture::{CaptureCommand, StrokeCapture, TickOutcome};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventBus};
use crate::frame::{FrameHandle, FrameScheduler};
use crate::input::{PointerEvent, PointerSample};
use crate::paint::{Composite, StrokePainter, Surface};
use crate::scroll::ScrollModel;
use crate::stroke::{
    ActiveStroke, CompletedStroke, Privilege, Stroke, StrokeEntry, StrokeId, StrokePoint,
    new_stroke_id,
};
use crate::style::StyleControls;
use kurbo::Size;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc;

/// Where a stroke snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Produced by this engine's own input session.
    Local,
    /// Replicated from another participant. Never re-published.
    External,
}

/// Real-time stroke engine over a drawing surface.
pub struct InkEngine<S: Surface> {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    scroll: ScrollModel,
    painter: StrokePainter,
    surface: S,
    strokes: HashMap<StrokeId, StrokeEntry<S::Bitmap>>,
    capture: StrokeCapture,
    current: Option<StrokeId>,
    style: StyleControls,
    privilege: Privilege,
    events: EventBus,
    frames: Box<dyn FrameScheduler>,
    pending_frame: Option<FrameHandle>,
    last_tick: f64,
}

impl<S: Surface> InkEngine<S> {
    pub fn new(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        surface: S,
        frames: Box<dyn FrameScheduler>,
    ) -> Self {
        let now = clock.now_ms();
        let scroll = ScrollModel::from_config(&config, now);
        log::info!(
            "Ink engine anchored at {} (speed {}, dpr {})",
            scroll.start_time(),
            scroll.speed(),
            config.device_pixel_ratio
        );
        Self {
            painter: StrokePainter::new(config.device_pixel_ratio),
            capture: StrokeCapture::new(&config),
            config,
            clock,
            scroll,
            surface,
            strokes: HashMap::new(),
            current: None,
            style: StyleControls::default(),
            privilege: Privilege::User,
            events: EventBus::new(),
            frames,
            pending_frame: None,
            last_tick: now,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scroll(&self) -> &ScrollModel {
        &self.scroll
    }

    /// Current time from the engine's clock.
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn style(&self) -> &StyleControls {
        &self.style
    }

    /// Style changes apply to the next stroke only.
    pub fn style_mut(&mut self) -> &mut StyleControls {
        &mut self.style
    }

    pub fn set_privilege(&mut self, privilege: Privilege) {
        self.privilege = privilege;
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Shorthand for `events_mut().subscribe()`.
    pub fn subscribe(&mut self) -> mpsc::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn capture(&self) -> &StrokeCapture {
        &self.capture
    }

    /// Id of the stroke the local session is drawing.
    pub fn current_stroke_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn stroke(&self, id: &str) -> Option<&Stroke> {
        self.strokes.get(id).map(StrokeEntry::stroke)
    }

    pub fn entry(&self, id: &str) -> Option<&StrokeEntry<S::Bitmap>> {
        self.strokes.get(id)
    }

    pub fn strokes(&self) -> impl Iterator<Item = &Stroke> {
        self.strokes.values().map(StrokeEntry::stroke)
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    /// Resize the backing store. The next frame repaints at the new size.
    pub fn resize(&mut self, backing: Size, device_pixel_ratio: f64) {
        self.surface.resize(backing);
        self.config.device_pixel_ratio = device_pixel_ratio;
        self.painter.set_device_pixel_ratio(device_pixel_ratio);
        self.capture.set_device_pixel_ratio(device_pixel_ratio);
    }

    // Loop

    pub fn is_running(&self) -> bool {
        self.pending_frame.is_some()
    }

    pub fn start(&mut self) {
        if self.pending_frame.is_none() {
            log::info!("Starting render loop");
            self.pending_frame = Some(self.frames.request_frame());
        }
    }

    /// Cancel the pending frame. No further frames render until restarted.
    pub fn stop(&mut self) {
        if let Some(handle) = self.pending_frame.take() {
            log::info!("Stopping render loop");
            self.frames.cancel_frame(handle);
        }
    }

    /// Run one frame. Frames other than the one last requested are ignored.
    pub fn on_animation_frame(&mut self, handle: FrameHandle) {
        if self.pending_frame != Some(handle) {
            log::trace!("Ignoring stale frame {:?}", handle);
            return;
        }
        self.pending_frame = None;
        let now = self.clock.now_ms();
        self.frame(now);
        self.pending_frame = Some(self.frames.request_frame());
    }

    fn frame(&mut self, now: f64) {
        self.append_sample(now);

        if now - self.last_tick > self.config.tick_interval_ms {
            self.tick(now);
        }

        self.render(now);
    }

    fn append_sample(&mut self, now: f64) {
        if !self.capture.is_pointing() {
            return;
        }
        let Some(id) = self.current.clone() else {
            return;
        };
        let point = self.capture.sample_at(self.scroll.offset(now));
        let split = match self.strokes.get_mut(&id) {
            Some(StrokeEntry::Active(active)) => {
                active.push(point);
                active.len() >= self.config.max_points_per_stroke
            }
            _ => false,
        };
        if split {
            log::debug!("Splitting long stroke {id}");
            self.complete_current();
            self.begin_stroke_at(point, now);
        }
    }

    fn tick(&mut self, now: f64) {
        let active = self.current.as_deref().and_then(|id| match self.strokes.get(id) {
            Some(StrokeEntry::Active(active)) => Some(active.stroke().clone()),
            _ => None,
        });

        let tool = active.as_ref().map(|s| s.tool);
        if let Some(stroke) = active {
            self.events.emit(EngineEvent::StrokeUpdated(stroke));
        }

        if self.capture.on_tick(tool) == TickOutcome::ForceComplete {
            self.complete_current();
        }

        for id in cache::cull(&mut self.strokes, &self.scroll, now) {
            if self.current.as_deref() == Some(id.as_str()) {
                self.current = None;
            }
            self.events.emit(EngineEvent::StrokeDeleted(id));
        }

        self.last_tick = now;
    }

    fn render(&mut self, now: f64) {
        let Self {
            surface,
            strokes,
            painter,
            scroll,
            ..
        } = self;

        if !surface.is_available() {
            log::trace!("Surface unavailable, skipping frame");
            return;
        }
        surface.clear();

        let mut order: Vec<(bool, f64, StrokeId)> = strokes
            .values()
            .map(|e| {
                let s = e.stroke();
                (s.is_privileged(), s.created_at, s.id.clone())
            })
            .collect();
        order.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.total_cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        let screen = scroll.screen_transform(now);
        for (_, _, id) in order {
            match strokes.get_mut(&id) {
                Some(StrokeEntry::Active(active)) => {
                    painter.paint_live(surface, active.stroke(), screen);
                }
                Some(StrokeEntry::Completed(completed)) => {
                    if !cache::bake(surface, painter, completed) {
                        // No bitmap this frame; baking is retried next frame.
                        painter.paint_live(surface, completed.stroke(), screen);
                        continue;
                    }
                    if let Some(bitmap) = completed.baked() {
                        let transform = cache::blit_transform(screen, completed.bbox());
                        surface.draw_bitmap(
                            bitmap,
                            transform,
                            Composite::for_tool(completed.stroke().tool),
                        );
                    }
                }
                None => {}
            }
        }
    }

    // Input

    pub fn handle_pointer(&mut self, event: &PointerEvent) {
        match event {
            PointerEvent::Down(s) => self.pointer_down(s),
            PointerEvent::Move(s) => self.pointer_move(s),
            PointerEvent::Up(s) => self.pointer_up(s),
        }
    }

    pub fn pointer_down(&mut self, sample: &PointerSample) {
        if self.capture.pointer_down(sample, self.style.tool()) == CaptureCommand::Begin {
            let now = self.clock.now_ms();
            let point = self.capture.sample_at(self.scroll.offset(now));
            self.begin_stroke_at(point, now);
        }
    }

    pub fn pointer_move(&mut self, sample: &PointerSample) {
        if self.capture.pointer_move(sample) != CaptureCommand::Restart {
            return;
        }
        let Some(id) = self.current.as_deref() else {
            return;
        };
        let point = self.capture.sample_at(self.scroll.offset(self.clock.now_ms()));
        if let Some(StrokeEntry::Active(active)) = self.strokes.get_mut(id) {
            active.restart_from(point);
            active.set_pen(true);
        }
    }

    pub fn pointer_up(&mut self, sample: &PointerSample) {
        if self.capture.pointer_up(sample) == CaptureCommand::Complete {
            self.complete_current();
        }
    }

    fn begin_stroke_at(&mut self, point: StrokePoint, now: f64) {
        let active = ActiveStroke::begin(
            new_stroke_id(),
            self.scroll.relative(now),
            self.style.style(),
            point,
            self.capture.is_pen(),
            self.privilege,
        );
        let stroke = active.stroke().clone();
        log::debug!("Began stroke {} ({})", stroke.id, stroke.tool.name());
        self.current = Some(stroke.id.clone());
        self.strokes.insert(stroke.id.clone(), StrokeEntry::Active(active));
        self.events.emit(EngineEvent::StrokeUpdated(stroke));
    }

    fn complete_current(&mut self) {
        let Some(id) = self.current.take() else {
            return;
        };
        let completed: CompletedStroke<S::Bitmap> = match self.strokes.remove(&id) {
            Some(StrokeEntry::Active(active)) => active.complete(self.painter.device_pixel_ratio()),
            Some(other) => {
                // Replaced by a finished snapshot in the meantime.
                self.strokes.insert(id, other);
                return;
            }
            None => return,
        };
        let stroke = completed.stroke().clone();
        log::debug!("Completed stroke {} with {} points", id, stroke.points.len());
        self.strokes.insert(id, StrokeEntry::Completed(completed));
        self.events.emit(EngineEvent::StrokeUpdated(stroke.clone()));
        self.events.emit(EngineEvent::StrokeCompleted(stroke));
    }

    // Ingestion

    /// Insert or replace a stroke snapshot. A finished stroke is kept only
    /// while it is still on screen. Only local snapshots are published.
    /// Returns false when the snapshot matched what was already there.
    pub fn put_stroke(&mut self, stroke: Stroke, origin: Origin) -> bool {
        if self
            .strokes
            .get(&stroke.id)
            .is_some_and(|existing| existing.stroke() == &stroke)
        {
            return false;
        }

        if let Some(mut old) = self.strokes.remove(&stroke.id) {
            old.release();
        }
        let now = self.clock.now_ms();
        if !stroke.done || self.scroll.is_on_screen(stroke.bbox.y1, now) {
            self.strokes
                .insert(stroke.id.clone(), StrokeEntry::from_snapshot(stroke.clone()));
        } else {
            log::trace!("Dropping off-screen stroke {}", stroke.id);
        }

        if origin == Origin::Local {
            self.events.emit(EngineEvent::StrokeUpdated(stroke));
        }
        true
    }

    /// Drop every stroke, e.g. before replaying a fresh document.
    pub fn clear_strokes(&mut self) {
        for (_, mut entry) in self.strokes.drain() {
            entry.release();
        }
        self.current = None;
        self.capture.cancel();
    }
}

impl<S: Surface + std::fmt::Debug> std::fmt::Debug for InkEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InkEngine")
            .field("surface", &self.surface)
            .field("strokes", &self.strokes.len())
            .field("current", &self.current)
            .field("capture", &self.capture.state())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
