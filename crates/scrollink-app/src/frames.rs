//! Fixed-interval frame pacing for the headless loop.

use scrollink_core::{Clock, FrameHandle, FrameScheduler};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Pending {
    next: u64,
    frame: Option<(FrameHandle, f64)>,
}

/// Hands out one frame at a time, due `interval_ms` after it was requested.
#[derive(Clone)]
pub struct IntervalFrames {
    clock: Arc<dyn Clock>,
    interval_ms: f64,
    pending: Rc<RefCell<Pending>>,
}

impl IntervalFrames {
    pub fn new(clock: Arc<dyn Clock>, interval_ms: f64) -> Self {
        Self {
            clock,
            interval_ms,
            pending: Rc::default(),
        }
    }

    /// The pending frame, if its time has come.
    pub fn due(&self) -> Option<FrameHandle> {
        let mut pending = self.pending.borrow_mut();
        let (handle, requested_at) = pending.frame?;
        if self.clock.now_ms() - requested_at >= self.interval_ms {
            pending.frame = None;
            Some(handle)
        } else {
            None
        }
    }

    /// Time left until the pending frame is due. `None` when nothing is
    /// pending.
    pub fn wait(&self) -> Option<Duration> {
        let (_, requested_at) = self.pending.borrow().frame?;
        let left = self.interval_ms - (self.clock.now_ms() - requested_at);
        Some(Duration::from_secs_f64(left.max(0.0) / 1000.0))
    }
}

impl FrameScheduler for IntervalFrames {
    fn request_frame(&mut self) -> FrameHandle {
        let mut pending = self.pending.borrow_mut();
        pending.next += 1;
        let handle = FrameHandle(pending.next);
        pending.frame = Some((handle, self.clock.now_ms()));
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        let mut pending = self.pending.borrow_mut();
        if pending.frame.is_some_and(|(h, _)| h == handle) {
            pending.frame = None;
        }
    }
}

impl std::fmt::Debug for IntervalFrames {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalFrames")
            .field("interval_ms", &self.interval_ms)
            .field("pending", &self.pending.borrow().frame)
            .finish()
    }
}
