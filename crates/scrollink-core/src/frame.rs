//! Display refresh scheduling.
//!
//! The engine asks a [`FrameScheduler`] for the next frame and gets a handle
//! back; the host calls `InkEngine::on_animation_frame` with that handle when
//! the frame is due. Cancelling a handle makes the host drop it.

use std::cell::RefCell;
use std::rc::Rc;

/// Identifies one requested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Source of animation frames.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;

    fn cancel_frame(&mut self, handle: FrameHandle);
}

#[derive(Debug, Default)]
struct Queue {
    next: u64,
    pending: Vec<FrameHandle>,
    cancelled: usize,
}

/// Frames delivered by whoever holds a clone of the scheduler, typically a
/// host loop or a test.
#[derive(Debug, Clone, Default)]
pub struct ManualFrames {
    queue: Rc<RefCell<Queue>>,
}

impl ManualFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the oldest pending frame, if any.
    pub fn next_frame(&self) -> Option<FrameHandle> {
        let mut queue = self.queue.borrow_mut();
        if queue.pending.is_empty() {
            None
        } else {
            Some(queue.pending.remove(0))
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().pending.len()
    }

    pub fn cancelled(&self) -> usize {
        self.queue.borrow().cancelled
    }
}

impl FrameScheduler for ManualFrames {
    fn request_frame(&mut self) -> FrameHandle {
        let mut queue = self.queue.borrow_mut();
        queue.next += 1;
        let handle = FrameHandle(queue.next);
        queue.pending.push(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        let mut queue = self.queue.borrow_mut();
        let before = queue.pending.len();
        queue.pending.retain(|h| *h != handle);
        if queue.pending.len() != before {
            queue.cancelled += 1;
        }
    }
}
