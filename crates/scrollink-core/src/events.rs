//! Engine notifications.
//!
//! A closed set of event kinds delivered to any number of channel receivers.

use crate::stroke::{Stroke, StrokeId};
use std::sync::mpsc;

/// Something that happened to the local stroke set.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A local stroke began, grew, or was completed.
    StrokeUpdated(Stroke),
    /// A local stroke was completed.
    StrokeCompleted(Stroke),
    /// A stroke scrolled off screen and was dropped.
    StrokeDeleted(StrokeId),
}

impl EngineEvent {
    pub fn stroke_id(&self) -> &str {
        match self {
            EngineEvent::StrokeUpdated(s) | EngineEvent::StrokeCompleted(s) => &s.id,
            EngineEvent::StrokeDeleted(id) => id,
        }
    }
}

/// Fan-out of [`EngineEvent`]s.
#[derive(Debug, Default)]
pub struct EventBus {
    channels: Vec<mpsc::Sender<EngineEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event on a channel. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> mpsc::Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel();
        self.channels.push(tx);
        rx
    }

    pub fn emit(&mut self, event: EngineEvent) {
        log::trace!("Engine event {:?} for {}", kind_name(&event), event.stroke_id());
        self.channels.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.channels.len()
    }
}

fn kind_name(event: &EngineEvent) -> &'static str {
    match event {
        EngineEvent::StrokeUpdated(_) => "updated",
        EngineEvent::StrokeCompleted(_) => "completed",
        EngineEvent::StrokeDeleted(_) => "deleted",
    }
}
