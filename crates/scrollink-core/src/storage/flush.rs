//! Periodic flushing of completed strokes to a store.

use super::{StorageResult, StrokeRow, StrokeStore};
use crate::stroke::Stroke;

/// Buffers completed strokes and writes them in batches.
///
/// A failed batch goes back to the front of the queue so it is retried
/// before anything newer. Delivery is at least once.
#[derive(Debug)]
pub struct FlushQueue {
    room: String,
    interval_ms: f64,
    pending: Vec<StrokeRow>,
    last_flush: f64,
}

impl FlushQueue {
    pub fn new(room: impl Into<String>, interval_ms: u64, now: f64) -> Self {
        Self {
            room: room.into(),
            interval_ms: interval_ms as f64,
            pending: Vec::new(),
            last_flush: now,
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queue a completed stroke. Unfinished strokes are ignored and a
    /// stroke already queued is replaced in place.
    pub fn push(&mut self, stroke: &Stroke) {
        if !stroke.done {
            return;
        }
        let row = StrokeRow::new(&self.room, stroke.clone());
        match self.pending.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row,
            None => self.pending.push(row),
        }
    }

    pub fn is_due(&self, now: f64) -> bool {
        !self.pending.is_empty() && now - self.last_flush >= self.interval_ms
    }

    /// Take everything queued and restart the interval.
    pub fn take_batch(&mut self, now: f64) -> Vec<StrokeRow> {
        self.last_flush = now;
        std::mem::take(&mut self.pending)
    }

    /// Put a failed batch back ahead of anything queued since.
    pub fn requeue(&mut self, batch: Vec<StrokeRow>) {
        let newer = std::mem::replace(&mut self.pending, batch);
        for row in newer {
            match self.pending.iter_mut().find(|r| r.id == row.id) {
                Some(existing) => *existing = row,
                None => self.pending.push(row),
            }
        }
    }

    /// Write the batch if the interval has elapsed. Returns the number of
    /// rows written.
    pub async fn flush_if_due<S: StrokeStore + ?Sized>(
        &mut self,
        store: &S,
        now: f64,
    ) -> StorageResult<usize> {
        if !self.is_due(now) {
            return Ok(0);
        }
        self.flush(store, now).await
    }

    /// Write everything queued now.
    pub async fn flush<S: StrokeStore + ?Sized>(
        &mut self,
        store: &S,
        now: f64,
    ) -> StorageResult<usize> {
        let batch = self.take_batch(now);
        if batch.is_empty() {
            return Ok(0);
        }
        match store.upsert(&self.room, &batch).await {
            Ok(()) => {
                log::info!("Flushed {} stroke(s) to room {}", batch.len(), self.room);
                Ok(batch.len())
            }
            Err(e) => {
                log::warn!("Flush of {} stroke(s) failed, will retry: {e}", batch.len());
                self.requeue(batch);
                Err(e)
            }
        }
    }
}
