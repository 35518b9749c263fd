//! Durable storage for completed strokes.

mod file;
mod flush;
mod memory;

pub use file::FileStore;
pub use flush::FlushQueue;
pub use memory::MemoryStore;

use crate::stroke::{Stroke, StrokeId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Room not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// One persisted stroke. The vertical extent is duplicated out of the bbox
/// so stores can filter without decoding the stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeRow {
    pub id: StrokeId,
    pub room: String,
    pub min_y: f64,
    pub max_y: f64,
    pub stroke: Stroke,
}

impl StrokeRow {
    pub fn new(room: &str, stroke: Stroke) -> Self {
        Self {
            id: stroke.id.clone(),
            room: room.to_string(),
            min_y: stroke.bbox.y0,
            max_y: stroke.bbox.y1,
            stroke,
        }
    }
}

/// Trait for stroke storage backends.
///
/// Writes are idempotent upserts keyed by stroke id, so a batch delivered
/// twice is harmless.
pub trait StrokeStore: Send + Sync {
    /// Insert or replace rows.
    fn upsert(&self, room: &str, rows: &[StrokeRow]) -> BoxFuture<'_, StorageResult<()>>;

    /// Rows whose bottom edge is below `min_y` in scroll space, oldest first.
    fn load_visible(&self, room: &str, min_y: f64) -> BoxFuture<'_, StorageResult<Vec<StrokeRow>>>;

    /// Rooms with at least one stored row.
    fn rooms(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;
}

/// Keep rows that are still visible and order them by creation time.
pub(crate) fn visible_rows(rows: impl IntoIterator<Item = StrokeRow>, min_y: f64) -> Vec<StrokeRow> {
    let mut rows: Vec<StrokeRow> = rows.into_iter().filter(|r| r.max_y >= min_y).collect();
    rows.sort_by(|a, b| {
        a.stroke
            .created_at
            .total_cmp(&b.stroke.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    rows
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::stroke::{Privilege, Stroke, StrokeColor, StrokePoint, Tool};

    pub fn block_on<F: std::future::Future>(f: F) -> F::Output {
        use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

        fn dummy_raw_waker() -> RawWaker {
            fn no_op(_: *const ()) {}
            fn clone(_: *const ()) -> RawWaker {
                dummy_raw_waker()
            }
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
            RawWaker::new(std::ptr::null(), &VTABLE)
        }

        let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
        let mut cx = Context::from_waker(&waker);
        let mut f = std::pin::pin!(f);

        loop {
            match f.as_mut().poll(&mut cx) {
                Poll::Ready(result) => return result,
                Poll::Pending => {}
            }
        }
    }

    /// A finished stroke spanning `y..y + 10`.
    pub fn done_stroke(id: &str, created_at: f64, y: f64) -> Stroke {
        let points = vec![StrokePoint::new(10.0, y, 0.5), StrokePoint::new(20.0, y + 10.0, 0.5)];
        let mut stroke = Stroke {
            id: id.into(),
            created_at,
            tool: Tool::Ink,
            size: 10.0,
            color: StrokeColor::black(),
            bbox: Stroke::placeholder_bbox(points[0]),
            points,
            done: true,
            pen: false,
            privilege: Privilege::User,
        };
        stroke.bbox = stroke.precise_bbox(1.0);
        stroke
    }
}
