//! CRDT integration using Loro for the shared stroke map.
//!
//! # Schema
//!
//! ```text
//! LoroDoc
//! └── "strokes": LoroMap<StrokeId, LoroMap>
//! ```
//!
//! Each entry holds the persisted fields of one stroke:
//! - "id", "tool", "color", "privilege": String
//! - "created_at", "size", "min_x", "min_y", "max_x", "max_y": f64
//! - "done", "pen": bool
//! - "points": flat list of f64 triples `[x, y, pressure, ...]`

mod convert;
mod schema;

pub use convert::{stroke_from_loro, stroke_to_loro};
pub use schema::{ImportOutcome, STROKES_KEY, StrokeDocument};

pub use loro::{ExportMode, VersionVector};

use crate::stroke::StrokeId;
use thiserror::Error;

/// Shared document errors.
#[derive(Debug, Error)]
pub enum CrdtError {
    #[error("Loro error: {0}")]
    Loro(#[from] loro::LoroError),
    #[error("Cannot decode stroke {id}: {reason}")]
    Decode { id: StrokeId, reason: String },
}

pub type CrdtResult<T> = Result<T, CrdtError>;
