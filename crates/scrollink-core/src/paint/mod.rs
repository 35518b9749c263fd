//! Drawing surface abstraction and the stroke painter.
//!
//! The engine never talks to a GPU or canvas API directly. It paints through
//! [`Surface`], which also hands out offscreen [`Bitmap`]s for baking completed
//! strokes. `scrollink-render` implements these over vello; [`RecordingSurface`]
//! records draw commands for headless use and tests.

mod painter;
mod recording;

pub use painter::{StrokePainter, outline_options, simulates_pressure};
pub use recording::{BitmapLedger, DrawCommand, RecordingBitmap, RecordingSurface};

use crate::stroke::Tool;
use kurbo::{Affine, BezPath, Size};
use peniko::Color;

/// How new paint combines with what is already on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Composite {
    /// Paint over existing content.
    #[default]
    SourceOver,
    /// Remove existing content where the new paint is opaque.
    DestinationOut,
    /// Multiply with existing content so overlaps darken.
    Multiply,
}

impl Composite {
    pub fn for_tool(tool: Tool) -> Self {
        match tool {
            Tool::Ink => Composite::SourceOver,
            Tool::Eraser => Composite::DestinationOut,
            Tool::Highlighter => Composite::Multiply,
        }
    }
}

/// Anything vector paths can be painted into.
pub trait PaintTarget {
    /// Fill a closed path (non-zero winding).
    fn fill_path(&mut self, path: &BezPath, transform: Affine, color: Color, composite: Composite);

    /// Stroke a path outline with the given width.
    fn stroke_path(&mut self, path: &BezPath, transform: Affine, color: Color, width: f64);
}

/// An offscreen bitmap owned by exactly one completed stroke.
pub trait Bitmap: PaintTarget {
    fn size(&self) -> Size;

    /// Free the backing store and zero the size. Idempotent.
    fn release(&mut self);

    fn is_released(&self) -> bool {
        self.size().is_zero_area()
    }
}

/// The on-screen drawing surface.
pub trait Surface: PaintTarget {
    type Bitmap: Bitmap;

    /// Whether a rendering context is currently available. Frames are
    /// skipped while it is not.
    fn is_available(&self) -> bool;

    /// Backing store size in device pixels.
    fn size(&self) -> Size;

    fn resize(&mut self, size: Size);

    /// Clear all content and reset for a new frame.
    fn clear(&mut self);

    /// Allocate an offscreen bitmap. `None` when allocation is not possible.
    fn create_bitmap(&mut self, size: Size) -> Option<Self::Bitmap>;

    /// Composite a bitmap whose origin is mapped by `transform`.
    fn draw_bitmap(&mut self, bitmap: &Self::Bitmap, transform: Affine, composite: Composite);
}
