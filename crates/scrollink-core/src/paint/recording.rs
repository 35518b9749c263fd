//! A surface that records draw commands instead of rasterizing.

use super::{Bitmap, Composite, PaintTarget, Surface};
use crate::stroke::StrokeColor;
use kurbo::{Affine, BezPath, Rect, Shape, Size};
use peniko::Color;
use std::cell::RefCell;
use std::rc::Rc;

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear,
    Fill {
        /// Path bounds after `transform`.
        bounds: Rect,
        transform: Affine,
        color: StrokeColor,
        composite: Composite,
    },
    Stroke {
        bounds: Rect,
        transform: Affine,
        color: StrokeColor,
        width: f64,
    },
    Blit {
        bitmap: u64,
        size: Size,
        transform: Affine,
        composite: Composite,
    },
}

/// Bitmap allocation counters shared by a surface and its bitmaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitmapLedger {
    pub allocated: usize,
    pub released: usize,
}

impl BitmapLedger {
    pub fn live(&self) -> usize {
        self.allocated - self.released
    }
}

/// Offscreen bitmap of a [`RecordingSurface`].
#[derive(Debug)]
pub struct RecordingBitmap {
    id: u64,
    size: Size,
    commands: Vec<DrawCommand>,
    ledger: Rc<RefCell<BitmapLedger>>,
}

impl RecordingBitmap {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }
}

impl PaintTarget for RecordingBitmap {
    fn fill_path(&mut self, path: &BezPath, transform: Affine, color: Color, composite: Composite) {
        if !self.is_released() {
            self.commands.push(fill_command(path, transform, color, composite));
        }
    }

    fn stroke_path(&mut self, path: &BezPath, transform: Affine, color: Color, width: f64) {
        if !self.is_released() {
            self.commands.push(stroke_command(path, transform, color, width));
        }
    }
}

impl Bitmap for RecordingBitmap {
    fn size(&self) -> Size {
        self.size
    }

    fn release(&mut self) {
        if self.is_released() {
            return;
        }
        self.size = Size::ZERO;
        self.commands = Vec::new();
        self.ledger.borrow_mut().released += 1;
    }
}

/// Headless [`Surface`] that records what would have been drawn.
#[derive(Debug)]
pub struct RecordingSurface {
    size: Size,
    available: bool,
    commands: Vec<DrawCommand>,
    next_bitmap: u64,
    max_bitmap_side: Option<f64>,
    ledger: Rc<RefCell<BitmapLedger>>,
    frames: usize,
}

impl RecordingSurface {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            available: true,
            commands: Vec::new(),
            next_bitmap: 1,
            max_bitmap_side: None,
            ledger: Rc::new(RefCell::new(BitmapLedger::default())),
            frames: 0,
        }
    }

    /// Commands recorded since the last clear.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of frames started (clears).
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn ledger(&self) -> BitmapLedger {
        *self.ledger.borrow()
    }

    /// Simulate losing or regaining the rendering context.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Refuse bitmap allocations with a side longer than `side`.
    pub fn set_max_bitmap_side(&mut self, side: Option<f64>) {
        self.max_bitmap_side = side;
    }

    /// Bitmap ids blitted since the last clear.
    pub fn blits(&self) -> Vec<u64> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Blit { bitmap, .. } => Some(*bitmap),
                _ => None,
            })
            .collect()
    }
}

impl PaintTarget for RecordingSurface {
    fn fill_path(&mut self, path: &BezPath, transform: Affine, color: Color, composite: Composite) {
        self.commands.push(fill_command(path, transform, color, composite));
    }

    fn stroke_path(&mut self, path: &BezPath, transform: Affine, color: Color, width: f64) {
        self.commands.push(stroke_command(path, transform, color, width));
    }
}

impl Surface for RecordingSurface {
    type Bitmap = RecordingBitmap;

    fn is_available(&self) -> bool {
        self.available
    }

    fn size(&self) -> Size {
        self.size
    }

    fn resize(&mut self, size: Size) {
        self.size = size;
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear);
        self.frames += 1;
    }

    fn create_bitmap(&mut self, size: Size) -> Option<RecordingBitmap> {
        if size.is_zero_area() || !size.width.is_finite() || !size.height.is_finite() {
            return None;
        }
        if let Some(max) = self.max_bitmap_side {
            if size.width > max || size.height > max {
                return None;
            }
        }
        let id = self.next_bitmap;
        self.next_bitmap += 1;
        self.ledger.borrow_mut().allocated += 1;
        Some(RecordingBitmap {
            id,
            size,
            commands: Vec::new(),
            ledger: Rc::clone(&self.ledger),
        })
    }

    fn draw_bitmap(&mut self, bitmap: &RecordingBitmap, transform: Affine, composite: Composite) {
        self.commands.push(DrawCommand::Blit {
            bitmap: bitmap.id,
            size: bitmap.size,
            transform,
            composite,
        });
    }
}

fn fill_command(path: &BezPath, transform: Affine, color: Color, composite: Composite) -> DrawCommand {
    DrawCommand::Fill {
        bounds: (transform * path.clone()).bounding_box(),
        transform,
        color: color.into(),
        composite,
    }
}

fn stroke_command(path: &BezPath, transform: Affine, color: Color, width: f64) -> DrawCommand {
    DrawCommand::Stroke {
        bounds: (transform * path.clone()).bounding_box(),
        transform,
        color: color.into(),
        width,
    }
}
