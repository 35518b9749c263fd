//! Mapping between the logical parent surface and the device backing store.

use kurbo::{Point, Size};

/// Logical size of the parent element and the device pixel ratio it is
/// shown at.
///
/// The backing store is `parent × dpr` device pixels and is scaled back by
/// `1 / dpr` for display. Engine coordinates are device pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    parent: Size,
    device_pixel_ratio: f64,
}

impl Viewport {
    /// Mount on a parent of the given logical size. Unusable ratios fall
    /// back to 1.
    pub fn mount(parent: Size, device_pixel_ratio: f64) -> Self {
        let device_pixel_ratio = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        Self {
            parent,
            device_pixel_ratio,
        }
    }

    pub fn parent_size(&self) -> Size {
        self.parent
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    /// Backing store size in whole device pixels.
    pub fn backing_size(&self) -> Size {
        Size::new(
            (self.parent.width * self.device_pixel_ratio).floor().max(0.0),
            (self.parent.height * self.device_pixel_ratio).floor().max(0.0),
        )
    }

    /// Display scale that undoes the backing store magnification.
    pub fn css_scale(&self) -> f64 {
        1.0 / self.device_pixel_ratio
    }

    /// The parent was resized.
    pub fn resize(&mut self, parent: Size) {
        self.parent = parent;
    }

    /// Logical position to device pixels.
    pub fn to_device(&self, logical: Point) -> Point {
        Point::new(
            logical.x * self.device_pixel_ratio,
            logical.y * self.device_pixel_ratio,
        )
    }
}
