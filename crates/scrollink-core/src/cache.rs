//! Bake and cull.
//!
//! A completed stroke is painted once into a bitmap sized to its bounding box
//! and blitted every frame after that. Once the box has scrolled past the top
//! edge the stroke is dropped and its bitmap released on the spot.

use crate::paint::{Bitmap, Composite, StrokePainter, Surface};
use crate::scroll::ScrollModel;
use crate::stroke::{CompletedStroke, StrokeEntry, StrokeId};
use kurbo::{Affine, Size};
use std::collections::HashMap;

/// Bitmap dimensions for a bounding box, rounded up to whole pixels.
pub fn bitmap_size(bbox: kurbo::Rect) -> Size {
    Size::new(bbox.width().ceil(), bbox.height().ceil())
}

/// Where a baked bitmap lands on screen.
pub fn blit_transform(screen: Affine, bbox: kurbo::Rect) -> Affine {
    screen * Affine::translate(bbox.origin().to_vec2())
}

/// Bake `completed` unless it already has a bitmap. Returns false when the
/// surface could not allocate one; the stroke is then skipped this frame.
pub fn bake<S: Surface>(
    surface: &mut S,
    painter: &StrokePainter,
    completed: &mut CompletedStroke<S::Bitmap>,
) -> bool {
    if completed.is_baked() {
        return true;
    }
    let bbox = completed.bbox();
    let Some(mut bitmap) = surface.create_bitmap(bitmap_size(bbox)) else {
        log::debug!("No bitmap for stroke {} ({:?})", completed.stroke().id, bbox);
        return false;
    };
    // The bitmap's origin is the box's top left corner. The tool composite is
    // applied when blitting, so the bitmap itself is painted normally.
    painter.paint(
        &mut bitmap,
        completed.stroke(),
        Affine::translate((-bbox.x0, -bbox.y0)),
        Composite::SourceOver,
    );
    completed.store_bitmap(bitmap);
    true
}

/// Remove every completed stroke that has scrolled fully off screen,
/// releasing its bitmap. Returns the removed ids.
pub fn cull<B: Bitmap>(
    strokes: &mut HashMap<StrokeId, StrokeEntry<B>>,
    scroll: &ScrollModel,
    now: f64,
) -> Vec<StrokeId> {
    let expired: Vec<StrokeId> = strokes
        .iter()
        .filter_map(|(id, entry)| match entry {
            StrokeEntry::Completed(c) if !scroll.is_on_screen(c.bbox().y1, now) => Some(id.clone()),
            _ => None,
        })
        .collect();

    for id in &expired {
        if let Some(mut entry) = strokes.remove(id) {
            entry.release();
            log::trace!("Culled stroke {id}");
        }
    }
    expired
}
