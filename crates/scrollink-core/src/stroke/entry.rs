//! Runtime stroke records.

use super::{Privilege, Stroke, StrokeId, StrokePoint, StrokeStyle};
use crate::paint::Bitmap;

/// A stroke still being drawn. Points are append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveStroke {
    stroke: Stroke,
}

impl ActiveStroke {
    /// Start a new stroke at `first`.
    pub fn begin(
        id: StrokeId,
        created_at: f64,
        style: StrokeStyle,
        first: StrokePoint,
        pen: bool,
        privilege: Privilege,
    ) -> Self {
        Self {
            stroke: Stroke {
                id,
                created_at,
                tool: style.tool,
                size: style.size,
                color: style.color,
                points: vec![first],
                done: false,
                bbox: Stroke::placeholder_bbox(first),
                pen,
                privilege,
            },
        }
    }

    /// Adopt a snapshot of someone else's in-progress stroke.
    pub fn from_snapshot(mut stroke: Stroke) -> Self {
        stroke.done = false;
        Self { stroke }
    }

    pub fn push(&mut self, point: StrokePoint) {
        self.stroke.points.push(point);
    }

    /// Throw away the samples so far and continue from `point`.
    pub fn restart_from(&mut self, point: StrokePoint) {
        self.stroke.points.clear();
        self.stroke.points.push(point);
        self.stroke.bbox = Stroke::placeholder_bbox(point);
    }

    pub fn set_pen(&mut self, pen: bool) {
        self.stroke.pen = pen;
    }

    pub fn len(&self) -> usize {
        self.stroke.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stroke.points.is_empty()
    }

    pub fn last_point(&self) -> Option<StrokePoint> {
        self.stroke.points.last().copied()
    }

    pub fn stroke(&self) -> &Stroke {
        &self.stroke
    }

    /// Freeze the stroke. The precise bounding box is computed here and
    /// never again.
    pub fn complete<B: Bitmap>(mut self, device_pixel_ratio: f64) -> CompletedStroke<B> {
        self.stroke.bbox = self.stroke.precise_bbox(device_pixel_ratio);
        self.stroke.done = true;
        CompletedStroke {
            stroke: self.stroke,
            baked: None,
        }
    }
}

/// A frozen stroke and the bitmap it was baked into, if any.
///
/// The bitmap is released explicitly when the stroke is culled. Dropping the
/// record releases it as well.
#[derive(Debug)]
pub struct CompletedStroke<B: Bitmap> {
    stroke: Stroke,
    baked: Option<B>,
}

impl<B: Bitmap> CompletedStroke<B> {
    /// Adopt a finished snapshot as is. Its bounding box was fixed by the
    /// participant that completed it.
    pub fn from_snapshot(mut stroke: Stroke) -> Self {
        stroke.done = true;
        Self {
            stroke,
            baked: None,
        }
    }

    pub fn stroke(&self) -> &Stroke {
        &self.stroke
    }

    pub fn bbox(&self) -> kurbo::Rect {
        self.stroke.bbox
    }

    pub fn baked(&self) -> Option<&B> {
        self.baked.as_ref()
    }

    pub fn is_baked(&self) -> bool {
        self.baked.is_some()
    }

    pub(crate) fn store_bitmap(&mut self, bitmap: B) {
        if let Some(mut old) = self.baked.replace(bitmap) {
            old.release();
        }
    }

    /// Release the baked bitmap. Returns whether there was one.
    pub fn release(&mut self) -> bool {
        match self.baked.take() {
            Some(mut bitmap) => {
                bitmap.release();
                true
            }
            None => false,
        }
    }
}

impl<B: Bitmap> Drop for CompletedStroke<B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A stroke in the engine's live set.
#[derive(Debug)]
pub enum StrokeEntry<B: Bitmap> {
    Active(ActiveStroke),
    Completed(CompletedStroke<B>),
}

impl<B: Bitmap> StrokeEntry<B> {
    /// Wrap a replicated snapshot in the variant matching its `done` flag.
    pub fn from_snapshot(stroke: Stroke) -> Self {
        if stroke.done {
            StrokeEntry::Completed(CompletedStroke::from_snapshot(stroke))
        } else {
            StrokeEntry::Active(ActiveStroke::from_snapshot(stroke))
        }
    }

    pub fn stroke(&self) -> &Stroke {
        match self {
            StrokeEntry::Active(active) => active.stroke(),
            StrokeEntry::Completed(completed) => completed.stroke(),
        }
    }

    pub fn id(&self) -> &str {
        &self.stroke().id
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StrokeEntry::Completed(_))
    }

    /// Release any cached bitmap.
    pub fn release(&mut self) -> bool {
        match self {
            StrokeEntry::Completed(completed) => completed.release(),
            StrokeEntry::Active(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::{RecordingBitmap, RecordingSurface, Surface};
    use crate::stroke::{StrokeColor, Tool};
    use kurbo::Size;

    fn style() -> StrokeStyle {
        StrokeStyle {
            tool: Tool::Ink,
            size: 10.0,
            color: StrokeColor::black(),
        }
    }

    fn active() -> ActiveStroke {
        let mut s = ActiveStroke::begin(
            "a".into(),
            0.0,
            style(),
            StrokePoint::new(100.0, 100.0, 0.5),
            false,
            Privilege::User,
        );
        s.push(StrokePoint::new(110.0, 110.0, 0.5));
        s.push(StrokePoint::new(120.0, 100.0, 0.5));
        s
    }

    #[test]
    fn test_begin_uses_placeholder_bbox() {
        let s = active();
        assert_eq!(s.len(), 3);
        assert!(!s.stroke().done);
        assert_eq!(s.stroke().bbox, kurbo::Rect::new(100.0, 100.0, 101.0, 1100.0));
    }

    #[test]
    fn test_complete_freezes_precise_bbox() {
        let done: CompletedStroke<RecordingBitmap> = active().complete(1.0);
        assert!(done.stroke().done);
        assert_eq!(done.bbox(), kurbo::Rect::new(80.0, 80.0, 140.0, 130.0));
        for p in &done.stroke().points {
            assert!(done.bbox().contains(p.position()));
        }
    }

    #[test]
    fn test_restart_discards_points() {
        let mut s = active();
        s.restart_from(StrokePoint::new(5.0, 5.0, 0.7));
        assert_eq!(s.len(), 1);
        assert_eq!(s.last_point(), Some(StrokePoint::new(5.0, 5.0, 0.7)));
        assert_eq!(s.stroke().bbox, Stroke::placeholder_bbox(StrokePoint::new(5.0, 5.0, 0.7)));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut surface = RecordingSurface::new(Size::new(100.0, 100.0));
        let mut done: CompletedStroke<RecordingBitmap> = active().complete(1.0);
        done.store_bitmap(surface.create_bitmap(Size::new(60.0, 50.0)).unwrap());
        assert!(done.is_baked());
        assert!(done.release());
        assert!(!done.release());
        assert_eq!(surface.ledger().released, 1);
    }

    #[test]
    fn test_drop_releases_bitmap() {
        let mut surface = RecordingSurface::new(Size::new(100.0, 100.0));
        {
            let mut done: CompletedStroke<RecordingBitmap> = active().complete(1.0);
            done.store_bitmap(surface.create_bitmap(Size::new(60.0, 50.0)).unwrap());
        }
        assert_eq!(surface.ledger().live(), 0);
    }

    #[test]
    fn test_entry_variant_follows_done_flag() {
        let mut snapshot = active().stroke().clone();
        let entry: StrokeEntry<RecordingBitmap> = StrokeEntry::from_snapshot(snapshot.clone());
        assert!(!entry.is_done());

        snapshot.done = true;
        let entry: StrokeEntry<RecordingBitmap> = StrokeEntry::from_snapshot(snapshot.clone());
        assert!(entry.is_done());
        assert_eq!(entry.stroke(), &snapshot);
        assert_eq!(entry.id(), "a");
    }
}
