//! Stroke data model.
//!
//! [`Stroke`] is the replicated, persisted form of one freehand ink path. The
//! runtime form lives in [`entry`]: a stroke is either an append-only
//! [`ActiveStroke`] or a frozen [`CompletedStroke`] that owns its baked bitmap.

mod color;
mod entry;

pub use color::StrokeColor;
pub use entry::{ActiveStroke, CompletedStroke, StrokeEntry};

use kurbo::Rect;
use serde::{Deserialize, Serialize};

/// Unique stroke identifier, stable across replication.
pub type StrokeId = String;

/// Generate a fresh stroke id.
pub fn new_stroke_id() -> StrokeId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Drawing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Ink,
    Eraser,
    Highlighter,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Ink, Tool::Eraser, Tool::Highlighter];

    pub fn name(self) -> &'static str {
        match self {
            Tool::Ink => "ink",
            Tool::Eraser => "eraser",
            Tool::Highlighter => "highlighter",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Eraser and highlighter render at twice the nominal size.
    pub fn is_fat(self) -> bool {
        matches!(self, Tool::Eraser | Tool::Highlighter)
    }

    /// Multiplier applied to `size` for bounding box padding.
    pub fn padding_factor(self) -> f64 {
        if self.is_fat() { 4.0 } else { 2.0 }
    }

    /// Thinning passed to the outline shaper. Negative thinning inverts the
    /// pressure response.
    pub fn thinning(self) -> f64 {
        match self {
            Tool::Eraser => -0.65,
            Tool::Ink | Tool::Highlighter => 0.65,
        }
    }
}

/// Visual priority of a stroke's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    #[default]
    User,
    Admin,
}

impl Privilege {
    pub fn is_privileged(self) -> bool {
        self == Privilege::Admin
    }
}

/// One input sample, serialized as `[x, y, pressure]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
    pub pressure: f64,
}

impl StrokePoint {
    pub fn new(x: f64, y: f64, pressure: f64) -> Self {
        Self { x, y, pressure }
    }

    pub fn position(&self) -> kurbo::Point {
        kurbo::Point::new(self.x, self.y)
    }
}

impl From<[f64; 3]> for StrokePoint {
    fn from([x, y, pressure]: [f64; 3]) -> Self {
        Self { x, y, pressure }
    }
}

impl From<StrokePoint> for [f64; 3] {
    fn from(p: StrokePoint) -> Self {
        [p.x, p.y, p.pressure]
    }
}

/// Style fixed on a stroke when it begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub tool: Tool,
    pub size: f64,
    pub color: StrokeColor,
}

/// A freehand ink path.
///
/// Points are in scroll space: canvas pixels with the scroll offset at the
/// time of capture added to `y`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: StrokeId,
    /// Milliseconds since the scroll anchor.
    pub created_at: f64,
    pub tool: Tool,
    pub size: f64,
    pub color: StrokeColor,
    pub points: Vec<StrokePoint>,
    pub done: bool,
    pub bbox: Rect,
    /// The input device reported genuine pressure.
    #[serde(default)]
    pub pen: bool,
    #[serde(default)]
    pub privilege: Privilege,
}

impl Stroke {
    /// Coarse box used while a stroke is still being drawn.
    pub fn placeholder_bbox(first: StrokePoint) -> Rect {
        Rect::new(first.x, first.y, first.x + 1.0, first.y + 1000.0)
    }

    /// Padding around the points, in canvas pixels.
    pub fn padding(&self, device_pixel_ratio: f64) -> f64 {
        self.size * self.tool.padding_factor() * device_pixel_ratio.max(1.0)
    }

    /// Tight box over all points, padded for the tool.
    pub fn precise_bbox(&self, device_pixel_ratio: f64) -> Rect {
        let Some(first) = self.points.first() else {
            return self.bbox;
        };
        let mut rect = Rect::new(first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            rect = rect.union_pt(p.position());
        }
        rect.inflate(
            self.padding(device_pixel_ratio),
            self.padding(device_pixel_ratio),
        )
    }

    pub fn is_privileged(&self) -> bool {
        self.privilege.is_privileged()
    }

    /// Structural sanity of a decoded snapshot.
    pub fn is_well_formed(&self) -> bool {
        !self.id.is_empty()
            && !self.points.is_empty()
            && self.size.is_finite()
            && self.size > 0.0
            && self.created_at.is_finite()
            && [self.bbox.x0, self.bbox.y0, self.bbox.x1, self.bbox.y1]
                .iter()
                .all(|v| v.is_finite())
            && self
                .points
                .iter()
                .all(|p| p.x.is_finite() && p.y.is_finite() && p.pressure.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke(tool: Tool, points: &[(f64, f64)]) -> Stroke {
        let points: Vec<StrokePoint> = points
            .iter()
            .map(|&(x, y)| StrokePoint::new(x, y, 0.5))
            .collect();
        Stroke {
            id: new_stroke_id(),
            created_at: 0.0,
            tool,
            size: 10.0,
            color: StrokeColor::black(),
            bbox: Stroke::placeholder_bbox(points[0]),
            points,
            done: false,
            pen: false,
            privilege: Privilege::User,
        }
    }

    #[test]
    fn test_precise_bbox_contains_points_and_padding() {
        let s = stroke(Tool::Ink, &[(100.0, 100.0), (110.0, 110.0), (120.0, 100.0)]);
        let bbox = s.precise_bbox(1.0);
        assert_eq!(bbox, Rect::new(80.0, 80.0, 140.0, 130.0));
    }

    #[test]
    fn test_fat_tools_pad_more() {
        let ink = stroke(Tool::Ink, &[(0.0, 0.0)]).precise_bbox(1.0);
        let eraser = stroke(Tool::Eraser, &[(0.0, 0.0)]).precise_bbox(1.0);
        let highlighter = stroke(Tool::Highlighter, &[(0.0, 0.0)]).precise_bbox(1.0);
        assert!(eraser.width() > ink.width());
        assert_eq!(eraser, highlighter);
    }

    #[test]
    fn test_padding_scales_with_dpr() {
        let s = stroke(Tool::Ink, &[(0.0, 0.0)]);
        assert_eq!(s.padding(0.5), 20.0);
        assert_eq!(s.padding(2.0), 40.0);
    }

    #[test]
    fn test_tool_names() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(Tool::from_name("pencil"), None);
        assert_eq!(Tool::Eraser.thinning(), -0.65);
    }

    #[test]
    fn test_json_shape() {
        let s = stroke(Tool::Highlighter, &[(1.0, 2.0)]);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["tool"], "highlighter");
        assert_eq!(json["points"][0], serde_json::json!([1.0, 2.0, 0.5]));
        assert_eq!(json["color"], "#000000");
        let back: Stroke = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = serde_json::json!({
            "id": "s1",
            "created_at": 5.0,
            "tool": "ink",
            "size": 10.0,
            "color": "#333",
            "points": [[0.0, 0.0, 0.5]],
            "done": true,
            "bbox": { "x0": -20.0, "y0": -20.0, "x1": 20.0, "y1": 20.0 }
        });
        let s: Stroke = serde_json::from_value(json).unwrap();
        assert!(!s.pen);
        assert_eq!(s.privilege, Privilege::User);
        assert!(s.is_well_formed());
    }

    #[test]
    fn test_well_formed_rejects_empty_and_nan() {
        let mut s = stroke(Tool::Ink, &[(0.0, 0.0)]);
        s.points.clear();
        assert!(!s.is_well_formed());
        let mut s = stroke(Tool::Ink, &[(0.0, 0.0)]);
        assert!(s.is_well_formed());
        s.points[0].y = f64::NAN;
        assert!(!s.is_well_formed());
        s.points[0].y = 0.0;
        s.bbox.y1 = f64::INFINITY;
        assert!(!s.is_well_formed());
    }
}
