//! Renders one stroke into a paint target.

use super::{Composite, PaintTarget};
use crate::freehand::{FreehandShaper, OutlineOptions, OutlineShaper, outline_to_path};
use crate::stroke::{Stroke, StrokeColor, Tool};
use kurbo::Affine;
use peniko::Color;

/// Width of the privilege outline relative to the shaped stroke size.
const OUTLINE_WIDTH_RATIO: f64 = 0.2;

/// Whether the shaper should derive pressure from geometry. Only strokes from
/// a pressure-reporting device with at least two samples use real pressure.
pub fn simulates_pressure(stroke: &Stroke) -> bool {
    !(stroke.pen && stroke.points.len() >= 2)
}

/// Shaper options for a stroke at the given device pixel ratio.
pub fn outline_options(stroke: &Stroke, device_pixel_ratio: f64) -> OutlineOptions {
    let size = if stroke.tool.is_fat() {
        stroke.size * 2.0
    } else {
        stroke.size
    };
    OutlineOptions {
        size: size * device_pixel_ratio,
        thinning: stroke.tool.thinning(),
        simulate_pressure: simulates_pressure(stroke),
        last: stroke.done,
        ..OutlineOptions::default()
    }
}

/// Paints strokes as filled freehand outlines.
pub struct StrokePainter {
    shaper: Box<dyn OutlineShaper>,
    device_pixel_ratio: f64,
}

impl StrokePainter {
    pub fn new(device_pixel_ratio: f64) -> Self {
        Self::with_shaper(Box::new(FreehandShaper), device_pixel_ratio)
    }

    pub fn with_shaper(shaper: Box<dyn OutlineShaper>, device_pixel_ratio: f64) -> Self {
        Self {
            shaper,
            device_pixel_ratio,
        }
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    pub fn set_device_pixel_ratio(&mut self, device_pixel_ratio: f64) {
        self.device_pixel_ratio = device_pixel_ratio;
    }

    /// Paint `stroke` with the given composite mode. Returns false when the
    /// stroke has no drawable outline.
    pub fn paint<T: PaintTarget + ?Sized>(
        &self,
        target: &mut T,
        stroke: &Stroke,
        transform: Affine,
        composite: Composite,
    ) -> bool {
        let options = outline_options(stroke, self.device_pixel_ratio);
        let outline = self.shaper.outline(&stroke.points, &options);
        if outline.len() < 2 {
            return false;
        }
        let path = outline_to_path(&outline);

        if stroke.is_privileged() && stroke.tool == Tool::Ink {
            let contrast: Color = stroke.color.contrasting().into();
            let width = (options.size * OUTLINE_WIDTH_RATIO).max(1.0);
            target.stroke_path(&path, transform, contrast, width);
        }

        let fill: Color = match stroke.tool {
            // Only coverage matters when erasing.
            Tool::Eraser => StrokeColor::black().into(),
            Tool::Ink | Tool::Highlighter => stroke.color.into(),
        };
        target.fill_path(&path, transform, fill, composite);
        true
    }

    /// Paint an in-progress stroke straight onto the target.
    pub fn paint_live<T: PaintTarget + ?Sized>(
        &self,
        target: &mut T,
        stroke: &Stroke,
        transform: Affine,
    ) -> bool {
        self.paint(target, stroke, transform, Composite::for_tool(stroke.tool))
    }
}

impl std::fmt::Debug for StrokePainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrokePainter")
            .field("device_pixel_ratio", &self.device_pixel_ratio)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::{DrawCommand, RecordingSurface, Surface};
    use crate::stroke::{Privilege, StrokePoint};
    use kurbo::Rect;

    fn stroke(tool: Tool, privilege: Privilege, pen: bool) -> Stroke {
        let points: Vec<StrokePoint> = (0..20)
            .map(|i| StrokePoint::new(100.0 + i as f64 * 3.0, 100.0, 0.8))
            .collect();
        Stroke {
            id: "s".into(),
            created_at: 0.0,
            tool,
            size: 10.0,
            color: StrokeColor::rgb(0x1a, 0x1c, 0x2c),
            bbox: Rect::new(0.0, 0.0, 1.0, 1.0),
            points,
            done: true,
            pen,
            privilege,
        }
    }

    #[test]
    fn test_outline_options_by_tool() {
        let ink = outline_options(&stroke(Tool::Ink, Privilege::User, false), 2.0);
        assert_eq!(ink.size, 20.0);
        assert_eq!(ink.thinning, 0.65);
        assert!(ink.last);

        let eraser = outline_options(&stroke(Tool::Eraser, Privilege::User, false), 2.0);
        assert_eq!(eraser.size, 40.0);
        assert_eq!(eraser.thinning, -0.65);

        let highlighter = outline_options(&stroke(Tool::Highlighter, Privilege::User, false), 1.0);
        assert_eq!(highlighter.size, 20.0);
        assert_eq!(highlighter.thinning, 0.65);
    }

    #[test]
    fn test_pressure_simulation_rule() {
        assert!(simulates_pressure(&stroke(Tool::Ink, Privilege::User, false)));
        assert!(!simulates_pressure(&stroke(Tool::Ink, Privilege::User, true)));

        let mut single = stroke(Tool::Ink, Privilege::User, true);
        single.points.truncate(1);
        assert!(simulates_pressure(&single));
    }

    #[test]
    fn test_live_paint_uses_tool_composite() {
        let painter = StrokePainter::new(1.0);
        let mut surface = RecordingSurface::new(kurbo::Size::new(400.0, 400.0));
        for (tool, composite) in [
            (Tool::Ink, Composite::SourceOver),
            (Tool::Eraser, Composite::DestinationOut),
            (Tool::Highlighter, Composite::Multiply),
        ] {
            surface.clear();
            assert!(painter.paint_live(&mut surface, &stroke(tool, Privilege::User, false), Affine::IDENTITY));
            match surface.commands().last() {
                Some(DrawCommand::Fill { composite: c, .. }) => assert_eq!(*c, composite),
                other => panic!("expected fill, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_privileged_ink_outlined_before_fill() {
        let painter = StrokePainter::new(1.0);
        let mut surface = RecordingSurface::new(kurbo::Size::new(400.0, 400.0));
        painter.paint_live(&mut surface, &stroke(Tool::Ink, Privilege::Admin, false), Affine::IDENTITY);
        let cmds = surface.commands();
        assert_eq!(cmds.len(), 2);
        match (&cmds[0], &cmds[1]) {
            (DrawCommand::Stroke { color, .. }, DrawCommand::Fill { .. }) => {
                assert_eq!(*color, StrokeColor::white());
            }
            other => panic!("unexpected commands {other:?}"),
        }
    }

    #[test]
    fn test_privileged_eraser_not_outlined() {
        let painter = StrokePainter::new(1.0);
        let mut surface = RecordingSurface::new(kurbo::Size::new(400.0, 400.0));
        painter.paint_live(&mut surface, &stroke(Tool::Eraser, Privilege::Admin, false), Affine::IDENTITY);
        assert_eq!(surface.commands().len(), 1);
    }

    #[test]
    fn test_empty_stroke_paints_nothing() {
        let painter = StrokePainter::new(1.0);
        let mut surface = RecordingSurface::new(kurbo::Size::new(400.0, 400.0));
        let mut s = stroke(Tool::Ink, Privilege::User, false);
        s.points.clear();
        assert!(!painter.paint_live(&mut surface, &s, Affine::IDENTITY));
        assert!(surface.commands().is_empty());
    }
}
