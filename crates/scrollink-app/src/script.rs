//! Deterministic scribbles for the headless participant.

use kurbo::Size;
use scrollink_core::{PointerEvent, PointerSample};

/// Frames per scripted stroke, including the pointer-up frame.
const STROKE_FRAMES: u64 = 48;
/// Idle frames between strokes.
const GAP_FRAMES: u64 = 12;
/// Tool shortcut pressed before each stroke, cycling.
const TOOL_KEYS: [&str; 4] = ["d", "s", "d", "e"];

/// Sine-wave strokes across the canvas, one lane per stroke.
#[derive(Debug, Clone)]
pub struct ScribbleScript {
    area: Size,
    strokes: u64,
}

/// What the script wants to happen on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    pub key: Option<&'static str>,
    pub pointer: Option<PointerEvent>,
}

impl ScribbleScript {
    /// `area` is in logical pixels; `strokes` is how many to draw in total.
    pub fn new(area: Size, strokes: u64) -> Self {
        Self { area, strokes }
    }

    pub fn total_frames(&self) -> u64 {
        self.strokes * (STROKE_FRAMES + GAP_FRAMES)
    }

    pub fn is_done(&self, frame: u64) -> bool {
        frame >= self.total_frames()
    }

    fn position(&self, stroke: u64, t: f64) -> (f64, f64) {
        let lanes = 5.0;
        let lane = (stroke % 5) as f64;
        let lane_height = self.area.height / lanes;
        let x = self.area.width * (0.1 + 0.8 * t);
        let y = lane_height * (lane + 0.5) + (t * std::f64::consts::TAU * 2.0).sin() * lane_height * 0.3;
        (x, y)
    }

    /// The step for `frame`, counted from zero.
    pub fn step(&self, frame: u64) -> ScriptStep {
        let idle = ScriptStep {
            key: None,
            pointer: None,
        };
        if self.is_done(frame) {
            return idle;
        }
        let stroke = frame / (STROKE_FRAMES + GAP_FRAMES);
        let local = frame % (STROKE_FRAMES + GAP_FRAMES);
        if local >= STROKE_FRAMES {
            return idle;
        }

        let t = local as f64 / (STROKE_FRAMES - 1) as f64;
        let (x, y) = self.position(stroke, t);
        let sample = PointerSample::mouse(x, y);
        match local {
            0 => ScriptStep {
                key: Some(TOOL_KEYS[(stroke % TOOL_KEYS.len() as u64) as usize]),
                pointer: Some(PointerEvent::Down(sample)),
            },
            l if l == STROKE_FRAMES - 1 => ScriptStep {
                key: None,
                pointer: Some(PointerEvent::Up(sample)),
            },
            _ => ScriptStep {
                key: None,
                pointer: Some(PointerEvent::Move(sample)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stroke_shape() {
        let script = ScribbleScript::new(Size::new(800.0, 600.0), 2);
        let first = script.step(0);
        assert_eq!(first.key, Some("d"));
        assert!(matches!(first.pointer, Some(PointerEvent::Down(_))));
        assert!(matches!(script.step(1).pointer, Some(PointerEvent::Move(_))));
        assert!(matches!(script.step(STROKE_FRAMES - 1).pointer, Some(PointerEvent::Up(_))));
        assert_eq!(script.step(STROKE_FRAMES).pointer, None);
    }

    #[test]
    fn test_script_ends() {
        let script = ScribbleScript::new(Size::new(800.0, 600.0), 3);
        assert_eq!(script.total_frames(), 3 * 60);
        assert!(!script.is_done(179));
        assert!(script.is_done(180));
        assert_eq!(script.step(500).pointer, None);
    }

    #[test]
    fn test_positions_stay_inside_area() {
        let area = Size::new(300.0, 200.0);
        let script = ScribbleScript::new(area, 5);
        for frame in 0..script.total_frames() {
            if let Some(event) = script.step(frame).pointer {
                let p = event.sample().position;
                assert!(p.x >= 0.0 && p.x <= area.width);
                assert!(p.y >= 0.0 && p.y <= area.height);
            }
        }
    }
}
