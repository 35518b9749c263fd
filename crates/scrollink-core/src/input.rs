//! Pointer input events.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Device class that produced a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    #[default]
    Mouse,
    Touch,
    Pen,
}

/// One pointer sample as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub pointer_id: i64,
    /// Position in logical (CSS) pixels relative to the canvas.
    pub position: Point,
    /// Pressure in `0.0..=1.0`, if the device reports any.
    pub pressure: Option<f64>,
    pub kind: PointerKind,
}

impl PointerSample {
    pub fn mouse(x: f64, y: f64) -> Self {
        Self {
            pointer_id: 1,
            position: Point::new(x, y),
            pressure: None,
            kind: PointerKind::Mouse,
        }
    }

    pub fn touch(pointer_id: i64, x: f64, y: f64) -> Self {
        Self {
            pointer_id,
            position: Point::new(x, y),
            pressure: None,
            kind: PointerKind::Touch,
        }
    }

    pub fn pen(x: f64, y: f64, pressure: f64) -> Self {
        Self {
            pointer_id: 2,
            position: Point::new(x, y),
            pressure: Some(pressure),
            kind: PointerKind::Pen,
        }
    }

    /// Whether this sample carries genuine pressure.
    pub fn is_pen(&self) -> bool {
        self.kind == PointerKind::Pen && self.pressure.is_some()
    }
}

/// Unified pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerEvent {
    Down(PointerSample),
    Move(PointerSample),
    Up(PointerSample),
}

impl PointerEvent {
    pub fn sample(&self) -> &PointerSample {
        match self {
            PointerEvent::Down(s) | PointerEvent::Move(s) | PointerEvent::Up(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pen_detection() {
        assert!(PointerSample::pen(0.0, 0.0, 0.3).is_pen());
        assert!(!PointerSample::mouse(0.0, 0.0).is_pen());

        let mut no_pressure = PointerSample::pen(0.0, 0.0, 0.3);
        no_pressure.pressure = None;
        assert!(!no_pressure.is_pen());
    }

    #[test]
    fn test_event_json() {
        let event = PointerEvent::Down(PointerSample::touch(7, 1.0, 2.0));
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "down");
        assert_eq!(json["kind"], "touch");
        assert_eq!(json["pointer_id"], 7);
        let back: PointerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
