//! Tool, size and color selection.
//!
//! The toolbar is a thin view over [`StyleControls`]. Each tool remembers its
//! own size and color, and a change only affects the next stroke.

use crate::stroke::{StrokeColor, StrokeStyle, Tool};

/// Selectable stroke sizes.
pub const SIZES: [f64; 4] = [5.0, 10.0, 20.0, 40.0];

/// The fixed 16-color palette.
pub const PALETTE: [StrokeColor; 16] = [
    StrokeColor::rgb(0x1a, 0x1c, 0x2c),
    StrokeColor::rgb(0x5d, 0x27, 0x5d),
    StrokeColor::rgb(0xb1, 0x3e, 0x53),
    StrokeColor::rgb(0xf2, 0x9c, 0xbd),
    StrokeColor::rgb(0xef, 0x7d, 0x57),
    StrokeColor::rgb(0xff, 0xcd, 0x75),
    StrokeColor::rgb(0x38, 0xb7, 0x64),
    StrokeColor::rgb(0x25, 0x71, 0x79),
    StrokeColor::rgb(0x29, 0x36, 0x6f),
    StrokeColor::rgb(0x3b, 0x5d, 0xc9),
    StrokeColor::rgb(0x41, 0xa6, 0xf6),
    StrokeColor::rgb(0x73, 0xef, 0xf7),
    StrokeColor::rgb(0xf4, 0xf4, 0xf4),
    StrokeColor::rgb(0x94, 0xb0, 0xc2),
    StrokeColor::rgb(0x56, 0x6c, 0x86),
    StrokeColor::rgb(0x33, 0x3c, 0x57),
];

/// Map a keyboard shortcut to a tool.
pub fn tool_for_key(key: &str) -> Option<Tool> {
    match key.to_ascii_lowercase().as_str() {
        "d" | "x" | "b" => Some(Tool::Ink),
        "e" => Some(Tool::Eraser),
        "s" | "h" => Some(Tool::Highlighter),
        _ => None,
    }
}

/// Current tool plus per-tool size and color memory.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleControls {
    tool: Tool,
    ink_size: f64,
    ink_color: StrokeColor,
    highlighter_size: f64,
    highlighter_color: StrokeColor,
    eraser_size: f64,
}

impl Default for StyleControls {
    fn default() -> Self {
        Self {
            tool: Tool::Ink,
            ink_size: SIZES[1],
            ink_color: PALETTE[0],
            highlighter_size: SIZES[2],
            highlighter_color: PALETTE[5],
            eraser_size: SIZES[2],
        }
    }
}

impl StyleControls {
    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    /// Apply a keyboard shortcut. Returns true if it selected a tool.
    pub fn handle_key(&mut self, key: &str) -> bool {
        match tool_for_key(key) {
            Some(tool) => {
                self.tool = tool;
                true
            }
            None => false,
        }
    }

    /// Size of the current tool.
    pub fn size(&self) -> f64 {
        self.size_for(self.tool)
    }

    pub fn size_for(&self, tool: Tool) -> f64 {
        match tool {
            Tool::Ink => self.ink_size,
            Tool::Highlighter => self.highlighter_size,
            Tool::Eraser => self.eraser_size,
        }
    }

    /// Set the size of the current tool. Non-positive sizes are ignored.
    pub fn set_size(&mut self, size: f64) {
        if !(size.is_finite() && size > 0.0) {
            return;
        }
        match self.tool {
            Tool::Ink => self.ink_size = size,
            Tool::Highlighter => self.highlighter_size = size,
            Tool::Eraser => self.eraser_size = size,
        }
    }

    /// Color of the current tool. The eraser reports the ink color since it
    /// never renders one.
    pub fn color(&self) -> StrokeColor {
        self.color_for(self.tool)
    }

    pub fn color_for(&self, tool: Tool) -> StrokeColor {
        match tool {
            Tool::Highlighter => self.highlighter_color,
            Tool::Ink | Tool::Eraser => self.ink_color,
        }
    }

    /// Set the color of the current tool. Ignored while erasing.
    pub fn set_color(&mut self, color: StrokeColor) {
        match self.tool {
            Tool::Ink => self.ink_color = color,
            Tool::Highlighter => self.highlighter_color = color,
            Tool::Eraser => {}
        }
    }

    /// Snapshot for a stroke that is about to begin.
    pub fn style(&self) -> StrokeStyle {
        StrokeStyle {
            tool: self.tool,
            size: self.size(),
            color: self.color(),
        }
    }
}
