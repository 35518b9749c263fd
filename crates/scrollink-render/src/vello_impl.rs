//! Vello-based drawing surface.

use kurbo::{Affine, BezPath, Rect, Shape as KurboShape, Size, Stroke};
use peniko::{BlendMode, Color, Compose, Fill, Mix};
use scrollink_core::paint::{Bitmap, Composite, PaintTarget, Surface};
use vello::Scene;

/// Largest bitmap side handed out, in device pixels.
pub const DEFAULT_MAX_BITMAP_SIDE: f64 = 8192.0;

/// Vello blend mode for a composite operation.
pub fn blend_mode(composite: Composite) -> BlendMode {
    match composite {
        Composite::SourceOver => BlendMode::new(Mix::Normal, Compose::SrcOver),
        Composite::DestinationOut => BlendMode::new(Mix::Normal, Compose::DestOut),
        Composite::Multiply => BlendMode::new(Mix::Multiply, Compose::SrcOver),
    }
}

/// Draw operations issued since the last clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub fills: usize,
    pub strokes: usize,
    pub blits: usize,
    /// Blend layers pushed for non source-over composites.
    pub layers: usize,
}

fn fill_into(scene: &mut Scene, path: &BezPath, transform: Affine, color: Color, composite: Composite) -> bool {
    if composite == Composite::SourceOver {
        scene.fill(Fill::NonZero, transform, color, None, path);
        return false;
    }
    // Blend layers clip to their shape; the path's own box is enough.
    scene.push_layer(blend_mode(composite), 1.0, transform, &path.bounding_box());
    scene.fill(Fill::NonZero, transform, color, None, path);
    scene.pop_layer();
    true
}

fn stroke_into(scene: &mut Scene, path: &BezPath, transform: Affine, color: Color, width: f64) {
    scene.stroke(&Stroke::new(width), transform, color, None, path);
}

/// An offscreen scene holding one baked stroke.
pub struct VelloBitmap {
    scene: Scene,
    size: Size,
}

impl VelloBitmap {
    pub fn scene(&self) -> &Scene {
        &self.scene
    }
}

impl PaintTarget for VelloBitmap {
    fn fill_path(&mut self, path: &BezPath, transform: Affine, color: Color, composite: Composite) {
        fill_into(&mut self.scene, path, transform, color, composite);
    }

    fn stroke_path(&mut self, path: &BezPath, transform: Affine, color: Color, width: f64) {
        stroke_into(&mut self.scene, path, transform, color, width);
    }
}

impl Bitmap for VelloBitmap {
    fn size(&self) -> Size {
        self.size
    }

    fn release(&mut self) {
        self.scene.reset();
        self.size = Size::ZERO;
    }
}

impl std::fmt::Debug for VelloBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VelloBitmap").field("size", &self.size).finish()
    }
}

/// The on-screen surface. Each frame is rebuilt into one scene that the
/// host hands to a `vello::Renderer`.
pub struct VelloSurface {
    scene: Scene,
    size: Size,
    available: bool,
    max_bitmap_side: f64,
    stats: FrameStats,
    bitmaps_created: usize,
}

impl VelloSurface {
    pub fn new(size: Size) -> Self {
        Self {
            scene: Scene::new(),
            size,
            available: true,
            max_bitmap_side: DEFAULT_MAX_BITMAP_SIDE,
            stats: FrameStats::default(),
            bitmaps_created: 0,
        }
    }

    /// Get the built scene for rendering.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Take ownership of the scene (resets internal scene).
    pub fn take_scene(&mut self) -> Scene {
        std::mem::take(&mut self.scene)
    }

    /// Mark the GPU context as lost or restored.
    pub fn set_available(&mut self, available: bool) {
        if self.available != available {
            log::info!("Surface {}", if available { "restored" } else { "lost" });
        }
        self.available = available;
    }

    pub fn set_max_bitmap_side(&mut self, side: f64) {
        self.max_bitmap_side = side;
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Bitmaps handed out so far. Release is tracked by the bitmaps
    /// themselves.
    pub fn bitmaps_created(&self) -> usize {
        self.bitmaps_created
    }
}

impl PaintTarget for VelloSurface {
    fn fill_path(&mut self, path: &BezPath, transform: Affine, color: Color, composite: Composite) {
        if fill_into(&mut self.scene, path, transform, color, composite) {
            self.stats.layers += 1;
        }
        self.stats.fills += 1;
    }

    fn stroke_path(&mut self, path: &BezPath, transform: Affine, color: Color, width: f64) {
        stroke_into(&mut self.scene, path, transform, color, width);
        self.stats.strokes += 1;
    }
}

impl Surface for VelloSurface {
    type Bitmap = VelloBitmap;

    fn is_available(&self) -> bool {
        self.available
    }

    fn size(&self) -> Size {
        self.size
    }

    fn resize(&mut self, size: Size) {
        log::debug!("Surface resized to {}x{}", size.width, size.height);
        self.size = size;
    }

    fn clear(&mut self) {
        self.scene.reset();
        self.stats = FrameStats::default();
    }

    fn create_bitmap(&mut self, size: Size) -> Option<VelloBitmap> {
        let usable = size.width.is_finite()
            && size.height.is_finite()
            && size.width > 0.0
            && size.height > 0.0
            && size.width <= self.max_bitmap_side
            && size.height <= self.max_bitmap_side;
        if !usable {
            return None;
        }
        self.bitmaps_created += 1;
        Some(VelloBitmap {
            scene: Scene::new(),
            size,
        })
    }

    fn draw_bitmap(&mut self, bitmap: &VelloBitmap, transform: Affine, composite: Composite) {
        let clip = Rect::from_origin_size((0.0, 0.0), bitmap.size);
        self.scene
            .push_layer(blend_mode(composite), 1.0, transform, &clip);
        self.scene.append(&bitmap.scene, Some(transform));
        self.scene.pop_layer();
        self.stats.blits += 1;
        self.stats.layers += 1;
    }
}

impl std::fmt::Debug for VelloSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VelloSurface")
            .field("size", &self.size)
            .field("available", &self.available)
            .field("stats", &self.stats)
            .finish()
    }
}
