use std::sync::Arc;

use ab_glyph::FontArc;
use egui::Pos2;
use image::{Rgba, RgbaImage};

use crate::canvas::TiledBitmap;
use crate::compositor::{BlendMode, blend_pixel};
use crate::ops::{fill, shapes, text};

/// Two end colours of a linear gradient. The geometry comes from the
/// gesture that uses it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientColors {
    pub start: Rgba<u8>,
    pub end: Rgba<u8>,
}

/// Where the colour of a primitive comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Paint {
    Solid(Rgba<u8>),
    Linear { colors: GradientColors, from: Pos2, to: Pos2 },
}

impl Paint {
    pub fn color_at(&self, x: f32, y: f32) -> Rgba<u8> {
        match *self {
            Paint::Solid(c) => c,
            Paint::Linear { colors, from, to } => {
                let (dx, dy) = (to.x - from.x, to.y - from.y);
                let len2 = dx * dx + dy * dy;
                let t = if len2 <= f32::EPSILON {
                    0.0
                } else {
                    (((x - from.x) * dx + (y - from.y) * dy) / len2).clamp(0.0, 1.0)
                };
                let mut out = [0u8; 4];
                for (c, slot) in out.iter_mut().enumerate() {
                    let a = colors.start[c] as f32;
                    let b = colors.end[c] as f32;
                    *slot = (a + (b - a) * t).round() as u8;
                }
                Rgba(out)
            }
        }
    }
}

/// How a primitive's coverage lands on the layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PaintMode {
    /// Source-over.
    #[default]
    Blend,
    /// Destination-out: coverage removes alpha and reveals layers below.
    Erase,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Brush {
    pub width: f32,
    pub paint: Paint,
    pub opacity: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Rectangle,
    /// Centred on the drag start, radius reaches the drag end.
    Circle,
    Line,
}

/// A single paint primitive, already resolved to canvas coordinates.
#[derive(Clone)]
pub enum DrawOp {
    /// One freehand segment. `from == to` paints a round dot.
    Stroke { from: Pos2, to: Pos2, brush: Brush, mode: PaintMode },
    Shape { kind: ShapeKind, start: Pos2, end: Pos2, brush: Brush, filled: bool },
    /// `origin` is the left end of the first line's baseline.
    Text { text: String, origin: Pos2, size: f32, color: Rgba<u8>, font: FontArc },
    /// Source-over blit with the image's top-left at `origin`.
    Image { image: Arc<RgbaImage>, origin: (i32, i32), opacity: f32 },
    FloodFill { seed: (u32, u32), color: Rgba<u8>, tolerance: u8 },
    Clear,
}

impl DrawOp {
    pub fn apply(&self, bitmap: &mut TiledBitmap) {
        let (w, h) = (bitmap.width(), bitmap.height());
        match self {
            DrawOp::Stroke { from, to, brush, mode } => {
                if let Some(cov) = shapes::stroke_coverage(*from, *to, brush.width, w, h) {
                    apply_coverage(bitmap, &cov, &brush.paint, brush.opacity, *mode);
                }
            }
            DrawOp::Shape { kind, start, end, brush, filled } => {
                if let Some(cov) = shapes::shape_coverage(*kind, *start, *end, brush.width, *filled, w, h) {
                    apply_coverage(bitmap, &cov, &brush.paint, brush.opacity, PaintMode::Blend);
                }
            }
            DrawOp::Text { text: body, origin, size, color, font } => {
                if let Some(cov) = text::rasterize_text(font, body, *origin, *size, w, h) {
                    apply_coverage(bitmap, &cov, &Paint::Solid(*color), 1.0, PaintMode::Blend);
                }
            }
            DrawOp::Image { image, origin, opacity } => blit_image(bitmap, image, *origin, *opacity),
            DrawOp::FloodFill { seed, color, tolerance } => {
                fill::flood_fill(bitmap, *seed, *color, *tolerance);
            }
            DrawOp::Clear => bitmap.clear(),
        }
    }
}

// ============================================================================
// COVERAGE
// ============================================================================

/// Anti-aliased alpha mask over a canvas-clipped rectangle.
pub struct Coverage {
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
    alpha: Vec<f32>,
}

impl Coverage {
    /// Mask over `[min, max)` clipped to the canvas; `None` when nothing of
    /// it is on the canvas.
    pub fn clipped(min_x: f32, min_y: f32, max_x: f32, max_y: f32, canvas_w: u32, canvas_h: u32) -> Option<Self> {
        let x0 = min_x.floor().max(0.0) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let x1 = (max_x.ceil().max(0.0) as u32).min(canvas_w);
        let y1 = (max_y.ceil().max(0.0) as u32).min(canvas_h);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        let (width, height) = (x1 - x0, y1 - y0);
        Some(Self { x0, y0, width, height, alpha: vec![0.0; (width * height) as usize] })
    }

    /// Fill every cell from a function of the pixel centre.
    pub fn fill_with(&mut self, f: impl Fn(f32, f32) -> f32) {
        for row in 0..self.height {
            for col in 0..self.width {
                let cx = (self.x0 + col) as f32 + 0.5;
                let cy = (self.y0 + row) as f32 + 0.5;
                self.alpha[(row * self.width + col) as usize] = f(cx, cy).clamp(0.0, 1.0);
            }
        }
    }

    /// Raise the cell at canvas `(x, y)` to at least `value`.
    pub fn raise(&mut self, x: i32, y: i32, value: f32) {
        if x < self.x0 as i32 || y < self.y0 as i32 {
            return;
        }
        let (col, row) = (x as u32 - self.x0, y as u32 - self.y0);
        if col >= self.width || row >= self.height {
            return;
        }
        let cell = &mut self.alpha[(row * self.width + col) as usize];
        *cell = cell.max(value.clamp(0.0, 1.0));
    }

    /// `(x, y, alpha)` for every cell with any coverage.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, f32)> + '_ {
        self.alpha.iter().enumerate().filter(|(_, a)| **a > 0.0).map(move |(i, a)| {
            let i = i as u32;
            (self.x0 + i % self.width, self.y0 + i / self.width, *a)
        })
    }
}

fn apply_coverage(bitmap: &mut TiledBitmap, cov: &Coverage, paint: &Paint, opacity: f32, mode: PaintMode) {
    let opacity = opacity.clamp(0.0, 1.0);
    for (x, y, a) in cov.iter() {
        let base = *bitmap.get_pixel(x, y);
        match mode {
            PaintMode::Blend => {
                let mut src = paint.color_at(x as f32 + 0.5, y as f32 + 0.5);
                src[3] = (src[3] as f32 * a * opacity).round() as u8;
                if src[3] > 0 {
                    bitmap.put_pixel(x, y, blend_pixel(base, src, BlendMode::Normal, 1.0));
                }
            }
            PaintMode::Erase => {
                if base[3] == 0 {
                    continue;
                }
                let keep = 1.0 - a * opacity;
                let mut out = base;
                out[3] = (base[3] as f32 * keep).round() as u8;
                if out[3] == 0 {
                    out = Rgba([0, 0, 0, 0]);
                }
                bitmap.put_pixel(x, y, out);
            }
        }
    }
}

fn blit_image(bitmap: &mut TiledBitmap, image: &RgbaImage, origin: (i32, i32), opacity: f32) {
    let (w, h) = (bitmap.width() as i64, bitmap.height() as i64);
    for (sx, sy, px) in image.enumerate_pixels() {
        if px[3] == 0 {
            continue;
        }
        let x = origin.0 as i64 + sx as i64;
        let y = origin.1 as i64 + sy as i64;
        if x < 0 || y < 0 || x >= w || y >= h {
            continue;
        }
        let (x, y) = (x as u32, y as u32);
        let base = *bitmap.get_pixel(x, y);
        bitmap.put_pixel(x, y, blend_pixel(base, *px, BlendMode::Normal, opacity));
    }
}
