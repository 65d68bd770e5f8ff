use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{Layer, LayerStack};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Additive,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
            BlendMode::Additive,
        ]
    }

    /// Label shown in the layer panel.
    pub fn display_name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::HardLight => "Hard Light",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::Additive => "Additive",
        }
    }

    fn channel(&self, base: f32, top: f32) -> f32 {
        match self {
            BlendMode::Normal => top,
            BlendMode::Multiply => base * top,
            BlendMode::Screen => 1.0 - (1.0 - base) * (1.0 - top),
            BlendMode::Overlay => overlay_channel(base, top),
            BlendMode::Darken => base.min(top),
            BlendMode::Lighten => base.max(top),
            BlendMode::ColorDodge => {
                if top >= 1.0 { 1.0 } else { (base / (1.0 - top)).min(1.0) }
            }
            BlendMode::ColorBurn => {
                if top <= 0.0 { 0.0 } else { (1.0 - (1.0 - base) / top).max(0.0) }
            }
            BlendMode::HardLight => overlay_channel(top, base),
            BlendMode::SoftLight => soft_light_channel(base, top),
            BlendMode::Difference => (base - top).abs(),
            BlendMode::Exclusion => base + top - 2.0 * base * top,
            BlendMode::Additive => (base + top).min(1.0),
        }
    }
}

fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

/// W3C soft-light.
fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

/// Composite `top` over `base` (straight alpha) with a blend mode and an
/// extra opacity multiplier on `top`.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let base_a = base[3] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity.min(1.0);
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let b = base[c] as f32 / 255.0;
        let t = top[c] as f32 / 255.0;
        // Blend against the backdrop only where the backdrop exists.
        let mixed = mode.channel(b, t) * base_a + t * (1.0 - base_a);
        let v = (mixed * top_a + b * base_a * (1.0 - top_a)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// Flatten the visible layers bottom to top into a fresh image.
///
/// Pure over the stack: no caches, no side effects. Rows are spread across
/// the rayon pool but each pixel folds the layers in the same order, so the
/// result does not depend on scheduling.
pub fn render(stack: &LayerStack) -> RgbaImage {
    let (width, height) = (stack.width(), stack.height());
    let visible: Vec<&Layer> = stack.layers().iter().filter(|l| l.visible).collect();
    let mut out = RgbaImage::new(width, height);
    if visible.is_empty() {
        return out;
    }

    let stride = width as usize * 4;
    let raw: &mut [u8] = out.as_mut();
    raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let y = y as u32;
        for (x, dst) in row.chunks_exact_mut(4).enumerate() {
            let mut acc = Rgba([0, 0, 0, 0]);
            for layer in &visible {
                let px = *layer.pixels.get_pixel(x as u32, y);
                acc = blend_pixel(acc, px, layer.blend_mode, layer.opacity());
            }
            dst.copy_from_slice(&acc.0);
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_top_leaves_base() {
        let base = Rgba([10, 20, 30, 255]);
        for mode in BlendMode::all() {
            assert_eq!(blend_pixel(base, Rgba([255, 255, 255, 0]), *mode, 1.0), base);
        }
    }

    #[test]
    fn normal_half_opacity_over_nothing_keeps_colour() {
        let out = blend_pixel(Rgba([0, 0, 0, 0]), Rgba([255, 0, 0, 255]), BlendMode::Normal, 0.5);
        assert_eq!(out, Rgba([255, 0, 0, 128]));
    }

    #[test]
    fn multiply_darkens_opaque_backdrop() {
        let out = blend_pixel(
            Rgba([200, 200, 200, 255]),
            Rgba([128, 255, 0, 255]),
            BlendMode::Multiply,
            1.0,
        );
        assert_eq!(out[3], 255);
        assert!(out[0] < 200);
        assert_eq!(out[1], 200);
        assert_eq!(out[2], 0);
    }

    #[test]
    fn blend_over_empty_backdrop_is_mode_independent() {
        let top = Rgba([40, 90, 200, 255]);
        for mode in BlendMode::all() {
            assert_eq!(blend_pixel(Rgba([0, 0, 0, 0]), top, *mode, 1.0), top, "{:?}", mode);
        }
    }
}
