use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont, point};
use egui::Pos2;

use crate::ops::draw::Coverage;

/// Lay out `text` starting on the baseline at `origin` and rasterise it into
/// a coverage mask. Newlines start a new line one line-height below.
/// Returns `None` when nothing visible lands on the canvas.
pub fn rasterize_text(
    font: &FontArc,
    text: &str,
    origin: Pos2,
    size: f32,
    canvas_w: u32,
    canvas_h: u32,
) -> Option<Coverage> {
    let scale = PxScale::from(size.max(1.0));
    let scaled = font.as_scaled(scale);
    let line_height = scaled.height() + scaled.line_gap();

    let mut glyphs = Vec::new();
    for (line_idx, line) in text.lines().enumerate() {
        let baseline = origin.y + line_idx as f32 * line_height;
        let mut caret = origin.x;
        let mut prev: Option<GlyphId> = None;
        for ch in line.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(p) = prev {
                caret += scaled.kern(p, id);
            }
            glyphs.push(id.with_scale_and_position(scale, point(caret, baseline)));
            caret += scaled.h_advance(id);
            prev = Some(id);
        }
    }

    let outlined: Vec<_> = glyphs.into_iter().filter_map(|g| font.outline_glyph(g)).collect();
    if outlined.is_empty() {
        return None;
    }

    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for g in &outlined {
        let b = g.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let mut cov = Coverage::clipped(min_x, min_y, max_x, max_y, canvas_w, canvas_h)?;
    for g in &outlined {
        let b = g.px_bounds();
        let (bx, by) = (b.min.x as i32, b.min.y as i32);
        g.draw(|gx, gy, c| cov.raise(bx + gx as i32, by + gy as i32, c));
    }
    Some(cov)
}

/// Best sans-serif face installed on the system, if any.
pub fn load_default_font() -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let handle = SystemSource::new()
        .select_best_match(&[FamilyName::SansSerif], &Properties::new())
        .ok()?;
    let font = handle.load().ok()?;
    let data = font.copy_font_data()?;
    FontArc::try_from_vec((*data).clone()).ok()
}
