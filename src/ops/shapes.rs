//! Signed-distance rasterisers. Every function returns a distance that is
//! negative inside the shape; `edge_coverage` turns it into a one-pixel
//! anti-aliased alpha.

use egui::Pos2;

use crate::ops::draw::{Coverage, ShapeKind};

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
pub fn edge_coverage(distance: f32) -> f32 {
    smoothstep(0.5, -0.5, distance)
}

fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let qx = px.abs() - hx;
    let qy = py.abs() - hy;
    let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
    outside + qx.max(qy).min(0.0)
}

pub fn sdf_segment(px: f32, py: f32, a: Pos2, b: Pos2) -> f32 {
    let (bax, bay) = (b.x - a.x, b.y - a.y);
    let (pax, pay) = (px - a.x, py - a.y);
    let len2 = bax * bax + bay * bay;
    let t = if len2 <= f32::EPSILON { 0.0 } else { ((pax * bax + pay * bay) / len2).clamp(0.0, 1.0) };
    let (dx, dy) = (pax - bax * t, pay - bay * t);
    (dx * dx + dy * dy).sqrt()
}

/// Distance to an arbitrary simple polygon (even-odd inside test).
pub fn sdf_polygon(px: f32, py: f32, verts: &[(f32, f32)]) -> f32 {
    let n = verts.len();
    if n < 3 {
        return f32::MAX;
    }
    let mut best = f32::MAX;
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = verts[i];
        let (xj, yj) = verts[j];
        best = best.min(sdf_segment(px, py, Pos2::new(xi, yi), Pos2::new(xj, yj)));
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    if inside { -best } else { best }
}

/// Round-capped segment of `width`, the unit of freehand drawing.
pub fn stroke_coverage(from: Pos2, to: Pos2, width: f32, canvas_w: u32, canvas_h: u32) -> Option<Coverage> {
    let r = (width * 0.5).max(0.5);
    let mut cov = Coverage::clipped(
        from.x.min(to.x) - r - 1.0,
        from.y.min(to.y) - r - 1.0,
        from.x.max(to.x) + r + 1.0,
        from.y.max(to.y) + r + 1.0,
        canvas_w,
        canvas_h,
    )?;
    cov.fill_with(|x, y| edge_coverage(sdf_segment(x, y, from, to) - r));
    Some(cov)
}

/// Outline (or outline plus interior when `filled`) of a drag-defined shape.
pub fn shape_coverage(
    kind: ShapeKind,
    start: Pos2,
    end: Pos2,
    width: f32,
    filled: bool,
    canvas_w: u32,
    canvas_h: u32,
) -> Option<Coverage> {
    let half = (width * 0.5).max(0.5);
    let band = move |d: f32| {
        if filled { edge_coverage(d - half) } else { edge_coverage(d.abs() - half) }
    };

    match kind {
        ShapeKind::Line => stroke_coverage(start, end, width, canvas_w, canvas_h),
        ShapeKind::Rectangle => {
            let (min_x, max_x) = (start.x.min(end.x), start.x.max(end.x));
            let (min_y, max_y) = (start.y.min(end.y), start.y.max(end.y));
            let (cx, cy) = ((min_x + max_x) * 0.5, (min_y + max_y) * 0.5);
            let (hx, hy) = ((max_x - min_x) * 0.5, (max_y - min_y) * 0.5);
            let mut cov = Coverage::clipped(
                min_x - half - 1.0,
                min_y - half - 1.0,
                max_x + half + 1.0,
                max_y + half + 1.0,
                canvas_w,
                canvas_h,
            )?;
            cov.fill_with(|x, y| band(sdf_box(x - cx, y - cy, hx, hy)));
            Some(cov)
        }
        ShapeKind::Circle => {
            let r = start.distance(end);
            let mut cov = Coverage::clipped(
                start.x - r - half - 1.0,
                start.y - r - half - 1.0,
                start.x + r + half + 1.0,
                start.y + r + half + 1.0,
                canvas_w,
                canvas_h,
            )?;
            cov.fill_with(|x, y| band(start.distance(Pos2::new(x, y)) - r));
            Some(cov)
        }
    }
}
