use egui::{Pos2, Vec2};

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 5.0;
/// Increment used by the zoom-in / zoom-out actions.
pub const ZOOM_STEP: f32 = 0.1;

/// Device ↔ canvas mapping: `canvas = (device - pan) / zoom`.
///
/// Only pointer input goes through this; pixels are never resampled by it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    zoom: f32,
    pan: Vec2,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { zoom: 1.0, pan: Vec2::ZERO }
    }
}

impl Viewport {
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn pan(&self) -> Vec2 {
        self.pan
    }

    /// Add `delta` to the zoom level, clamped to `[MIN_ZOOM, MAX_ZOOM]`.
    /// Non-finite deltas are ignored.
    pub fn adjust_zoom(&mut self, delta: f32) {
        if !delta.is_finite() {
            return;
        }
        self.zoom = (self.zoom + delta).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn zoom_in(&mut self) {
        self.adjust_zoom(ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.adjust_zoom(-ZOOM_STEP);
    }

    /// Adjust zoom while keeping the canvas point under `anchor` (device
    /// space) in place, as wheel zooming does.
    pub fn zoom_around(&mut self, delta: f32, anchor: Pos2) {
        let fixed = self.to_canvas(anchor);
        self.adjust_zoom(delta);
        self.pan = anchor.to_vec2() - fixed.to_vec2() * self.zoom;
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        if delta.x.is_finite() && delta.y.is_finite() {
            self.pan += delta;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn to_canvas(&self, device: Pos2) -> Pos2 {
        ((device - self.pan).to_vec2() / self.zoom).to_pos2()
    }

    pub fn to_device(&self, canvas: Pos2) -> Pos2 {
        (canvas.to_vec2() * self.zoom + self.pan).to_pos2()
    }
}
