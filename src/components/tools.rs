use ab_glyph::FontArc;
use egui::Pos2;
use image::{Rgba, RgbaImage};

use crate::canvas::{LayerId, LayerStack, TiledBitmap};
use crate::components::history::HistoryManager;
use crate::error::CanvasResult;
use crate::ops::draw::{Brush, DrawOp, GradientColors, Paint, PaintMode, ShapeKind};
use crate::ops::stamps::{self, StampSet};
use crate::ops::{fill, text};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
    Rectangle,
    Circle,
    Line,
    Text,
    Stamp,
    BucketFill,
    Eyedropper,
}

impl Tool {
    pub fn all() -> &'static [Tool] {
        &[
            Tool::Pen,
            Tool::Eraser,
            Tool::Rectangle,
            Tool::Circle,
            Tool::Line,
            Tool::Text,
            Tool::Stamp,
            Tool::BucketFill,
            Tool::Eyedropper,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tool::Pen => "Pen",
            Tool::Eraser => "Eraser",
            Tool::Rectangle => "Rectangle",
            Tool::Circle => "Circle",
            Tool::Line => "Line",
            Tool::Text => "Text",
            Tool::Stamp => "Stamp",
            Tool::BucketFill => "Bucket Fill",
            Tool::Eyedropper => "Eyedropper",
        }
    }

    fn shape_kind(&self) -> Option<ShapeKind> {
        match self {
            Tool::Rectangle => Some(ShapeKind::Rectangle),
            Tool::Circle => Some(ShapeKind::Circle),
            Tool::Line => Some(ShapeKind::Line),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ToolProperties {
    pub color: Rgba<u8>,
    /// Stroke width in canvas pixels.
    pub width: f32,
    pub opacity: f32,
    /// When set, shapes are painted with a gradient running from the drag
    /// start to the drag end instead of `color`.
    pub gradient: Option<GradientColors>,
    /// Rectangles and circles get their interior painted too.
    pub fill_shapes: bool,
    pub font_size: f32,
    pub stamp: String,
    /// Longer edge of a placed stamp, in canvas pixels.
    pub stamp_size: f32,
    pub fill_tolerance: u8,
}

impl Default for ToolProperties {
    fn default() -> Self {
        Self {
            color: Rgba([0, 0, 0, 255]),
            width: 4.0,
            opacity: 1.0,
            gradient: None,
            fill_shapes: false,
            font_size: 32.0,
            stamp: "star".to_string(),
            stamp_size: 64.0,
            fill_tolerance: 16,
        }
    }
}

/// Pointer gesture in progress. Every variant remembers the layer it
/// started on so that switching the active layer mid-drag cannot split one
/// action across two layers.
enum Gesture {
    Idle,
    Freehand { layer: LayerId, last: Pos2, erase: bool },
    Shape { layer: LayerId, kind: ShapeKind, start: Pos2, current: Pos2, before: TiledBitmap },
    TextEntry { layer: LayerId, origin: Pos2 },
}

/// What the shell needs to know after an input event.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ToolResponse {
    /// Layer pixels changed, the display is stale.
    pub repaint: bool,
    /// A history snapshot was recorded.
    pub committed: bool,
    /// Ask the user for text to place at this canvas point.
    pub text_entry: Option<Pos2>,
    pub picked_color: Option<Rgba<u8>>,
}

impl ToolResponse {
    fn repaint() -> Self {
        Self { repaint: true, ..Default::default() }
    }

    fn committed() -> Self {
        Self { repaint: true, committed: true, ..Default::default() }
    }
}

/// Turns canvas-space pointer events into draw ops on the active layer and
/// decides when an action is complete enough to snapshot.
pub struct ToolController {
    tool: Tool,
    pub properties: ToolProperties,
    gesture: Gesture,
    stamps: StampSet,
    /// `None` until the first text commit; then `Some(lookup result)`.
    font: Option<Option<FontArc>>,
}

impl Default for ToolController {
    fn default() -> Self {
        Self::new(ToolProperties::default())
    }
}

impl ToolController {
    pub fn new(properties: ToolProperties) -> Self {
        Self {
            tool: Tool::default(),
            properties,
            gesture: Gesture::Idle,
            stamps: StampSet::builtin(),
            font: None,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Only valid between gestures; callers finish any drag first.
    pub fn set_tool(&mut self, tool: Tool) {
        if !matches!(self.gesture, Gesture::Idle) {
            log::debug!("tool switched mid-gesture, dropping gesture state");
        }
        self.gesture = Gesture::Idle;
        self.tool = tool;
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.gesture, Gesture::Freehand { .. } | Gesture::Shape { .. })
    }

    pub fn pending_text(&self) -> Option<Pos2> {
        match self.gesture {
            Gesture::TextEntry { origin, .. } => Some(origin),
            _ => None,
        }
    }

    pub fn stamps(&self) -> &StampSet {
        &self.stamps
    }

    pub fn add_stamps(&mut self, set: StampSet) {
        self.stamps.merge(set);
    }

    /// Override the text font. `None` means "no font available".
    pub fn set_font(&mut self, font: Option<FontArc>) {
        self.font = Some(font);
    }

    fn font(&mut self) -> Option<FontArc> {
        self.font
            .get_or_insert_with(|| {
                let font = text::load_default_font();
                if font.is_none() {
                    log::warn!("no system font found, text will not be drawn");
                }
                font
            })
            .clone()
    }

    fn brush(&self, start: Pos2, end: Pos2) -> Brush {
        let paint = match self.properties.gradient {
            Some(colors) => Paint::Linear { colors, from: start, to: end },
            None => Paint::Solid(self.properties.color),
        };
        Brush { width: self.properties.width, paint, opacity: self.properties.opacity }
    }

    fn stroke_op(&self, from: Pos2, to: Pos2, erase: bool) -> DrawOp {
        DrawOp::Stroke {
            from,
            to,
            brush: Brush {
                width: self.properties.width,
                paint: Paint::Solid(self.properties.color),
                opacity: self.properties.opacity,
            },
            mode: if erase { PaintMode::Erase } else { PaintMode::Blend },
        }
    }

    fn shape_op(&self, kind: ShapeKind, start: Pos2, end: Pos2) -> DrawOp {
        let filled = self.properties.fill_shapes && kind != ShapeKind::Line;
        DrawOp::Shape { kind, start, end, brush: self.brush(start, end), filled }
    }

    // ---- gesture events (canvas coordinates) -------------------------------

    pub fn press(&mut self, stack: &mut LayerStack, history: &mut HistoryManager, pos: Pos2) -> CanvasResult<ToolResponse> {
        let mut response = ToolResponse::default();
        if self.is_drawing() {
            response = self.finish(stack, history, None)?;
        }
        let layer = stack.active_id();

        match self.tool {
            Tool::Pen | Tool::Eraser => {
                let erase = self.tool == Tool::Eraser;
                stack.paint(layer, &self.stroke_op(pos, pos, erase))?;
                self.gesture = Gesture::Freehand { layer, last: pos, erase };
                response.repaint = true;
            }
            Tool::Rectangle | Tool::Circle | Tool::Line => {
                let kind = self.tool.shape_kind().unwrap_or(ShapeKind::Line);
                let before = stack.layer(layer)?.pixels.clone();
                self.gesture = Gesture::Shape { layer, kind, start: pos, current: pos, before };
            }
            Tool::Text => {
                self.gesture = Gesture::TextEntry { layer, origin: pos };
                response.text_entry = Some(pos);
            }
            Tool::Stamp => {
                let Some(stamp) = self.stamps.get(&self.properties.stamp) else {
                    log::warn!("unknown stamp '{}'", self.properties.stamp);
                    return Ok(response);
                };
                let op = stamps::place(stamp, pos, self.properties.stamp_size, self.properties.opacity);
                stack.paint(layer, &op)?;
                history.snapshot(stack);
                return Ok(ToolResponse::committed());
            }
            Tool::BucketFill => {
                let Some(seed) = pixel_at(stack, pos) else { return Ok(response) };
                let op = DrawOp::FloodFill {
                    seed,
                    color: self.properties.color,
                    tolerance: self.properties.fill_tolerance,
                };
                stack.paint(layer, &op)?;
                history.snapshot(stack);
                return Ok(ToolResponse::committed());
            }
            // Sampled from the composited image through `pick`.
            Tool::Eyedropper => {}
        }
        Ok(response)
    }

    /// Eyedropper: take the colour under `pos` from an already composited
    /// image. Nothing is painted or recorded.
    pub fn pick(&mut self, composited: &RgbaImage, pos: Pos2) -> ToolResponse {
        let mut response = ToolResponse::default();
        if pos.x >= 0.0
            && pos.y >= 0.0
            && let Some(color) = fill::sample(composited, pos.x.floor() as u32, pos.y.floor() as u32)
        {
            self.properties.color = color;
            response.picked_color = Some(color);
        }
        response
    }

    pub fn move_to(&mut self, stack: &mut LayerStack, pos: Pos2) -> CanvasResult<ToolResponse> {
        match &mut self.gesture {
            Gesture::Freehand { layer, last, erase } => {
                let (layer, from, erase) = (*layer, *last, *erase);
                *last = pos;
                stack.paint(layer, &self.stroke_op(from, pos, erase))?;
                Ok(ToolResponse::repaint())
            }
            Gesture::Shape { layer, kind, start, current, before } => {
                *current = pos;
                let (layer, kind, start) = (*layer, *kind, *start);
                // Back to the pre-gesture pixels so only one preview exists.
                stack.set_pixels(layer, before.clone())?;
                let op = self.shape_op(kind, start, pos);
                stack.paint(layer, &op)?;
                Ok(ToolResponse::repaint())
            }
            _ => Ok(ToolResponse::default()),
        }
    }

    pub fn release(&mut self, stack: &mut LayerStack, history: &mut HistoryManager, pos: Pos2) -> CanvasResult<ToolResponse> {
        self.finish(stack, history, Some(pos))
    }

    /// The pointer left the canvas: the gesture ends where it last was.
    pub fn pointer_out(&mut self, stack: &mut LayerStack, history: &mut HistoryManager) -> CanvasResult<ToolResponse> {
        self.finish(stack, history, None)
    }

    fn finish(&mut self, stack: &mut LayerStack, history: &mut HistoryManager, end: Option<Pos2>) -> CanvasResult<ToolResponse> {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Freehand { layer, last, erase } => {
                if let Some(pos) = end
                    && pos != last
                {
                    stack.paint(layer, &self.stroke_op(last, pos, erase))?;
                }
                history.snapshot(stack);
                Ok(ToolResponse::committed())
            }
            Gesture::Shape { layer, kind, start, current, before } => {
                let end = end.unwrap_or(current);
                stack.set_pixels(layer, before)?;
                stack.paint(layer, &self.shape_op(kind, start, end))?;
                history.snapshot(stack);
                Ok(ToolResponse::committed())
            }
            pending @ Gesture::TextEntry { .. } => {
                // Text waits for commit/cancel, not for the pointer.
                self.gesture = pending;
                Ok(ToolResponse::default())
            }
            Gesture::Idle => Ok(ToolResponse::default()),
        }
    }

    // ---- text entry --------------------------------------------------------

    /// Place `body` at the pending text point. Empty text cancels.
    pub fn commit_text(&mut self, stack: &mut LayerStack, history: &mut HistoryManager, body: &str) -> CanvasResult<ToolResponse> {
        let Gesture::TextEntry { layer, origin } = self.gesture else {
            return Ok(ToolResponse::default());
        };
        self.gesture = Gesture::Idle;
        if body.trim().is_empty() {
            return Ok(ToolResponse::default());
        }
        match self.font() {
            Some(font) => {
                let op = DrawOp::Text {
                    text: body.to_string(),
                    origin,
                    size: self.properties.font_size,
                    color: self.properties.color,
                    font,
                };
                stack.paint(layer, &op)?;
            }
            None => log::warn!("text '{}' committed without a font", body),
        }
        history.snapshot(stack);
        Ok(ToolResponse::committed())
    }

    pub fn cancel_text(&mut self) {
        if matches!(self.gesture, Gesture::TextEntry { .. }) {
            self.gesture = Gesture::Idle;
        }
    }
}

fn pixel_at(stack: &LayerStack, pos: Pos2) -> Option<(u32, u32)> {
    if pos.x < 0.0 || pos.y < 0.0 {
        return None;
    }
    let (x, y) = (pos.x.floor() as u32, pos.y.floor() as u32);
    (x < stack.width() && y < stack.height()).then_some((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor;
    use egui::pos2;

    fn setup() -> (LayerStack, HistoryManager, ToolController) {
        let stack = LayerStack::new(100, 100);
        let history = HistoryManager::new(&stack);
        (stack, history, ToolController::default())
    }

    #[test]
    fn freehand_commits_once_on_release() {
        let (mut stack, mut history, mut tools) = setup();
        tools.press(&mut stack, &mut history, pos2(10.0, 10.0)).unwrap();
        for i in 1..10 {
            tools.move_to(&mut stack, pos2(10.0 + i as f32 * 5.0, 10.0)).unwrap();
        }
        assert_eq!(history.len(), 1);
        let r = tools.release(&mut stack, &mut history, pos2(60.0, 10.0)).unwrap();
        assert!(r.committed);
        assert_eq!(history.len(), 2);
        assert!(!tools.is_drawing());
        assert_eq!(stack.active_layer().pixels.get_pixel(30, 10)[3], 255);
    }

    #[test]
    fn pointer_out_ends_gesture() {
        let (mut stack, mut history, mut tools) = setup();
        tools.set_tool(Tool::Line);
        tools.press(&mut stack, &mut history, pos2(5.0, 5.0)).unwrap();
        tools.move_to(&mut stack, pos2(40.0, 5.0)).unwrap();
        let r = tools.pointer_out(&mut stack, &mut history).unwrap();
        assert!(r.committed);
        assert_eq!(history.len(), 2);
        assert_eq!(stack.active_layer().pixels.get_pixel(30, 5)[3], 255);
        // A second pointer-out is harmless.
        assert!(!tools.pointer_out(&mut stack, &mut history).unwrap().committed);
    }

    #[test]
    fn eyedropper_picks_composited_colour_without_snapshot() {
        let (mut stack, mut history, mut tools) = setup();
        tools.properties.color = Rgba([200, 10, 10, 255]);
        tools.set_tool(Tool::BucketFill);
        tools.press(&mut stack, &mut history, pos2(1.0, 1.0)).unwrap();
        assert_eq!(history.len(), 2);

        tools.properties.color = Rgba([0, 0, 0, 255]);
        tools.set_tool(Tool::Eyedropper);
        let composited = compositor::render(&stack);
        let r = tools.pick(&composited, pos2(50.0, 50.0));
        assert_eq!(r.picked_color, Some(Rgba([200, 10, 10, 255])));
        assert_eq!(tools.properties.color, Rgba([200, 10, 10, 255]));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn eyedropper_outside_the_image_picks_nothing() {
        let (stack, _, mut tools) = setup();
        tools.set_tool(Tool::Eyedropper);
        let composited = compositor::render(&stack);
        assert_eq!(tools.pick(&composited, pos2(-3.0, 10.0)).picked_color, None);
        assert_eq!(tools.pick(&composited, pos2(500.0, 10.0)).picked_color, None);
    }

    #[test]
    fn stamp_places_and_commits() {
        let (mut stack, mut history, mut tools) = setup();
        tools.set_tool(Tool::Stamp);
        tools.properties.stamp = "circle".into();
        tools.properties.stamp_size = 20.0;
        let r = tools.press(&mut stack, &mut history, pos2(50.0, 50.0)).unwrap();
        assert!(r.committed);
        assert_eq!(stack.active_layer().pixels.get_pixel(50, 50)[3], 255);
        assert_eq!(stack.active_layer().pixels.get_pixel(50, 70)[3], 0);
    }

    #[test]
    fn unknown_stamp_does_nothing() {
        let (mut stack, mut history, mut tools) = setup();
        tools.set_tool(Tool::Stamp);
        tools.properties.stamp = "nope".into();
        let r = tools.press(&mut stack, &mut history, pos2(50.0, 50.0)).unwrap();
        assert!(!r.committed);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn text_commit_snapshots_even_without_font() {
        let (mut stack, mut history, mut tools) = setup();
        tools.set_font(None);
        tools.set_tool(Tool::Text);
        let r = tools.press(&mut stack, &mut history, pos2(20.0, 40.0)).unwrap();
        assert_eq!(r.text_entry, Some(pos2(20.0, 40.0)));
        // Releasing the pointer keeps the entry open.
        tools.release(&mut stack, &mut history, pos2(20.0, 40.0)).unwrap();
        assert_eq!(tools.pending_text(), Some(pos2(20.0, 40.0)));

        let r = tools.commit_text(&mut stack, &mut history, "hello").unwrap();
        assert!(r.committed);
        assert_eq!(history.len(), 2);
        assert_eq!(tools.pending_text(), None);
    }

    #[test]
    fn cancelled_or_empty_text_is_not_recorded() {
        let (mut stack, mut history, mut tools) = setup();
        tools.set_font(None);
        tools.set_tool(Tool::Text);
        tools.press(&mut stack, &mut history, pos2(1.0, 1.0)).unwrap();
        tools.cancel_text();
        assert!(!tools.commit_text(&mut stack, &mut history, "late").unwrap().committed);

        tools.press(&mut stack, &mut history, pos2(1.0, 1.0)).unwrap();
        assert!(!tools.commit_text(&mut stack, &mut history, "   ").unwrap().committed);
        assert_eq!(history.len(), 1);
    }
}
