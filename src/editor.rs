//! Explicit application state and the command interface the shell drives it
//! through. Nothing here knows about egui widgets or windows: pointer and
//! keyboard input arrive as [`Command`] values in device coordinates and the
//! caller gets back a [`Response`] describing what to do next.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use egui::{Pos2, Vec2};
use image::{Rgba, RgbaImage};

use crate::canvas::{LayerId, LayerStack, TiledBitmap};
use crate::components::history::HistoryManager;
use crate::components::tools::{Tool, ToolController, ToolProperties, ToolResponse};
use crate::compositor::{self, BlendMode};
use crate::error::{CanvasError, CanvasResult};
use crate::io;
use crate::ops::draw::GradientColors;
use crate::ops::stamps::StampSet;
use crate::settings::{Action, AppSettings};
use crate::viewport::Viewport;

#[derive(Clone, Debug)]
pub enum Command {
    // Pointer, in device coordinates.
    Press(Pos2),
    Move(Pos2),
    Release(Pos2),
    PointerOut,

    CommitText(String),
    CancelText,

    Undo,
    Redo,

    SelectTool(Tool),
    SetColor(Rgba<u8>),
    SetBrushWidth(f32),
    SetOpacity(f32),
    SetGradient(Option<GradientColors>),
    SetFillShapes(bool),
    SelectStamp(String),

    AddLayer,
    SelectLayer(LayerId),
    SetLayerVisibility(LayerId, bool),
    SetLayerOpacity(LayerId, f32),
    SetLayerBlendMode(LayerId, BlendMode),
    /// Destructive: the shell confirms with the user before sending this.
    ClearActiveLayer,

    /// A decoded image to scale-to-fit onto the active layer.
    ImportImage(RgbaImage),
    /// Space available to the canvas, chrome margins not yet subtracted.
    ResizeViewport { available: Vec2 },

    ZoomIn,
    ZoomOut,
    ResetZoom,
    AdjustZoom(f32),
    ZoomAround { delta: f32, anchor: Pos2 },
    Pan(Vec2),
    ToggleGrid,
    ToggleRulers,
}

impl Command {
    /// Keyboard actions the editor can carry out alone. Save, Open and
    /// ClearLayer need a dialog first and return `None`.
    pub fn from_action(action: Action) -> Option<Self> {
        if let Some(tool) = action.tool() {
            return Some(Command::SelectTool(tool));
        }
        match action {
            Action::Undo => Some(Command::Undo),
            Action::Redo => Some(Command::Redo),
            Action::ToggleGrid => Some(Command::ToggleGrid),
            Action::ToggleRulers => Some(Command::ToggleRulers),
            Action::ResetZoom => Some(Command::ResetZoom),
            Action::ZoomIn => Some(Command::ZoomIn),
            Action::ZoomOut => Some(Command::ZoomOut),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Response {
    /// The display image changed.
    pub repaint: bool,
    /// Open a text entry anchored at this canvas point.
    pub text_entry: Option<Pos2>,
    pub picked_color: Option<Rgba<u8>>,
}

impl Response {
    fn repaint() -> Self {
        Self { repaint: true, ..Default::default() }
    }
}

impl From<ToolResponse> for Response {
    fn from(r: ToolResponse) -> Self {
        Self { repaint: r.repaint, text_entry: r.text_entry, picked_color: r.picked_color }
    }
}

pub struct Editor {
    layers: LayerStack,
    history: HistoryManager,
    tools: ToolController,
    viewport: Viewport,
    show_grid: bool,
    show_rulers: bool,
    margin: Vec2,
    display: RgbaImage,
    /// Bumped whenever `display` is re-rendered.
    generation: u64,
}

impl Editor {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_settings(&AppSettings::default(), width, height)
    }

    pub fn with_settings(settings: &AppSettings, width: u32, height: u32) -> Self {
        let layers = LayerStack::new(width, height);
        let history = HistoryManager::with_limit(&layers, settings.max_undo_steps);
        let tools = ToolController::new(ToolProperties {
            color: settings.brush_color,
            width: settings.brush_width,
            ..Default::default()
        });
        let display = compositor::render(&layers);
        Self {
            layers,
            history,
            tools,
            viewport: Viewport::default(),
            show_grid: settings.show_grid,
            show_rulers: settings.show_rulers,
            margin: Vec2::new(settings.canvas_margin_x, settings.canvas_margin_y),
            display,
            generation: 0,
        }
    }

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn tools(&self) -> &ToolController {
        &self.tools
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn show_grid(&self) -> bool {
        self.show_grid
    }

    pub fn show_rulers(&self) -> bool {
        self.show_rulers
    }

    /// The last composited image.
    pub fn display(&self) -> &RgbaImage {
        &self.display
    }

    pub fn display_generation(&self) -> u64 {
        self.generation
    }

    pub fn add_stamps(&mut self, set: StampSet) {
        self.tools.add_stamps(set);
    }

    pub fn apply(&mut self, command: Command) -> CanvasResult<Response> {
        let result = self.dispatch(command);
        if let Err(CanvasError::InvalidLayer(id)) = &result {
            log::error!("command addressed missing layer {}", id);
        }
        let response = result?;
        if response.repaint {
            self.refresh();
        }
        Ok(response)
    }

    fn dispatch(&mut self, command: Command) -> CanvasResult<Response> {
        let Self { layers, history, tools, viewport, show_grid, show_rulers, margin, display, .. } = self;
        let response: Response = match command {
            Command::Press(p) if tools.tool() == Tool::Eyedropper => tools.pick(display, viewport.to_canvas(p)).into(),
            Command::Press(p) => tools.press(layers, history, viewport.to_canvas(p))?.into(),
            Command::Move(p) => tools.move_to(layers, viewport.to_canvas(p))?.into(),
            Command::Release(p) => tools.release(layers, history, viewport.to_canvas(p))?.into(),
            Command::PointerOut => tools.pointer_out(layers, history)?.into(),

            Command::CommitText(body) => tools.commit_text(layers, history, &body)?.into(),
            Command::CancelText => {
                tools.cancel_text();
                Response::default()
            }

            Command::Undo => step_history(tools, layers, history, HistoryManager::undo)?,
            Command::Redo => step_history(tools, layers, history, HistoryManager::redo)?,

            Command::SelectTool(tool) => {
                let response: Response = tools.pointer_out(layers, history)?.into();
                tools.cancel_text();
                tools.set_tool(tool);
                log::debug!("tool: {}", tool.label());
                response
            }
            Command::SetColor(color) => {
                tools.properties.color = color;
                Response::default()
            }
            Command::SetBrushWidth(width) => {
                if width.is_finite() {
                    tools.properties.width = width.max(1.0);
                }
                Response::default()
            }
            Command::SetOpacity(opacity) => {
                if opacity.is_finite() {
                    tools.properties.opacity = opacity.clamp(0.0, 1.0);
                }
                Response::default()
            }
            Command::SetGradient(gradient) => {
                tools.properties.gradient = gradient;
                Response::default()
            }
            Command::SetFillShapes(fill) => {
                tools.properties.fill_shapes = fill;
                Response::default()
            }
            Command::SelectStamp(name) => {
                if tools.stamps().get(&name).is_none() {
                    log::warn!("no stamp named '{}'", name);
                }
                tools.properties.stamp = name;
                Response::default()
            }

            Command::AddLayer => {
                let response: Response = tools.pointer_out(layers, history)?.into();
                layers.add_layer();
                response
            }
            Command::SelectLayer(id) => {
                let response: Response = tools.pointer_out(layers, history)?.into();
                layers.set_active(id)?;
                response
            }
            Command::SetLayerVisibility(id, visible) => {
                layers.set_visibility(id, visible)?;
                Response::repaint()
            }
            Command::SetLayerOpacity(id, opacity) => {
                layers.set_opacity(id, opacity)?;
                Response::repaint()
            }
            Command::SetLayerBlendMode(id, mode) => {
                layers.set_blend_mode(id, mode)?;
                Response::repaint()
            }
            Command::ClearActiveLayer => {
                tools.pointer_out(layers, history)?;
                layers.clear_layer(layers.active_id())?;
                history.snapshot(layers);
                Response::repaint()
            }

            Command::ImportImage(image) => {
                tools.pointer_out(layers, history)?;
                let op = io::import_op(&image, layers.width(), layers.height());
                layers.paint(layers.active_id(), &op)?;
                history.snapshot(layers);
                log::info!(
                    "imported {}x{} image onto {}x{} canvas",
                    image.width(),
                    image.height(),
                    layers.width(),
                    layers.height()
                );
                Response::repaint()
            }
            Command::ResizeViewport { available } => {
                let size = available - *margin * 2.0;
                let w = size.x.floor().max(1.0) as u32;
                let h = size.y.floor().max(1.0) as u32;
                if (w, h) == (layers.width(), layers.height()) {
                    return Ok(Response::default());
                }
                if !TiledBitmap::size_allowed(w, h) {
                    log::warn!("viewport {}x{} too large, keeping the current canvas", w, h);
                    return Ok(Response::default());
                }
                let mut response: Response = tools.pointer_out(layers, history)?.into();
                response.repaint |= layers.resize_all(w, h);
                response
            }

            Command::ZoomIn => {
                viewport.zoom_in();
                Response::default()
            }
            Command::ZoomOut => {
                viewport.zoom_out();
                Response::default()
            }
            Command::ResetZoom => {
                viewport.reset();
                Response::default()
            }
            Command::AdjustZoom(delta) => {
                viewport.adjust_zoom(delta);
                Response::default()
            }
            Command::ZoomAround { delta, anchor } => {
                viewport.zoom_around(delta, anchor);
                Response::default()
            }
            Command::Pan(delta) => {
                viewport.pan_by(delta);
                Response::default()
            }
            Command::ToggleGrid => {
                *show_grid = !*show_grid;
                Response::default()
            }
            Command::ToggleRulers => {
                *show_rulers = !*show_rulers;
                Response::default()
            }
        };
        Ok(response)
    }

    /// Decode `bytes` and import them. Invalid data leaves the canvas as it
    /// was and returns the decode error for the shell to report.
    pub fn import_encoded(&mut self, bytes: &[u8]) -> CanvasResult<Response> {
        match io::decode_image(bytes) {
            Ok(image) => self.apply(Command::ImportImage(image)),
            Err(e) => {
                log::warn!("import failed: {}", e);
                Err(e)
            }
        }
    }

    /// Flatten the layers and write them to `dir` under the dated name.
    pub fn export_to(&self, dir: &Path, now: SystemTime) -> CanvasResult<PathBuf> {
        io::export_png(&compositor::render(&self.layers), dir, now)
    }

    fn refresh(&mut self) {
        self.display = compositor::render(&self.layers);
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Undo or redo, finishing any drag in flight first. A pending text entry
/// survives and is placed on the restored canvas when confirmed.
fn step_history(
    tools: &mut ToolController,
    layers: &mut LayerStack,
    history: &mut HistoryManager,
    step: fn(&mut HistoryManager, &mut LayerStack) -> bool,
) -> CanvasResult<Response> {
    let mut response: Response = tools.pointer_out(layers, history)?.into();
    response.repaint |= step(history, layers);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2};

    #[test]
    fn pointer_input_is_mapped_through_viewport() {
        let mut editor = Editor::new(100, 100);
        editor.apply(Command::AdjustZoom(1.0)).unwrap();
        editor.apply(Command::Pan(vec2(10.0, 10.0))).unwrap();
        editor.apply(Command::Press(pos2(50.0, 50.0))).unwrap();
        editor.apply(Command::Release(pos2(50.0, 50.0))).unwrap();
        // (50 - 10) / 2 = 20
        assert_eq!(editor.display().get_pixel(20, 20)[3], 255);
        assert_eq!(editor.display().get_pixel(50, 50)[3], 0);
    }

    #[test]
    fn resize_keeps_content_and_history() {
        let mut editor = Editor::new(50, 50);
        editor.apply(Command::Press(pos2(5.0, 5.0))).unwrap();
        editor.apply(Command::Release(pos2(5.0, 5.0))).unwrap();
        let before = editor.history().len();

        let margin = AppSettings::default().canvas_margin_x;
        let r = editor
            .apply(Command::ResizeViewport { available: vec2(120.0 + 2.0 * margin, 80.0 + 2.0 * margin) })
            .unwrap();
        assert!(r.repaint);
        assert_eq!((editor.layers().width(), editor.layers().height()), (120, 80));
        assert_eq!(editor.display().dimensions(), (120, 80));
        assert_eq!(editor.history().len(), before);
        assert_eq!(editor.display().get_pixel(5, 5)[3], 255);
    }

    #[test]
    fn oversized_viewport_keeps_canvas_and_content() {
        let mut editor = Editor::new(50, 50);
        editor.apply(Command::Press(pos2(5.0, 5.0))).unwrap();
        editor.apply(Command::Release(pos2(5.0, 5.0))).unwrap();
        let generation = editor.display_generation();

        let r = editor.apply(Command::ResizeViewport { available: vec2(20_000.0, 20_000.0) }).unwrap();
        assert!(!r.repaint);
        assert_eq!((editor.layers().width(), editor.layers().height()), (50, 50));
        assert_eq!(editor.display_generation(), generation);
        assert_eq!(editor.layers().active_layer().pixels.get_pixel(5, 5)[3], 255);
    }

    #[test]
    fn text_confirmed_after_undo_is_still_placed() {
        let mut editor = Editor::new(80, 80);
        editor.apply(Command::Press(pos2(5.0, 5.0))).unwrap();
        editor.apply(Command::Release(pos2(5.0, 5.0))).unwrap();
        editor.apply(Command::SelectTool(Tool::Text)).unwrap();
        let r = editor.apply(Command::Press(pos2(10.0, 40.0))).unwrap();
        assert_eq!(r.text_entry, Some(pos2(10.0, 40.0)));

        editor.apply(Command::Undo).unwrap();
        assert_eq!(editor.tools().pending_text(), Some(pos2(10.0, 40.0)));
        let before = editor.history().len();
        let r = editor.apply(Command::CommitText("hello".into())).unwrap();
        assert!(r.repaint);
        assert_eq!(editor.history().len(), before);
        assert_eq!(editor.history().undo_count(), 1);
        assert!(!editor.history().can_redo());
        assert_eq!(editor.tools().pending_text(), None);
    }

    #[test]
    fn eyedropper_samples_the_display() {
        let mut editor = Editor::new(40, 40);
        editor.apply(Command::SetColor(Rgba([10, 200, 30, 255]))).unwrap();
        editor.apply(Command::SelectTool(Tool::BucketFill)).unwrap();
        editor.apply(Command::Press(pos2(1.0, 1.0))).unwrap();
        editor.apply(Command::SetColor(Rgba([0, 0, 0, 255]))).unwrap();
        editor.apply(Command::SelectTool(Tool::Eyedropper)).unwrap();

        let r = editor.apply(Command::Press(pos2(20.0, 20.0))).unwrap();
        assert_eq!(r.picked_color, Some(Rgba([10, 200, 30, 255])));
        assert_eq!(editor.tools().properties.color, Rgba([10, 200, 30, 255]));
        assert_eq!(editor.history().len(), 2);
    }

    #[test]
    fn undo_during_drag_finishes_the_stroke_first() {
        let mut editor = Editor::new(50, 50);
        editor.apply(Command::Press(pos2(5.0, 5.0))).unwrap();
        editor.apply(Command::Move(pos2(30.0, 5.0))).unwrap();
        editor.apply(Command::Undo).unwrap();
        assert!(!editor.tools().is_drawing());
        assert!(editor.layers().active_layer().pixels.is_blank());
        assert!(editor.history().can_redo());
    }

    #[test]
    fn unknown_layer_is_an_error() {
        let mut editor = Editor::new(10, 10);
        let other = Editor::new(10, 10);
        let stray = other.layers().active_id();
        let result = editor.apply(Command::SetLayerVisibility(stray, false));
        assert!(matches!(result, Err(CanvasError::InvalidLayer(id)) if id == stray));
    }

    #[test]
    fn clear_is_one_undoable_action() {
        let mut editor = Editor::new(20, 20);
        editor.apply(Command::Press(pos2(5.0, 5.0))).unwrap();
        editor.apply(Command::Release(pos2(5.0, 5.0))).unwrap();
        editor.apply(Command::ClearActiveLayer).unwrap();
        assert!(editor.layers().active_layer().pixels.is_blank());
        editor.apply(Command::Undo).unwrap();
        assert!(!editor.layers().active_layer().pixels.is_blank());
    }

    #[test]
    fn bad_import_leaves_canvas_alone() {
        let mut editor = Editor::new(20, 20);
        let generation = editor.display_generation();
        assert!(matches!(editor.import_encoded(b"nope"), Err(CanvasError::Decode(_))));
        assert_eq!(editor.history().len(), 1);
        assert_eq!(editor.display_generation(), generation);
    }

    #[test]
    fn keyboard_actions_map_to_commands() {
        assert!(matches!(Command::from_action(Action::Undo), Some(Command::Undo)));
        assert!(matches!(Command::from_action(Action::ToolLine), Some(Command::SelectTool(Tool::Line))));
        assert!(Command::from_action(Action::Save).is_none());
        assert!(Command::from_action(Action::ClearLayer).is_none());
    }
}
