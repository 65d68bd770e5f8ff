use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::SystemTime;

use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, Sense, Stroke, TextureHandle, TextureOptions, Vec2};
use image::{Rgba, RgbaImage};

use sketchboard::canvas::LayerId;
use sketchboard::components::tools::Tool;
use sketchboard::compositor::{self, BlendMode};
use sketchboard::io;
use sketchboard::ops::draw::GradientColors;
use sketchboard::ops::stamps::StampSet;
use sketchboard::settings::{Action, AppSettings};
use sketchboard::viewport::ZOOM_STEP;
use sketchboard::{CanvasResult, Command, Editor, Response};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tga", "ico"];
/// Grid spacing in canvas pixels.
const GRID_SPACING: f32 = 32.0;
const RULER_SIZE: f32 = 18.0;

/// Background work whose result is applied on the UI thread.
enum Pending {
    Import { path: PathBuf, rx: Receiver<CanvasResult<RgbaImage>> },
    Stamps { rx: Receiver<CanvasResult<StampSet>> },
}

pub struct SketchboardApp {
    editor: Editor,
    settings: AppSettings,

    canvas_texture: Option<TextureHandle>,
    texture_generation: Option<u64>,
    /// Panel size the canvas was last fitted to.
    last_available: Vec2,

    // Modals (at most one of these is open at a time)
    text_entry: Option<String>,
    confirm_clear: bool,

    pending: Vec<Pending>,
    status: String,

    // Widget state mirrored from the tool properties
    gradient_enabled: bool,
    gradient: GradientColors,
}

impl SketchboardApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let settings = AppSettings::load();
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        // Placeholder size; the first frame fits the canvas to the window.
        let editor = Editor::with_settings(&settings, 800, 600);

        let mut pending = Vec::new();
        if !settings.stamp_dir.is_empty() {
            let dir = PathBuf::from(&settings.stamp_dir);
            log::info!("loading stamps from {}", dir.display());
            pending.push(Pending::Stamps { rx: io::spawn_loader(move || StampSet::load_dir(&dir)) });
        }

        let color = settings.brush_color;
        Self {
            editor,
            settings,
            canvas_texture: None,
            texture_generation: None,
            last_available: Vec2::ZERO,
            text_entry: None,
            confirm_clear: false,
            pending,
            status: String::new(),
            gradient_enabled: false,
            gradient: GradientColors { start: color, end: Rgba([255, 255, 255, 255]) },
        }
    }

    fn modal_open(&self) -> bool {
        self.text_entry.is_some() || self.confirm_clear
    }

    /// Apply one command and react to what the editor reports back.
    fn run(&mut self, command: Command) {
        match self.editor.apply(command) {
            Ok(response) => self.handle_response(response),
            Err(e) => self.status = e.to_string(),
        }
    }

    fn handle_response(&mut self, response: Response) {
        if response.text_entry.is_some() {
            self.text_entry = Some(String::new());
        } else if self.editor.tools().pending_text().is_none() {
            // The editor let go of the entry, so the window goes too.
            self.text_entry = None;
        }
        if let Some(c) = response.picked_color {
            self.status = format!("Picked {},{},{},{}", c[0], c[1], c[2], c[3]);
        }
    }

    // ---- keyboard ----------------------------------------------------------

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if self.modal_open() || ctx.wants_keyboard_input() {
            return;
        }
        let events = ctx.input(|i| i.events.clone());
        let actions: Vec<Action> = events
            .iter()
            .filter_map(|event| match event {
                egui::Event::Key { key, pressed: true, modifiers, .. } => {
                    self.settings.keybindings.resolve(*key, *modifiers)
                }
                _ => None,
            })
            .collect();

        for action in actions {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Save => self.handle_save(),
            Action::Open => self.handle_open(),
            Action::ClearLayer => self.confirm_clear = true,
            other => {
                let Some(command) = Command::from_action(other) else { return };
                let toggles = matches!(command, Command::ToggleGrid | Command::ToggleRulers);
                self.run(command);
                if toggles {
                    self.settings.show_grid = self.editor.show_grid();
                    self.settings.show_rulers = self.editor.show_rulers();
                    self.settings.save();
                }
            }
        }
    }

    // ---- file IO -----------------------------------------------------------

    fn handle_open(&mut self) {
        let Some(path) = rfd::FileDialog::new().add_filter("Image", IMAGE_EXTENSIONS).pick_file() else {
            return;
        };
        log::info!("decoding {}", path.display());
        let job_path = path.clone();
        let rx = io::spawn_loader(move || io::load_image(&job_path));
        self.status = format!("Loading {}…", path.display());
        self.pending.push(Pending::Import { path, rx });
    }

    fn handle_save(&mut self) {
        let now = SystemTime::now();
        let mut dialog = rfd::FileDialog::new()
            .add_filter("PNG", &["png"])
            .set_file_name(io::export_file_name(now));
        if !self.settings.export_dir.is_empty() {
            dialog = dialog.set_directory(&self.settings.export_dir);
        }
        let Some(path) = dialog.save_file() else { return };

        let flat = compositor::render(self.editor.layers());
        match io::encode_png(&flat, &path) {
            Ok(()) => {
                log::info!("saved {}", path.display());
                self.status = format!("Saved {}", path.display());
            }
            Err(e) => {
                log::error!("save failed: {}", e);
                self.status = format!("Save failed: {}", e);
            }
        }
    }

    fn poll_pending(&mut self) {
        let mut still_pending = Vec::new();
        for job in std::mem::take(&mut self.pending) {
            match job {
                Pending::Import { path, rx } => match rx.try_recv() {
                    Ok(Ok(image)) => {
                        self.status = format!("Imported {}", path.display());
                        self.run(Command::ImportImage(image));
                    }
                    Ok(Err(e)) => {
                        log::warn!("could not open {}: {}", path.display(), e);
                        self.status = format!("Could not open {}: {}", path.display(), e);
                    }
                    Err(TryRecvError::Empty) => still_pending.push(Pending::Import { path, rx }),
                    Err(TryRecvError::Disconnected) => log::warn!("import worker for {} vanished", path.display()),
                },
                Pending::Stamps { rx } => match rx.try_recv() {
                    Ok(Ok(set)) => {
                        log::info!("loaded {} stamps", set.len());
                        self.editor.add_stamps(set);
                    }
                    Ok(Err(e)) => log::warn!("could not load stamps: {}", e),
                    Err(TryRecvError::Empty) => still_pending.push(Pending::Stamps { rx }),
                    Err(TryRecvError::Disconnected) => {}
                },
            }
        }
        self.pending = still_pending;
    }

    // ---- panels ------------------------------------------------------------

    fn show_tools_panel(&mut self, ctx: &egui::Context) {
        let mut commands = Vec::new();
        let mut action = None;
        let enabled = !self.modal_open();

        egui::SidePanel::left("tools_panel").resizable(false).default_width(200.0).show(ctx, |ui| {
            ui.set_enabled(enabled);
            ui.heading("Tools");
            let current = self.editor.tools().tool();
            egui::Grid::new("tool_grid").num_columns(2).show(ui, |ui| {
                for (i, tool) in Tool::all().iter().enumerate() {
                    if ui.selectable_label(current == *tool, tool.label()).clicked() && current != *tool {
                        commands.push(Command::SelectTool(*tool));
                    }
                    if i % 2 == 1 {
                        ui.end_row();
                    }
                }
            });

            ui.separator();
            let props = &self.editor.tools().properties;

            let mut color = to_color32(props.color);
            ui.horizontal(|ui| {
                ui.label("Colour");
                if egui::color_picker::color_edit_button_srgba(ui, &mut color, egui::color_picker::Alpha::OnlyBlend)
                    .changed()
                {
                    commands.push(Command::SetColor(from_color32(color)));
                }
            });

            let mut width = props.width;
            if ui.add(egui::Slider::new(&mut width, 1.0..=100.0).text("Width")).changed() {
                commands.push(Command::SetBrushWidth(width));
            }
            let mut opacity = props.opacity;
            if ui.add(egui::Slider::new(&mut opacity, 0.0..=1.0).text("Opacity")).changed() {
                commands.push(Command::SetOpacity(opacity));
            }

            let mut fill = props.fill_shapes;
            if ui.checkbox(&mut fill, "Fill shapes").changed() {
                commands.push(Command::SetFillShapes(fill));
            }

            let mut gradient_changed = ui.checkbox(&mut self.gradient_enabled, "Gradient").changed();
            if self.gradient_enabled {
                ui.horizontal(|ui| {
                    let mut start = to_color32(self.gradient.start);
                    let mut end = to_color32(self.gradient.end);
                    let alpha = egui::color_picker::Alpha::OnlyBlend;
                    gradient_changed |= egui::color_picker::color_edit_button_srgba(ui, &mut start, alpha).changed();
                    ui.label("→");
                    gradient_changed |= egui::color_picker::color_edit_button_srgba(ui, &mut end, alpha).changed();
                    self.gradient = GradientColors { start: from_color32(start), end: from_color32(end) };
                });
            }
            if gradient_changed {
                commands.push(Command::SetGradient(self.gradient_enabled.then_some(self.gradient)));
            }

            if current == Tool::Stamp {
                ui.separator();
                let selected = props.stamp.clone();
                egui::ComboBox::from_id_source("stamp_select").selected_text(selected.as_str()).show_ui(ui, |ui| {
                    for name in self.editor.tools().stamps().names() {
                        if ui.selectable_label(name == selected, name).clicked() {
                            commands.push(Command::SelectStamp(name.to_string()));
                        }
                    }
                });
            }

            ui.separator();
            ui.horizontal(|ui| {
                let history = self.editor.history();
                if ui.add_enabled(history.can_undo(), egui::Button::new("Undo")).clicked() {
                    commands.push(Command::Undo);
                }
                if ui.add_enabled(history.can_redo(), egui::Button::new("Redo")).clicked() {
                    commands.push(Command::Redo);
                }
            });
            ui.horizontal(|ui| {
                if ui.button("Open…").clicked() {
                    action = Some(Action::Open);
                }
                if ui.button("Save…").clicked() {
                    action = Some(Action::Save);
                }
                if ui.button("Clear").clicked() {
                    action = Some(Action::ClearLayer);
                }
            });

            ui.separator();
            layers_ui(ui, &self.editor, &mut commands);
        });

        for command in commands {
            self.run(command);
        }
        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn show_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let layers = self.editor.layers();
                let history = self.editor.history();
                ui.label(format!("{}×{}", layers.width(), layers.height()));
                ui.separator();
                ui.label(format!("{:.0}%", self.editor.viewport().zoom() * 100.0));
                ui.separator();
                ui.label(format!("undo {} / redo {}", history.undo_count(), history.redo_count()));
                ui.separator();
                ui.label(format!(
                    "{} layers {} / history {}",
                    layers.len(),
                    format_bytes(layers.memory_bytes()),
                    format_bytes(history.memory_usage())
                ));
                ui.separator();
                ui.label(self.status.as_str());
            });
        });
    }

    // ---- canvas ------------------------------------------------------------

    fn show_canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().frame(egui::Frame::none().fill(Color32::from_gray(40))).show(ctx, |ui| {
            let available = ui.available_size();
            if available != self.last_available {
                self.last_available = available;
                self.run(Command::ResizeViewport { available });
            }

            let (panel, response) = ui.allocate_exact_size(available, Sense::click_and_drag());
            let margin = Vec2::new(self.settings.canvas_margin_x, self.settings.canvas_margin_y);
            let origin = panel.min + margin;
            self.upload_texture(ctx);

            let viewport = *self.editor.viewport();
            let layers = self.editor.layers();
            let size = Vec2::new(layers.width() as f32, layers.height() as f32);
            let canvas_rect = Rect::from_min_size(origin + viewport.pan(), size * viewport.zoom());

            let painter = ui.painter_at(panel);
            painter.rect_filled(canvas_rect, 0.0, Color32::WHITE);
            if let Some(texture) = &self.canvas_texture {
                let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
                painter.image(texture.id(), canvas_rect, uv, Color32::WHITE);
            }
            if self.editor.show_grid() {
                draw_grid(&painter, canvas_rect, viewport.zoom());
            }
            if self.editor.show_rulers() {
                draw_rulers(&painter, panel, canvas_rect, viewport.zoom());
            }

            if !self.modal_open() {
                self.handle_pointer(ctx, &response, origin);
            }
        });
    }

    fn handle_pointer(&mut self, ctx: &egui::Context, response: &egui::Response, origin: Pos2) {
        let (pos, pressed, released, scroll, command_held) = ctx.input(|i| {
            (
                i.pointer.interact_pos(),
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.scroll_delta,
                i.modifiers.command,
            )
        });
        let device = pos.map(|p| (p - origin).to_pos2());

        if response.dragged_by(egui::PointerButton::Middle) {
            self.run(Command::Pan(response.drag_delta()));
        }
        if response.hovered() && scroll != Vec2::ZERO {
            if command_held {
                if let Some(anchor) = device {
                    self.run(Command::ZoomAround { delta: scroll.y.signum() * ZOOM_STEP, anchor });
                }
            } else {
                self.run(Command::Pan(scroll));
            }
        }

        let drawing = self.editor.tools().is_drawing();
        match device {
            Some(p) if pressed && response.hovered() => self.run(Command::Press(p)),
            Some(p) if released && drawing => self.run(Command::Release(p)),
            Some(p) if drawing && response.hovered() => self.run(Command::Move(p)),
            _ if drawing && !response.hovered() => self.run(Command::PointerOut),
            _ => {}
        }
    }

    fn upload_texture(&mut self, ctx: &egui::Context) {
        let generation = self.editor.display_generation();
        if self.texture_generation == Some(generation) && self.canvas_texture.is_some() {
            return;
        }
        let display = self.editor.display();
        let size = [display.width() as usize, display.height() as usize];
        let image = ColorImage::from_rgba_unmultiplied(size, display.as_raw());
        match &mut self.canvas_texture {
            Some(texture) => texture.set(image, TextureOptions::NEAREST),
            None => self.canvas_texture = Some(ctx.load_texture("canvas", image, TextureOptions::NEAREST)),
        }
        self.texture_generation = Some(generation);
    }

    // ---- modals ------------------------------------------------------------

    fn show_modals(&mut self, ctx: &egui::Context) {
        if let Some(mut buffer) = self.text_entry.take() {
            let mut outcome = None;
            egui::Window::new("Add text")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
                .show(ctx, |ui| {
                    let edit = ui.text_edit_singleline(&mut buffer);
                    edit.request_focus();
                    let enter = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    ui.horizontal(|ui| {
                        if ui.button("Place").clicked() || enter {
                            outcome = Some(true);
                        }
                        if ui.button("Cancel").clicked() || ui.input(|i| i.key_pressed(egui::Key::Escape)) {
                            outcome = Some(false);
                        }
                    });
                });
            match outcome {
                Some(true) => self.run(Command::CommitText(buffer)),
                Some(false) => self.run(Command::CancelText),
                None => self.text_entry = Some(buffer),
            }
        }

        if self.confirm_clear {
            let mut outcome = None;
            egui::Window::new("Clear layer?")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
                .show(ctx, |ui| {
                    ui.label(format!("Erase everything on \"{}\"?", self.editor.layers().active_layer().name));
                    ui.horizontal(|ui| {
                        if ui.button("Clear").clicked() {
                            outcome = Some(true);
                        }
                        if ui.button("Keep").clicked() {
                            outcome = Some(false);
                        }
                    });
                });
            if let Some(confirmed) = outcome {
                self.confirm_clear = false;
                if confirmed {
                    self.run(Command::ClearActiveLayer);
                }
            }
        }
    }
}

impl eframe::App for SketchboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_pending();
        self.handle_shortcuts(ctx);

        self.show_tools_panel(ctx);
        self.show_status_bar(ctx);
        self.show_canvas(ctx);
        self.show_modals(ctx);

        if !self.pending.is_empty() {
            ctx.request_repaint();
        }
    }
}

fn format_bytes(bytes: usize) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    if bytes as f64 >= MB {
        format!("{:.1} MB", bytes as f64 / MB)
    } else {
        format!("{} KB", bytes.div_ceil(1024))
    }
}

fn layers_ui(ui: &mut egui::Ui, editor: &Editor, commands: &mut Vec<Command>) {
    ui.horizontal(|ui| {
        ui.heading("Layers");
        if ui.small_button("+").on_hover_text("Add layer").clicked() {
            commands.push(Command::AddLayer);
        }
    });

    let layers = editor.layers();
    let active = layers.active_id();
    // Top of the stack first, as users expect.
    for layer in layers.layers().iter().rev() {
        let id: LayerId = layer.id();
        ui.horizontal(|ui| {
            let mut visible = layer.visible;
            if ui.checkbox(&mut visible, "").on_hover_text("Visible").changed() {
                commands.push(Command::SetLayerVisibility(id, visible));
            }
            if ui.selectable_label(id == active, layer.name.as_str()).clicked() && id != active {
                commands.push(Command::SelectLayer(id));
            }
        });
        ui.horizontal(|ui| {
            let mut opacity = layer.opacity();
            if ui.add(egui::Slider::new(&mut opacity, 0.0..=1.0).show_value(false)).changed() {
                commands.push(Command::SetLayerOpacity(id, opacity));
            }
            let mut mode = layer.blend_mode;
            egui::ComboBox::from_id_source(("blend", id))
                .selected_text(mode.display_name())
                .width(90.0)
                .show_ui(ui, |ui| {
                    for m in BlendMode::all() {
                        ui.selectable_value(&mut mode, *m, m.display_name());
                    }
                });
            if mode != layer.blend_mode {
                commands.push(Command::SetLayerBlendMode(id, mode));
            }
        });
    }
}

fn to_color32(c: Rgba<u8>) -> Color32 {
    Color32::from_rgba_unmultiplied(c[0], c[1], c[2], c[3])
}

fn from_color32(c: Color32) -> Rgba<u8> {
    Rgba(c.to_srgba_unmultiplied())
}

fn draw_grid(painter: &egui::Painter, canvas: Rect, zoom: f32) {
    let step = GRID_SPACING * zoom;
    if step < 4.0 {
        return;
    }
    let stroke = Stroke::new(1.0, Color32::from_black_alpha(40));
    let mut x = canvas.min.x + step;
    while x < canvas.max.x {
        painter.vline(x, canvas.y_range(), stroke);
        x += step;
    }
    let mut y = canvas.min.y + step;
    while y < canvas.max.y {
        painter.hline(canvas.x_range(), y, stroke);
        y += step;
    }
}

fn draw_rulers(painter: &egui::Painter, panel: Rect, canvas: Rect, zoom: f32) {
    let bg = Color32::from_gray(60);
    let tick = Stroke::new(1.0, Color32::from_gray(170));
    let font = egui::FontId::monospace(9.0);
    painter.rect_filled(Rect::from_min_size(panel.min, Vec2::new(panel.width(), RULER_SIZE)), 0.0, bg);
    painter.rect_filled(Rect::from_min_size(panel.min, Vec2::new(RULER_SIZE, panel.height())), 0.0, bg);

    // Label every 100 canvas px, tick every 10 (fewer when zoomed out).
    let minor = if zoom < 0.5 { 50.0 } else { 10.0 };
    let mut v = 0.0;
    while canvas.min.x + v * zoom < panel.max.x && v <= canvas.width() / zoom {
        let x = canvas.min.x + v * zoom;
        let major = v % 100.0 == 0.0;
        let len = if major { RULER_SIZE } else { RULER_SIZE * 0.35 };
        painter.vline(x, (panel.min.y + RULER_SIZE - len)..=(panel.min.y + RULER_SIZE), tick);
        if major {
            painter.text(Pos2::new(x + 2.0, panel.min.y), egui::Align2::LEFT_TOP, format!("{}", v), font.clone(), tick.color);
        }
        v += minor;
    }
    let mut v = 0.0;
    while canvas.min.y + v * zoom < panel.max.y && v <= canvas.height() / zoom {
        let y = canvas.min.y + v * zoom;
        let major = v % 100.0 == 0.0;
        let len = if major { RULER_SIZE } else { RULER_SIZE * 0.35 };
        painter.hline((panel.min.x + RULER_SIZE - len)..=(panel.min.x + RULER_SIZE), y, tick);
        if major {
            painter.text(Pos2::new(panel.min.x + 1.0, y + 2.0), egui::Align2::LEFT_TOP, format!("{}", v), font.clone(), tick.color);
        }
        v += minor;
    }
}
