use std::collections::HashMap;
use std::path::{Path, PathBuf};

use eframe::egui;
use image::Rgba;

use crate::components::history::DEFAULT_UNDO_STEPS;
use crate::components::tools::Tool;
use crate::error::CanvasResult;

// ═══════════════════════════════════════════════════════════════════════════
// KEYBINDINGS
// ═══════════════════════════════════════════════════════════════════════════

/// Modifier flags plus one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyCombo {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub key: egui::Key,
}

impl KeyCombo {
    pub fn key(key: egui::Key) -> Self {
        Self { ctrl: false, shift: false, alt: false, key }
    }

    pub fn ctrl_key(key: egui::Key) -> Self {
        Self { ctrl: true, shift: false, alt: false, key }
    }

    /// `ctrl` matches either Ctrl or Cmd so the same config works on macOS.
    pub fn matches(&self, key: egui::Key, mods: egui::Modifiers) -> bool {
        self.key == key
            && self.ctrl == (mods.ctrl || mods.command)
            && self.shift == mods.shift
            && self.alt == mods.alt
    }

    /// Human-readable form, e.g. `Ctrl+Z`.
    pub fn display(&self) -> String {
        let mut parts = Vec::new();
        if self.ctrl { parts.push("Ctrl"); }
        if self.shift { parts.push("Shift"); }
        if self.alt { parts.push("Alt"); }
        parts.push(key_name(self.key));
        parts.join("+")
    }

    /// Config form, e.g. `ctrl+shift+key:Z`.
    pub fn to_config_string(&self) -> String {
        let mut parts = Vec::new();
        if self.ctrl { parts.push("ctrl".to_string()); }
        if self.shift { parts.push("shift".to_string()); }
        if self.alt { parts.push("alt".to_string()); }
        parts.push(format!("key:{}", key_name(self.key)));
        parts.join("+")
    }

    pub fn from_config_string(s: &str) -> Option<Self> {
        let (mut ctrl, mut shift, mut alt, mut key) = (false, false, false, None);
        for part in s.split('+').map(str::trim) {
            match part {
                "ctrl" => ctrl = true,
                "shift" => shift = true,
                "alt" => alt = true,
                other => key = other.strip_prefix("key:").and_then(parse_key_name),
            }
        }
        key.map(|key| Self { ctrl, shift, alt, key })
    }
}

/// Everything reachable from the keyboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Undo,
    Redo,
    Save,
    Open,
    ToggleGrid,
    ToggleRulers,
    ResetZoom,
    ZoomIn,
    ZoomOut,
    /// Clears the active layer once the user confirms.
    ClearLayer,
    ToolPen,
    ToolEraser,
    ToolRectangle,
    ToolCircle,
    ToolLine,
    ToolText,
    ToolStamp,
    ToolBucketFill,
    ToolEyedropper,
}

impl Action {
    pub fn all() -> &'static [Action] {
        use Action::*;
        &[
            Undo, Redo, Save, Open, ToggleGrid, ToggleRulers, ResetZoom, ZoomIn, ZoomOut, ClearLayer,
            ToolPen, ToolEraser, ToolRectangle, ToolCircle, ToolLine, ToolText, ToolStamp,
            ToolBucketFill, ToolEyedropper,
        ]
    }

    /// Name used in `keybind.<name>=` config lines.
    pub fn config_name(&self) -> String {
        format!("{:?}", self)
    }

    pub fn from_config_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|a| a.config_name() == name)
    }

    pub fn tool(&self) -> Option<Tool> {
        match self {
            Action::ToolPen => Some(Tool::Pen),
            Action::ToolEraser => Some(Tool::Eraser),
            Action::ToolRectangle => Some(Tool::Rectangle),
            Action::ToolCircle => Some(Tool::Circle),
            Action::ToolLine => Some(Tool::Line),
            Action::ToolText => Some(Tool::Text),
            Action::ToolStamp => Some(Tool::Stamp),
            Action::ToolBucketFill => Some(Tool::BucketFill),
            Action::ToolEyedropper => Some(Tool::Eyedropper),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyBindings {
    bindings: HashMap<Action, KeyCombo>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        use Action::*;
        use egui::Key;
        let bindings = HashMap::from([
            (Undo, KeyCombo::ctrl_key(Key::Z)),
            (Redo, KeyCombo::ctrl_key(Key::Y)),
            (Save, KeyCombo::ctrl_key(Key::S)),
            (Open, KeyCombo::ctrl_key(Key::O)),
            (ToggleGrid, KeyCombo::ctrl_key(Key::G)),
            (ToggleRulers, KeyCombo::ctrl_key(Key::R)),
            (ResetZoom, KeyCombo::ctrl_key(Key::Num0)),
            (ZoomIn, KeyCombo::ctrl_key(Key::PlusEquals)),
            (ZoomOut, KeyCombo::ctrl_key(Key::Minus)),
            (ClearLayer, KeyCombo::key(Key::Delete)),
            (ToolPen, KeyCombo::key(Key::P)),
            (ToolEraser, KeyCombo::key(Key::E)),
            (ToolRectangle, KeyCombo::key(Key::R)),
            (ToolCircle, KeyCombo::key(Key::C)),
            (ToolLine, KeyCombo::key(Key::L)),
            (ToolText, KeyCombo::key(Key::T)),
            (ToolStamp, KeyCombo::key(Key::S)),
            (ToolBucketFill, KeyCombo::key(Key::B)),
            (ToolEyedropper, KeyCombo::key(Key::I)),
        ]);
        Self { bindings }
    }
}

impl KeyBindings {
    pub fn get(&self, action: Action) -> Option<&KeyCombo> {
        self.bindings.get(&action)
    }

    pub fn set(&mut self, action: Action, combo: KeyCombo) {
        self.bindings.insert(action, combo);
    }

    /// The action bound to exactly this key and modifier set.
    pub fn resolve(&self, key: egui::Key, mods: egui::Modifiers) -> Option<Action> {
        Action::all()
            .iter()
            .copied()
            .find(|a| self.bindings.get(a).is_some_and(|c| c.matches(key, mods)))
    }

    pub fn to_config_lines(&self) -> Vec<String> {
        Action::all()
            .iter()
            .filter_map(|a| {
                self.bindings
                    .get(a)
                    .map(|c| format!("keybind.{}={}", a.config_name(), c.to_config_string()))
            })
            .collect()
    }

    pub fn load_config_line(&mut self, action_name: &str, combo_str: &str) {
        match (Action::from_config_name(action_name), KeyCombo::from_config_string(combo_str)) {
            (Some(action), Some(combo)) => self.set(action, combo),
            _ => log::warn!("ignoring keybinding {}={}", action_name, combo_str),
        }
    }
}

fn key_name(k: egui::Key) -> &'static str {
    use egui::Key::*;
    match k {
        Delete => "Delete", Backspace => "Backspace", Escape => "Esc", Enter => "Enter",
        Space => "Space", Tab => "Tab", Minus => "-", PlusEquals => "+",
        Num0 => "0", Num1 => "1", Num2 => "2", Num3 => "3", Num4 => "4",
        Num5 => "5", Num6 => "6", Num7 => "7", Num8 => "8", Num9 => "9",
        A => "A", B => "B", C => "C", D => "D", E => "E", F => "F", G => "G",
        H => "H", I => "I", J => "J", K => "K", L => "L", M => "M", N => "N",
        O => "O", P => "P", Q => "Q", R => "R", S => "S", T => "T", U => "U",
        V => "V", W => "W", X => "X", Y => "Y", Z => "Z",
        _ => "?",
    }
}

fn parse_key_name(s: &str) -> Option<egui::Key> {
    use egui::Key::*;
    let key = match s {
        "Delete" => Delete, "Backspace" => Backspace, "Esc" => Escape, "Enter" => Enter,
        "Space" => Space, "Tab" => Tab, "-" => Minus, "+" => PlusEquals,
        "0" => Num0, "1" => Num1, "2" => Num2, "3" => Num3, "4" => Num4,
        "5" => Num5, "6" => Num6, "7" => Num7, "8" => Num8, "9" => Num9,
        "A" => A, "B" => B, "C" => C, "D" => D, "E" => E, "F" => F, "G" => G,
        "H" => H, "I" => I, "J" => J, "K" => K, "L" => L, "M" => M, "N" => N,
        "O" => O, "P" => P, "Q" => Q, "R" => R, "S" => S, "T" => T, "U" => U,
        "V" => V, "W" => W, "X" => X, "Y" => Y, "Z" => Z,
        _ => return None,
    };
    Some(key)
}

// ═══════════════════════════════════════════════════════════════════════════
// APP SETTINGS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// Undoable steps kept in history.
    pub max_undo_steps: usize,
    /// Horizontal space reserved around the canvas inside the central panel.
    pub canvas_margin_x: f32,
    pub canvas_margin_y: f32,
    pub brush_width: f32,
    pub brush_color: Rgba<u8>,
    pub show_grid: bool,
    pub show_rulers: bool,
    /// Extra stamp images; empty means built-ins only.
    pub stamp_dir: String,
    /// Default export folder; empty means the current directory.
    pub export_dir: String,
    pub keybindings: KeyBindings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: DEFAULT_UNDO_STEPS,
            canvas_margin_x: 16.0,
            canvas_margin_y: 16.0,
            brush_width: 4.0,
            brush_color: Rgba([0, 0, 0, 255]),
            show_grid: false,
            show_rulers: false,
            stamp_dir: String::new(),
            export_dir: String::new(),
            keybindings: KeyBindings::default(),
        }
    }
}

impl AppSettings {
    /// On Linux:   ~/.config/sketchboard/sketchboard_settings.cfg (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\Sketchboard\sketchboard_settings.cfg
    /// On macOS:   ~/Library/Application Support/Sketchboard/sketchboard_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").ok()?;
            return Some(PathBuf::from(appdata).join("Sketchboard").join("sketchboard_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("Sketchboard")
                    .join("sketchboard_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("sketchboard").join("sketchboard_settings.cfg"))
        }
    }

    fn color_to_str(c: Rgba<u8>) -> String {
        format!("{},{},{},{}", c[0], c[1], c[2], c[3])
    }

    fn str_to_color(s: &str) -> Option<Rgba<u8>> {
        let parts: Vec<u8> = s.split(',').map(|p| p.trim().parse().ok()).collect::<Option<_>>()?;
        match parts.as_slice() {
            [r, g, b, a] => Some(Rgba([*r, *g, *b, *a])),
            _ => None,
        }
    }

    pub fn to_config_string(&self) -> String {
        let mut content = format!(
            "max_undo_steps={}\n\
             canvas_margin_x={}\n\
             canvas_margin_y={}\n\
             brush_width={}\n\
             brush_color={}\n\
             show_grid={}\n\
             show_rulers={}\n\
             stamp_dir={}\n\
             export_dir={}\n",
            self.max_undo_steps,
            self.canvas_margin_x,
            self.canvas_margin_y,
            self.brush_width,
            Self::color_to_str(self.brush_color),
            self.show_grid,
            self.show_rulers,
            self.stamp_dir,
            self.export_dir,
        );
        for line in self.keybindings.to_config_lines() {
            content.push_str(&line);
            content.push('\n');
        }
        content
    }

    /// Parse `key=value` lines. Unknown keys are skipped; malformed values
    /// keep their defaults.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let (key, val) = (key.trim(), val.trim());
            let ok = match key {
                "max_undo_steps" => parse_into(val, &mut s.max_undo_steps),
                "canvas_margin_x" => parse_into(val, &mut s.canvas_margin_x),
                "canvas_margin_y" => parse_into(val, &mut s.canvas_margin_y),
                "brush_width" => parse_into(val, &mut s.brush_width),
                "show_grid" => parse_into(val, &mut s.show_grid),
                "show_rulers" => parse_into(val, &mut s.show_rulers),
                "brush_color" => Self::str_to_color(val).map(|c| s.brush_color = c).is_some(),
                "stamp_dir" => {
                    s.stamp_dir = val.to_string();
                    true
                }
                "export_dir" => {
                    s.export_dir = val.to_string();
                    true
                }
                _ => {
                    if let Some(action) = key.strip_prefix("keybind.") {
                        s.keybindings.load_config_line(action, val);
                    }
                    true
                }
            };
            if !ok {
                log::warn!("settings: bad value for {}: '{}'", key, val);
            }
        }
        if s.max_undo_steps == 0 {
            s.max_undo_steps = DEFAULT_UNDO_STEPS;
        }
        s
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> CanvasResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    /// Load from the platform location (defaults when absent or unreadable).
    pub fn load() -> Self {
        Self::settings_path().map(|p| Self::load_from(&p)).unwrap_or_default()
    }

    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log::warn!("could not save settings to {}: {}", path.display(), e);
        }
    }
}

fn parse_into<T: std::str::FromStr>(val: &str, slot: &mut T) -> bool {
    match val.parse() {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{Key, Modifiers};

    #[test]
    fn default_shortcuts_resolve() {
        let kb = KeyBindings::default();
        assert_eq!(kb.resolve(Key::Z, Modifiers::CTRL), Some(Action::Undo));
        assert_eq!(kb.resolve(Key::Z, Modifiers::COMMAND), Some(Action::Undo));
        assert_eq!(kb.resolve(Key::R, Modifiers::CTRL), Some(Action::ToggleRulers));
        assert_eq!(kb.resolve(Key::R, Modifiers::NONE), Some(Action::ToolRectangle));
        assert_eq!(kb.resolve(Key::Delete, Modifiers::NONE), Some(Action::ClearLayer));
        assert_eq!(kb.resolve(Key::Z, Modifiers::NONE), None);
        let ctrl_shift = Modifiers { ctrl: true, shift: true, ..Default::default() };
        assert_eq!(kb.resolve(Key::Z, ctrl_shift), None);
    }

    #[test]
    fn combo_config_string_parses() {
        let combo = KeyCombo::from_config_string("ctrl+shift+key:Z").unwrap();
        assert!(combo.ctrl && combo.shift && !combo.alt);
        assert_eq!(combo.key, Key::Z);
        assert_eq!(combo.display(), "Ctrl+Shift+Z");
        assert!(KeyCombo::from_config_string("ctrl+shift").is_none());
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let s = AppSettings::from_config_str(
            "max_undo_steps=lots\nbrush_width=7.5\nbrush_color=1,2,3\nmystery=1\nkeybind.Undo=alt+key:U\n",
        );
        assert_eq!(s.max_undo_steps, DEFAULT_UNDO_STEPS);
        assert_eq!(s.brush_width, 7.5);
        assert_eq!(s.brush_color, Rgba([0, 0, 0, 255]));
        assert_eq!(s.keybindings.resolve(Key::U, Modifiers::ALT), Some(Action::Undo));
    }
}
