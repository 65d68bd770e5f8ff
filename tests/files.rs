use std::process::ExitCode;
use std::time::{Duration, UNIX_EPOCH};

use image::{Rgba, RgbaImage};
use sketchboard::cli::{self, CliArgs};
use sketchboard::settings::{Action, AppSettings, KeyCombo};
use sketchboard::{CanvasError, Command, Editor};

#[test]
fn import_is_scaled_centred_and_undoable() {
    let mut editor = Editor::new(200, 100);
    let red = RgbaImage::from_pixel(50, 50, Rgba([255, 0, 0, 255]));
    editor.apply(Command::ImportImage(red)).unwrap();
    assert_eq!(editor.history().len(), 2);

    let display = editor.display();
    let centre = display.get_pixel(100, 50);
    assert!(centre[0] >= 250 && centre[3] >= 250, "{:?}", centre);
    // 100×100 placed at x = 50.
    assert_eq!(display.get_pixel(20, 50)[3], 0);
    assert_eq!(display.get_pixel(180, 50)[3], 0);
    assert!(display.get_pixel(60, 50)[3] >= 250);

    editor.apply(Command::Undo).unwrap();
    assert!(editor.display().pixels().all(|p| p[3] == 0));
}

#[test]
fn encoded_import_goes_through_decoder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blue.png");
    RgbaImage::from_pixel(10, 10, Rgba([0, 0, 255, 255])).save(&path).unwrap();
    let bytes = std::fs::read(&path).unwrap();

    let mut editor = Editor::new(10, 10);
    editor.import_encoded(&bytes).unwrap();
    assert_eq!(*editor.display().get_pixel(5, 5), Rgba([0, 0, 255, 255]));

    let err = editor.import_encoded(&bytes[..20]).unwrap_err();
    assert!(matches!(err, CanvasError::Decode(_)));
    assert_eq!(editor.history().len(), 2);
}

#[test]
fn export_writes_dated_png() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = Editor::new(30, 20);
    editor.apply(Command::SetColor(Rgba([9, 8, 7, 255]))).unwrap();
    editor.apply(Command::Press(egui::pos2(10.0, 10.0))).unwrap();
    editor.apply(Command::Release(egui::pos2(10.0, 10.0))).unwrap();

    // 2023-07-04 10:00:00 UTC
    let when = UNIX_EPOCH + Duration::from_secs(1_688_464_800);
    let path = editor.export_to(dir.path(), when).unwrap();
    assert_eq!(path.file_name().unwrap(), "sketch-2023-07-04.png");

    let saved = image::open(&path).unwrap().to_rgba8();
    assert_eq!(saved.dimensions(), (30, 20));
    assert_eq!(*saved.get_pixel(10, 10), Rgba([9, 8, 7, 255]));
}

#[test]
fn settings_survive_a_save_load_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("sketchboard_settings.cfg");

    let mut settings = AppSettings {
        max_undo_steps: 12,
        canvas_margin_x: 8.5,
        brush_width: 9.0,
        brush_color: Rgba([1, 2, 3, 200]),
        show_grid: true,
        stamp_dir: "/tmp/stamps".into(),
        ..Default::default()
    };
    settings.keybindings.set(Action::Undo, KeyCombo::ctrl_key(egui::Key::U));
    settings.save_to(&path).unwrap();

    let loaded = AppSettings::load_from(&path);
    assert_eq!(loaded, settings);
    assert_eq!(loaded.keybindings.resolve(egui::Key::U, egui::Modifiers::CTRL), Some(Action::Undo));

    let editor = Editor::with_settings(&loaded, 20, 20);
    assert_eq!(editor.history().max_undo_steps(), 12);
    assert!(editor.show_grid());
    assert_eq!(editor.tools().properties.color, Rgba([1, 2, 3, 200]));
}

#[test]
fn missing_or_garbled_settings_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(AppSettings::load_from(&dir.path().join("absent.cfg")), AppSettings::default());

    let path = dir.path().join("bad.cfg");
    std::fs::write(&path, "brush_width=wide\nmystery=1\nshow_rulers=true\n").unwrap();
    let loaded = AppSettings::load_from(&path);
    assert_eq!(loaded.brush_width, AppSettings::default().brush_width);
    assert!(loaded.show_rulers);
}

#[test]
fn cli_imports_onto_requested_canvas() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("wide.png");
    RgbaImage::from_pixel(40, 20, Rgba([0, 255, 0, 255])).save(&input).unwrap();
    let output = dir.path().join("out.png");

    let args = CliArgs {
        input: vec![input.to_string_lossy().into_owned()],
        output: Some(output.clone()),
        output_dir: None,
        width: Some(40),
        height: Some(40),
        verbose: false,
    };
    assert_eq!(cli::run(args), ExitCode::SUCCESS);

    let saved = image::open(&output).unwrap().to_rgba8();
    assert_eq!(saved.dimensions(), (40, 40));
    // Letterboxed: rows 10..30 hold the image.
    assert_eq!(saved.get_pixel(20, 2)[3], 0);
    assert_eq!(*saved.get_pixel(20, 20), Rgba([0, 255, 0, 255]));
}

#[test]
fn cli_fails_on_undecodable_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.png");
    std::fs::write(&input, b"not an image").unwrap();

    let args = CliArgs {
        input: vec![input.to_string_lossy().into_owned()],
        output: Some(dir.path().join("never.png")),
        output_dir: None,
        width: None,
        height: None,
        verbose: false,
    };
    assert_eq!(cli::run(args), ExitCode::FAILURE);
    assert!(!dir.path().join("never.png").exists());
}
