use egui::pos2;
use image::{Rgba, RgbaImage};
use sketchboard::components::tools::Tool;
use sketchboard::compositor::{self, BlendMode, blend_pixel};
use sketchboard::{Command, Editor};

fn filled_rect(editor: &mut Editor, from: (f32, f32), to: (f32, f32)) {
    editor.apply(Command::SelectTool(Tool::Rectangle)).unwrap();
    editor.apply(Command::SetFillShapes(true)).unwrap();
    editor.apply(Command::Press(pos2(from.0, from.1))).unwrap();
    editor.apply(Command::Move(pos2(to.0, to.1))).unwrap();
    editor.apply(Command::Release(pos2(to.0, to.1))).unwrap();
}

#[test]
fn render_is_pure() {
    let mut editor = Editor::new(80, 80);
    filled_rect(&mut editor, (5.0, 5.0), (40.0, 40.0));
    let a = compositor::render(editor.layers());
    let b = compositor::render(editor.layers());
    assert_eq!(a, b);
    assert_eq!(&a, editor.display());
}

#[test]
fn invisible_layer_contributes_nothing() {
    let mut editor = Editor::new(50, 50);
    let base = compositor::render(editor.layers());

    editor.apply(Command::AddLayer).unwrap();
    let top = editor.layers().active_id();
    editor.apply(Command::SetColor(Rgba([0, 200, 0, 255]))).unwrap();
    filled_rect(&mut editor, (0.0, 0.0), (50.0, 50.0));
    assert_ne!(compositor::render(editor.layers()), base);

    for opacity in [0.0, 0.3, 1.0] {
        editor.apply(Command::SetLayerOpacity(top, opacity)).unwrap();
        editor.apply(Command::SetLayerVisibility(top, false)).unwrap();
        assert_eq!(compositor::render(editor.layers()), base);
        editor.apply(Command::SetLayerVisibility(top, true)).unwrap();
    }
}

#[test]
fn half_opacity_rect_with_bottom_layer_hidden() {
    let mut editor = Editor::new(80, 80);
    let bottom = editor.layers().active_id();
    filled_rect(&mut editor, (0.0, 0.0), (80.0, 80.0));

    editor.apply(Command::AddLayer).unwrap();
    let top = editor.layers().active_id();
    editor.apply(Command::SetColor(Rgba([255, 0, 0, 255]))).unwrap();
    filled_rect(&mut editor, (20.0, 20.0), (60.0, 60.0));
    editor.apply(Command::SetLayerOpacity(top, 0.5)).unwrap();
    editor.apply(Command::SetLayerVisibility(bottom, false)).unwrap();

    let rendered = editor.display().clone();
    let top_pixels = editor.layers().layer(top).unwrap().pixels.to_rgba_image();
    let expected = RgbaImage::from_fn(80, 80, |x, y| {
        blend_pixel(Rgba([0, 0, 0, 0]), *top_pixels.get_pixel(x, y), BlendMode::Normal, 0.5)
    });
    assert_eq!(rendered, expected);
    assert_eq!(*rendered.get_pixel(40, 40), Rgba([255, 0, 0, 128]));
    assert_eq!(rendered.get_pixel(5, 5)[3], 0);
}

#[test]
fn shape_preview_does_not_accumulate() {
    let mut editor = Editor::new(100, 100);
    editor.apply(Command::SelectTool(Tool::Rectangle)).unwrap();
    editor.apply(Command::Press(pos2(10.0, 10.0))).unwrap();
    editor.apply(Command::Move(pos2(50.0, 50.0))).unwrap();
    assert!(editor.display().get_pixel(49, 30)[3] > 200);

    editor.apply(Command::Move(pos2(60.0, 60.0))).unwrap();
    let preview = editor.display();
    // Old right edge is gone, new one is there.
    assert_eq!(preview.get_pixel(49, 30)[3], 0);
    assert!(preview.get_pixel(59, 30)[3] > 200);
    assert_eq!(preview.get_pixel(30, 49)[3], 0);
    assert!(preview.get_pixel(30, 59)[3] > 200);
    // Previews are not history entries.
    assert_eq!(editor.history().len(), 1);

    editor.apply(Command::Release(pos2(60.0, 60.0))).unwrap();
    assert_eq!(editor.history().len(), 2);
}

#[test]
fn eraser_reveals_lower_layer() {
    let mut editor = Editor::new(60, 60);
    editor.apply(Command::SetColor(Rgba([0, 0, 255, 255]))).unwrap();
    filled_rect(&mut editor, (0.0, 0.0), (60.0, 60.0));
    editor.apply(Command::AddLayer).unwrap();
    editor.apply(Command::SetColor(Rgba([255, 255, 0, 255]))).unwrap();
    filled_rect(&mut editor, (0.0, 0.0), (60.0, 60.0));
    assert_eq!(*editor.display().get_pixel(30, 30), Rgba([255, 255, 0, 255]));

    editor.apply(Command::SelectTool(Tool::Eraser)).unwrap();
    editor.apply(Command::SetBrushWidth(10.0)).unwrap();
    editor.apply(Command::Press(pos2(10.0, 30.0))).unwrap();
    editor.apply(Command::Move(pos2(50.0, 30.0))).unwrap();
    editor.apply(Command::Release(pos2(50.0, 30.0))).unwrap();
    assert_eq!(*editor.display().get_pixel(30, 30), Rgba([0, 0, 255, 255]));
}
