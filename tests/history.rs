use egui::pos2;
use image::RgbaImage;
use sketchboard::compositor;
use sketchboard::{Command, Editor};

/// One committed pen stroke per call, each on its own row.
fn stroke(editor: &mut Editor, row: usize) {
    let y = 2.0 + row as f32 * 6.0;
    editor.apply(Command::Press(pos2(5.0, y))).unwrap();
    editor.apply(Command::Move(pos2(60.0, y))).unwrap();
    editor.apply(Command::Release(pos2(60.0, y))).unwrap();
}

fn flat(editor: &Editor) -> RgbaImage {
    compositor::render(editor.layers())
}

#[test]
fn undo_n_times_returns_to_blank_and_redo_restores() {
    for n in [1usize, 7, 50] {
        let mut editor = Editor::new(64, 340);
        let blank = flat(&editor);
        for i in 0..n {
            stroke(&mut editor, i);
        }
        let last = flat(&editor);
        assert_ne!(last, blank);

        for _ in 0..n {
            editor.apply(Command::Undo).unwrap();
        }
        assert_eq!(flat(&editor), blank, "n = {}", n);
        assert_eq!(editor.layers().len(), 1);
        assert!(!editor.history().can_undo());

        for _ in 0..n {
            editor.apply(Command::Redo).unwrap();
        }
        assert_eq!(flat(&editor), last, "n = {}", n);
        assert!(!editor.history().can_redo());
    }
}

#[test]
fn undo_depth_is_capped_and_eviction_is_permanent() {
    let mut editor = Editor::new(64, 340);
    let blank = flat(&editor);
    for i in 0..55 {
        stroke(&mut editor, i);
    }
    assert_eq!(editor.history().undo_count(), 50);

    for _ in 0..50 {
        editor.apply(Command::Undo).unwrap();
    }
    assert!(!editor.history().can_undo());
    let floor = flat(&editor);
    // The first five strokes were folded into the floor.
    assert_ne!(floor, blank);
    assert_eq!(floor.get_pixel(30, 2)[3], 255);
    assert_eq!(floor.get_pixel(30, 2 + 4 * 6)[3], 255);
    assert_eq!(floor.get_pixel(30, 2 + 5 * 6)[3], 0);

    editor.apply(Command::Undo).unwrap();
    assert_eq!(flat(&editor), floor);
}

#[test]
fn new_action_discards_redo_tail() {
    let mut editor = Editor::new(64, 64);
    stroke(&mut editor, 0);
    stroke(&mut editor, 1);
    editor.apply(Command::Undo).unwrap();
    assert!(editor.history().can_redo());

    stroke(&mut editor, 5);
    assert!(!editor.history().can_redo());
    editor.apply(Command::Redo).unwrap();
    assert_eq!(flat(&editor).get_pixel(30, 8)[3], 0);
    assert_eq!(flat(&editor).get_pixel(30, 32)[3], 255);
}

#[test]
fn diagonal_line_undo_redo() {
    let mut editor = Editor::new(100, 100);
    editor.apply(Command::Press(pos2(10.0, 10.0))).unwrap();
    editor.apply(Command::Move(pos2(90.0, 90.0))).unwrap();
    editor.apply(Command::Release(pos2(90.0, 90.0))).unwrap();

    let drawn = flat(&editor);
    assert_eq!(*drawn.get_pixel(50, 50), image::Rgba([0, 0, 0, 255]));

    editor.apply(Command::Undo).unwrap();
    assert!(flat(&editor).pixels().all(|p| p[3] == 0));

    editor.apply(Command::Redo).unwrap();
    assert_eq!(flat(&editor), drawn);
}

#[test]
fn restore_leaves_layers_added_later_untouched() {
    let mut editor = Editor::new(40, 40);
    stroke(&mut editor, 0);
    editor.apply(Command::AddLayer).unwrap();
    stroke(&mut editor, 4);
    assert_eq!(editor.layers().len(), 2);

    // Back past the second stroke and then past the first.
    editor.apply(Command::Undo).unwrap();
    editor.apply(Command::Undo).unwrap();
    assert_eq!(editor.layers().len(), 2);
    assert!(editor.layers().layers()[0].pixels.is_blank());
    assert!(!editor.layers().layers()[1].pixels.is_blank());
}
