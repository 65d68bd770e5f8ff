use std::collections::VecDeque;

use crate::canvas::{LayerStack, TiledBitmap};
use crate::compositor::BlendMode;

/// Default number of undoable steps.
pub const DEFAULT_UNDO_STEPS: usize = 50;

#[derive(Clone)]
pub struct LayerSnapshot {
    pub visible: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub pixels: TiledBitmap,
}

/// Every layer's pixels and compositing metadata at one point in time.
///
/// Pixels are tile-shared with the live layers, so a capture costs one
/// pointer per allocated tile until the layer is painted again.
#[derive(Clone)]
pub struct CanvasSnapshot {
    pub layers: Vec<LayerSnapshot>,
}

impl CanvasSnapshot {
    pub fn capture(stack: &LayerStack) -> Self {
        Self {
            layers: stack
                .layers()
                .iter()
                .map(|l| LayerSnapshot {
                    visible: l.visible,
                    opacity: l.opacity(),
                    blend_mode: l.blend_mode,
                    pixels: l.pixels.clone(),
                })
                .collect(),
        }
    }

    /// Overwrite layers position by position. Layers beyond the snapshot's
    /// count keep their current contents; snapshot layers beyond the stack's
    /// count are ignored. Bitmaps captured at another canvas size are
    /// re-anchored to the current size.
    pub fn restore_into(&self, stack: &mut LayerStack) {
        let (w, h) = (stack.width(), stack.height());
        for (layer, snap) in stack.layers_mut().iter_mut().zip(&self.layers) {
            layer.visible = snap.visible;
            layer.set_opacity(snap.opacity);
            layer.blend_mode = snap.blend_mode;
            layer.pixels = if snap.pixels.width() == w && snap.pixels.height() == h {
                snap.pixels.clone()
            } else {
                snap.pixels.resized(w, h)
            };
        }
        if stack.len() != self.layers.len() {
            log::debug!(
                "positional restore: stack has {} layers, snapshot {}",
                stack.len(),
                self.layers.len()
            );
        }
    }

    fn memory_bytes(&self) -> usize {
        self.layers.iter().map(|l| l.pixels.memory_bytes()).sum()
    }
}

/// Bounded linear undo/redo over full-canvas snapshots.
///
/// `entries[cursor]` always mirrors the live canvas after the last commit,
/// undo or redo. Entries before the cursor are undoable, entries after it
/// redoable. The oldest entry is the floor and is never undone past.
pub struct HistoryManager {
    entries: VecDeque<CanvasSnapshot>,
    cursor: usize,
    max_undo_steps: usize,
}

impl HistoryManager {
    /// Start a history whose floor is the current state of `stack`.
    pub fn new(stack: &LayerStack) -> Self {
        Self::with_limit(stack, DEFAULT_UNDO_STEPS)
    }

    pub fn with_limit(stack: &LayerStack, max_undo_steps: usize) -> Self {
        let mut entries = VecDeque::with_capacity(max_undo_steps.min(64) + 1);
        entries.push_back(CanvasSnapshot::capture(stack));
        Self { entries, cursor: 0, max_undo_steps: max_undo_steps.max(1) }
    }

    /// Record a committed action. Drops the redo tail, then evicts the
    /// oldest entries while more than `max_undo_steps` steps would remain.
    pub fn snapshot(&mut self, stack: &LayerStack) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(CanvasSnapshot::capture(stack));
        while self.entries.len() > self.max_undo_steps + 1 {
            self.entries.pop_front();
            log::debug!("history full, evicted oldest snapshot");
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Step back one action. Returns `false` at the floor.
    pub fn undo(&mut self, stack: &mut LayerStack) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.entries[self.cursor].restore_into(stack);
        true
    }

    /// Step forward one action. Returns `false` at the newest entry.
    pub fn redo(&mut self, stack: &mut LayerStack) -> bool {
        if self.cursor + 1 >= self.entries.len() {
            return false;
        }
        self.cursor += 1;
        self.entries[self.cursor].restore_into(stack);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn undo_count(&self) -> usize {
        self.cursor
    }

    pub fn redo_count(&self) -> usize {
        self.entries.len() - self.cursor - 1
    }

    /// Stored snapshots, including the floor.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn max_undo_steps(&self) -> usize {
        self.max_undo_steps
    }

    /// Bytes held only by history (tiles not shared with anything else).
    pub fn memory_usage(&self) -> usize {
        self.entries.iter().map(|s| s.memory_bytes()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn dot(stack: &mut LayerStack, x: u32) {
        let idx = stack.active_index();
        stack.layers_mut()[idx].pixels.put_pixel(x, 0, Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn undo_at_floor_is_a_no_op() {
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::new(&stack);
        assert!(!history.undo(&mut stack));
        assert!(!history.redo(&mut stack));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn new_action_discards_redo_tail() {
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::new(&stack);
        for x in 0..3 {
            dot(&mut stack, x);
            history.snapshot(&stack);
        }
        history.undo(&mut stack);
        history.undo(&mut stack);
        assert_eq!(history.redo_count(), 2);

        dot(&mut stack, 7);
        history.snapshot(&stack);
        assert_eq!(history.redo_count(), 0);
        assert_eq!(history.len(), 3);
        assert!(!history.redo(&mut stack));
    }

    #[test]
    fn eviction_caps_undo_depth() {
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::with_limit(&stack, 3);
        for x in 0..5 {
            dot(&mut stack, x);
            history.snapshot(&stack);
        }
        assert_eq!(history.len(), 4);
        assert_eq!(history.cursor(), 3);
        let mut undone = 0;
        while history.undo(&mut stack) {
            undone += 1;
        }
        assert_eq!(undone, 3);
        // Floor is now the state after the second action.
        let px = &stack.active_layer().pixels;
        assert_eq!(px.get_pixel(1, 0)[3], 255);
        assert_eq!(px.get_pixel(2, 0)[3], 0);
    }

    #[test]
    fn surplus_layers_survive_restore() {
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::new(&stack);
        dot(&mut stack, 0);
        history.snapshot(&stack);

        stack.add_layer();
        dot(&mut stack, 4);
        history.undo(&mut stack);

        assert_eq!(stack.len(), 2);
        assert!(stack.layers()[0].pixels.is_blank());
        assert_eq!(stack.layers()[1].pixels.get_pixel(4, 0)[3], 255);
    }

    #[test]
    fn memory_usage_grows_once_tiles_diverge() {
        let tile = (crate::canvas::CHUNK_SIZE * crate::canvas::CHUNK_SIZE * 4) as usize;
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::new(&stack);
        assert_eq!(history.memory_usage(), 0);

        dot(&mut stack, 2);
        history.snapshot(&stack);
        assert!(history.memory_usage() < tile);

        // The live layer copies its tile on write; the snapshot keeps the old one.
        dot(&mut stack, 3);
        assert_eq!(history.memory_usage(), tile);
    }

    #[test]
    fn restore_after_resize_keeps_canvas_size() {
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::new(&stack);
        dot(&mut stack, 2);
        history.snapshot(&stack);
        stack.resize_all(20, 12);
        history.undo(&mut stack);
        history.redo(&mut stack);
        let px = &stack.active_layer().pixels;
        assert_eq!((px.width(), px.height()), (20, 12));
        assert_eq!(px.get_pixel(2, 0)[3], 255);
    }
}
