//! Sketchboard: a layered raster sketching canvas.
//!
//! The core (`canvas`, `compositor`, `components`) is toolkit-agnostic and
//! driven through [`editor::Editor::apply`]. The egui shell lives in the
//! binary.

pub mod canvas;
pub mod cli;
pub mod components;
pub mod compositor;
pub mod editor;
pub mod error;
pub mod io;
pub mod logger;
pub mod ops;
pub mod settings;
pub mod viewport;

pub use editor::{Command, Editor, Response};
pub use error::{CanvasError, CanvasResult};
