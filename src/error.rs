use thiserror::Error;

use crate::canvas::LayerId;

/// Failures surfaced by the canvas core.
///
/// History eviction is deliberately absent: dropping the oldest snapshot is
/// normal operation and is only logged.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// An operation addressed a layer that is not in the stack.
    #[error("layer {0} does not exist")]
    InvalidLayer(LayerId),

    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("could not encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CanvasResult<T> = Result<T, CanvasError>;
