use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScreenError {
    /// The picture could not be opened or decoded.
    #[error("failed to load picture {path}: {source}")]
    Picture {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The window event loop is gone; nothing can be presented anymore.
    #[error("display window has been closed")]
    Closed,

    #[error("no usable system font: {0}")]
    Font(String),
}
