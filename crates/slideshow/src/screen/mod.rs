//! Output surface of the slideshow.

pub mod raster;
pub mod window;

use std::path::Path;

use crate::error::ScreenError;
use crate::events::Region;

pub use window::{Frame, UserEvent, WindowApp, WindowScreen};

/// Frame-at-a-time drawing surface driven by the render loop.
///
/// Drawing calls compose into a pending frame; nothing is visible until
/// [`Screen::apply`].
pub trait Screen: Send {
    /// Frame size in pixels.
    fn size(&self) -> (u32, u32);

    fn clear(&mut self);

    /// Draw the picture scaled to fit and centred.
    fn show_picture(&mut self, path: &Path) -> Result<(), ScreenError>;

    /// Draw a centred line of text over whatever is already composed.
    fn show_message(&mut self, text: &str);

    /// Draw a labelled button with its top-left corner at `origin`.
    fn show_button(&mut self, label: &str, origin: (i32, i32)) -> Region;

    fn apply(&mut self) -> Result<(), ScreenError>;

    fn teardown(&mut self);
}
