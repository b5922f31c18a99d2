use image::RgbaImage;
use tracing::info;

use super::{Backend, Key};
use crate::error::PlatformError;
use crate::layout::Point;

/// Stand-in for hosts without the Windows input and capture APIs. Input calls
/// are logged and dropped; capture is unavailable, so every search fails.
pub struct StubBackend;

impl Backend for StubBackend {
    fn capture(&mut self) -> Result<RgbaImage, PlatformError> {
        Err(PlatformError::Unsupported("screen capture"))
    }

    fn click(&mut self, at: Point) -> Result<(), PlatformError> {
        info!(target: "stub", "click({}, {})", at.x, at.y);
        Ok(())
    }

    fn key_down(&mut self, key: Key) -> Result<(), PlatformError> {
        info!(target: "stub", "key_down({key:?})");
        Ok(())
    }

    fn key_up(&mut self, key: Key) -> Result<(), PlatformError> {
        info!(target: "stub", "key_up({key:?})");
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<(), PlatformError> {
        info!(target: "stub", "type_text({} chars)", text.chars().count());
        Ok(())
    }

    fn focus_window(&mut self, title: &str) -> Result<bool, PlatformError> {
        info!(target: "stub", "focus_window(\"{title}\")");
        Ok(false)
    }
}
