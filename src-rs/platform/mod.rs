#[cfg(not(target_os = "windows"))]
pub mod stub;
#[cfg(target_os = "windows")]
pub mod win32;

use std::path::Path;

use image::RgbaImage;
use tracing::debug;

use crate::error::PlatformError;
use crate::layout::Point;
use crate::locator::{self, TemplateCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Ctrl,
    A,
    Backspace,
}

/// Screen and input facility the login sequence drives.
pub trait Desktop {
    fn locate(&mut self, template: &Path, confidence: f32) -> Result<Option<Point>, PlatformError>;
    fn click(&mut self, at: Point) -> Result<(), PlatformError>;
    fn press(&mut self, key: Key) -> Result<(), PlatformError>;
    /// Holds every key but the last, taps the last, releases in reverse order.
    fn hotkey(&mut self, keys: &[Key]) -> Result<(), PlatformError>;
    fn type_text(&mut self, text: &str) -> Result<(), PlatformError>;
    /// Brings the first top-level window whose title contains `title` to the
    /// foreground. Returns false when no window matched.
    fn focus_window(&mut self, title: &str) -> Result<bool, PlatformError>;
}

/// Raw OS primitives behind [`SystemDesktop`].
pub trait Backend {
    fn capture(&mut self) -> Result<RgbaImage, PlatformError>;
    fn click(&mut self, at: Point) -> Result<(), PlatformError>;
    fn key_down(&mut self, key: Key) -> Result<(), PlatformError>;
    fn key_up(&mut self, key: Key) -> Result<(), PlatformError>;
    fn type_text(&mut self, text: &str) -> Result<(), PlatformError>;
    fn focus_window(&mut self, title: &str) -> Result<bool, PlatformError>;
}

pub struct SystemDesktop {
    backend: Box<dyn Backend>,
    templates: TemplateCache,
}

impl SystemDesktop {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            templates: TemplateCache::default(),
        }
    }

    pub fn capture(&mut self) -> Result<RgbaImage, PlatformError> {
        self.backend.capture()
    }
}

impl Desktop for SystemDesktop {
    fn locate(&mut self, template: &Path, confidence: f32) -> Result<Option<Point>, PlatformError> {
        let needle = self.templates.get(template)?;
        let screen = self.backend.capture()?;
        let found = locator::locate_on_screen(&screen, needle, confidence);
        debug!(
            template = %template.display(),
            found = ?found.map(|m| (m.center, m.score)),
            "template search"
        );
        Ok(found.map(|m| m.center))
    }

    fn click(&mut self, at: Point) -> Result<(), PlatformError> {
        debug!(x = at.x, y = at.y, "click");
        self.backend.click(at)
    }

    fn press(&mut self, key: Key) -> Result<(), PlatformError> {
        self.backend.key_down(key)?;
        self.backend.key_up(key)
    }

    fn hotkey(&mut self, keys: &[Key]) -> Result<(), PlatformError> {
        let Some((last, held)) = keys.split_last() else {
            return Ok(());
        };
        for key in held {
            self.backend.key_down(*key)?;
        }
        let tapped = self.press(*last);
        for key in held.iter().rev() {
            self.backend.key_up(*key)?;
        }
        tapped
    }

    fn type_text(&mut self, text: &str) -> Result<(), PlatformError> {
        self.backend.type_text(text)
    }

    fn focus_window(&mut self, title: &str) -> Result<bool, PlatformError> {
        self.backend.focus_window(title)
    }
}

#[cfg(target_os = "windows")]
pub fn create_desktop() -> SystemDesktop {
    SystemDesktop::new(Box::new(win32::WindowsBackend::new()))
}

#[cfg(not(target_os = "windows"))]
pub fn create_desktop() -> SystemDesktop {
    SystemDesktop::new(Box::new(stub::StubBackend))
}
