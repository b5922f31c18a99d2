use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::LoginConfig;

pub const RESOURCES_ENV: &str = "EASINOTE_LOGIN_RESOURCES";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, by: Offset, scale: Scale) -> Self {
        let factor = scale.factor();
        Self {
            x: self.x + by.dx * factor,
            y: self.y + by.dy * factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

impl Offset {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Normal,
    Uhd,
}

impl Scale {
    pub fn from_4k(is_4k: bool) -> Self {
        if is_4k {
            Scale::Uhd
        } else {
            Scale::Normal
        }
    }

    pub fn factor(self) -> i32 {
        match self {
            Scale::Normal => 1,
            Scale::Uhd => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// The whiteboard starts on its full-screen board; the login UI has to be opened first.
    Normal,
    /// The whiteboard starts on the login UI.
    Direct,
}

impl EntryMode {
    pub fn from_directly(directly: bool) -> Self {
        if directly {
            EntryMode::Direct
        } else {
            EntryMode::Normal
        }
    }
}

/// Fixed positions of the EasiNote login form, in 1080p pixels. Field offsets
/// are relative to the center of the account-login button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub enter_login_ui: Offset,
    pub account_field: Offset,
    pub password_field: Offset,
    pub submit_button: Offset,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            enter_login_ui: Offset::new(172, 1044),
            account_field: Offset::new(0, 70),
            password_field: Offset::new(0, 134),
            submit_button: Offset::new(0, 198),
        }
    }
}

impl Layout {
    pub fn enter_login_ui_point(&self, scale: Scale) -> Point {
        Point::new(0, 0).offset(self.enter_login_ui, scale)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    pub button: PathBuf,
    pub button_selected: PathBuf,
    pub checkbox: PathBuf,
}

impl TemplateSet {
    pub fn resolve(resources: &Path, scale: Scale, entry: EntryMode) -> Self {
        let mut suffix = String::new();
        if entry == EntryMode::Direct {
            suffix.push_str("_direct");
        }
        if scale == Scale::Uhd {
            suffix.push_str("_4k");
        }
        Self {
            button: resources.join(format!("button{suffix}.png")),
            button_selected: resources.join(format!("button_selected{suffix}.png")),
            checkbox: resources.join(format!("checkbox{suffix}.png")),
        }
    }
}

/// Everything the login sequence needs to know about the target UI for one run.
#[derive(Debug, Clone)]
pub struct LoginPlan {
    pub layout: Layout,
    pub templates: TemplateSet,
    pub scale: Scale,
    pub entry: EntryMode,
    pub confidence: f32,
}

impl LoginPlan {
    pub fn from_config(login: &LoginConfig, resources: &Path) -> Self {
        let scale = Scale::from_4k(login.is_4k);
        let entry = EntryMode::from_directly(login.directly);
        Self {
            layout: Layout::default(),
            templates: TemplateSet::resolve(resources, scale, entry),
            scale,
            entry,
            confidence: login.confidence,
        }
    }
}

pub fn resources_dir(configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }
    if let Some(dir) = env::var(RESOURCES_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
    {
        return PathBuf::from(dir);
    }
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("resources")))
        .unwrap_or_else(|| PathBuf::from("resources"))
}
