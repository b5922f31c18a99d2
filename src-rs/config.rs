use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const AUTO_PATH: &str = "auto";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub warning: WarningConfig,
    pub banner: BannerConfig,
    pub login: LoginConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningConfig {
    pub enabled: bool,
    /// Seconds before the prompt proceeds on its own.
    pub timeout: u64,
}

const DEFAULT_WARNING_TIMEOUT: u64 = 15;

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: DEFAULT_WARNING_TIMEOUT,
        }
    }
}

impl WarningConfig {
    /// A zero timeout falls back to the default; the prompt always waits.
    pub fn timeout(&self) -> Duration {
        match self.timeout {
            0 => Duration::from_secs(DEFAULT_WARNING_TIMEOUT),
            secs => Duration::from_secs(secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerConfig {
    pub enabled: bool,
    pub text: String,
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            text: "WARNING  EasiNote auto login in progress  do not touch the screen".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub skip_once: bool,
    pub kill_agent: bool,
    pub is_4k: bool,
    pub directly: bool,
    pub confidence: f32,
    pub easinote: EasiNoteConfig,
    pub timeout: TimeoutConfig,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            skip_once: false,
            kill_agent: true,
            is_4k: false,
            directly: false,
            confidence: 0.8,
            easinote: EasiNoteConfig::default(),
            timeout: TimeoutConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EasiNoteConfig {
    /// Launcher path, or "auto" to read it from the registry.
    pub path: String,
    pub process_name: String,
    pub args: String,
    pub window_title: String,
    pub agent_process_name: String,
}

impl Default for EasiNoteConfig {
    fn default() -> Self {
        Self {
            path: AUTO_PATH.to_string(),
            process_name: "EasiNote.exe".to_string(),
            args: String::new(),
            window_title: "希沃白板".to_string(),
            agent_process_name: "EasiAgent.exe".to_string(),
        }
    }
}

/// Settle durations in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub terminate: u64,
    pub launch: u64,
    pub enter_login_ui: u64,
    pub switch_tab: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            terminate: 1,
            launch: 8,
            enter_login_ui: 3,
            switch_tab: 1,
        }
    }
}

impl TimeoutConfig {
    pub fn terminate(&self) -> Duration {
        Duration::from_secs(self.terminate)
    }

    pub fn launch(&self) -> Duration {
        Duration::from_secs(self.launch)
    }

    pub fn enter_login_ui(&self) -> Duration {
        Duration::from_secs(self.enter_login_ui)
    }

    pub fn switch_tab(&self) -> Duration {
        Duration::from_secs(self.switch_tab)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub max_retries: u32,
    /// Seconds between attempts.
    pub retry_delay: u64,
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: 2,
            log_level: "WARNING".to_string(),
            resources_dir: None,
        }
    }
}

impl AppConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    Created,
}

impl Config {
    /// Reads the record at `path`. A missing or empty file yields the defaults,
    /// which are written back so they can be edited.
    pub fn load(path: &Path) -> Result<(Self, LoadStatus), ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            let config = Self::default();
            config.save(path)?;
            return Ok((config, LoadStatus::Created));
        }

        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok((config, LoadStatus::Loaded))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn request_skip(&mut self, path: &Path) -> Result<(), ConfigError> {
        self.login.skip_once = true;
        self.save(path)
    }

    /// Clears a pending skip request. Returns whether one was pending.
    pub fn consume_skip(&mut self, path: &Path) -> Result<bool, ConfigError> {
        if !self.login.skip_once {
            return Ok(false);
        }
        self.login.skip_once = false;
        self.save(path)?;
        Ok(true)
    }
}
