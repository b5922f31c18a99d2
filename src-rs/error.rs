use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config file {} is not valid JSON; fix or delete it", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize config")]
    Serialize(#[from] serde_json::Error),
}

/// Failures of the screen/input facility.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("screen capture failed: {0}")]
    Capture(String),
    #[error("input injection failed: {0}")]
    Input(String),
    #[error("failed to load template {}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// Why one restart-and-login attempt did not reach the submit click.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("failed to terminate {name}")]
    ProcessNotTerminated {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch {}", path.display())]
    ProcessNotLaunched {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("account login button not located")]
    ButtonNotLocated,
    #[error("consent checkbox not located")]
    CheckboxNotLocated,
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s)")]
pub struct RetryError<E: std::error::Error + 'static> {
    pub attempts: u32,
    #[source]
    pub last: E,
}
