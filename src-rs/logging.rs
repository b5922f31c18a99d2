use std::fmt;

use tracing::error;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{fmt as tfmt, prelude::*, EnvFilter};

/// Local wall clock as `HH:MM:SS`.
struct ClockTime;

impl FormatTime for ClockTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S"))
    }
}

/// Maps the configured level name onto a tracing filter directive.
pub fn level_directive(name: &str) -> Option<&'static str> {
    match name.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARNING" | "WARN" => Some("warn"),
        "ERROR" | "CRITICAL" => Some("error"),
        _ => None,
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over the configured level.
pub fn init(level: &str) {
    let directive = level_directive(level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive.unwrap_or("warn")));

    let installed = tracing_subscriber::registry()
        .with(
            tfmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(ClockTime)
                .with_target(false),
        )
        .with(filter)
        .try_init();
    if installed.is_err() {
        return;
    }

    if directive.is_none() {
        error!("invalid log level {level:?}, using WARNING");
    }
}
