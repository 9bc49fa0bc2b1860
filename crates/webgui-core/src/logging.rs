//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

const LOG_ENV: &str = "WEBGUI_LOG";
const LOG_FILE: &str = "webgui.log";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/webgui/logs/` and echoed to stderr.
/// Log level is controlled by the `WEBGUI_LOG` environment variable.
///
/// # Examples
/// ```bash
/// WEBGUI_LOG=debug webgui --server flask --app main:app
/// WEBGUI_LOG=webgui_daemon=trace webgui --server fastapi --app main:app
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .with(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| Error::config(format!("Failed to install log subscriber: {}", e)))?;

    tracing::debug!("Log directory: {}", log_dir.display());

    Ok(())
}

/// Default to info for our crates and warn for everything else
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new("webgui=info,webgui_core=info,webgui_daemon=info,webgui_app=info,warn")
    })
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("webgui").join("logs"))
}

/// Get the log file path for the current day
pub fn get_current_log_file() -> Result<PathBuf> {
    let dir = get_log_directory()?;
    Ok(dir.join(LOG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_lives_under_webgui_logs() {
        let file = get_current_log_file().unwrap();
        assert!(file.ends_with("webgui/logs/webgui.log"));
    }
}
