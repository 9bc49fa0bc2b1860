//! Configuration types for webgui
//!
//! Defines:
//! - `Settings` - Contents of `webgui.toml`
//! - One table type per section: `[server]`, `[window]`, `[browser]`, `[watchdog]`

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use webgui_daemon::ServerKwargs;

/// Settings file contents; every table and key is optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub window: WindowSettings,
    pub browser: BrowserSettings,
    pub watchdog: WatchdogSettings,
}

/// `[server]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// flask, fastapi, django or flask_socketio
    pub name: Option<String>,

    /// Import target, e.g. `main:app`
    pub app: Option<String>,

    /// Working directory for the server (defaults to the current directory)
    pub app_dir: Option<PathBuf>,

    /// Python interpreter
    pub python: Option<PathBuf>,

    pub port: Option<u16>,

    /// Flask-SocketIO object import target
    pub socketio: Option<String>,

    /// Passed to the server verbatim instead of the derived bundle
    pub kwargs: Option<ServerKwargs>,
}

/// `[window]`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fullscreen: bool,
    pub maximized: bool,

    /// Chromeless `--app=` window; otherwise a normal browser window
    pub app_mode: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            fullscreen: false,
            maximized: false,
            app_mode: true,
        }
    }
}

/// `[browser]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Explicit browser executable; must exist
    pub path: Option<PathBuf>,

    /// Full command line replacing the derived one
    pub command: Option<Vec<String>>,

    /// Appended before the URL
    pub extra_flags: Vec<String>,
}

/// `[watchdog]`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchdogSettings {
    pub enabled: bool,
    pub idle_timeout_secs: f64,
    /// Defaults to the idle timeout
    pub poll_interval_secs: Option<f64>,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_timeout_secs: 5.0,
            poll_interval_secs: None,
        }
    }
}
