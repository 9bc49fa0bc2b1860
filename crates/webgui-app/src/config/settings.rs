//! Settings loader for webgui.toml

use std::path::{Path, PathBuf};
use std::time::Duration;

use webgui_core::prelude::*;
use webgui_daemon::ServerBackend;

use super::types::Settings;
use super::{SessionConfig, SessionConfigBuilder};

pub const CONFIG_FILENAME: &str = "webgui.toml";

/// `./webgui.toml` if present, else `<config_dir>/webgui/webgui.toml`
pub fn default_settings_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("webgui").join(CONFIG_FILENAME))
        .unwrap_or(local)
}

/// Load settings from `path`.
///
/// A missing file yields defaults; an unreadable or malformed one is logged
/// and also yields defaults.
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        debug!("No settings file at {:?}, using defaults", path);
        return Settings::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

impl Settings {
    /// Start a session builder from these settings.
    ///
    /// Fails when no server is named or the name is not a supported one.
    pub fn to_builder(&self) -> Result<SessionConfigBuilder> {
        let name = self
            .server
            .name
            .as_deref()
            .ok_or_else(|| Error::config("no server configured (set [server] name)"))?;
        let backend: ServerBackend = name.parse()?;

        let mut builder = SessionConfig::builder(backend)
            .width(self.window.width)
            .height(self.window.height)
            .fullscreen(self.window.fullscreen)
            .maximized(self.window.maximized)
            .app_mode(self.window.app_mode)
            .extra_flags(self.browser.extra_flags.iter().cloned())
            .watchdog(self.watchdog.enabled);

        if let Some(app) = &self.server.app {
            builder = builder.app(app.clone());
        }
        if let Some(dir) = &self.server.app_dir {
            builder = builder.app_dir(dir.clone());
        }
        if let Some(python) = &self.server.python {
            builder = builder.python(python.clone());
        }
        if let Some(port) = self.server.port {
            builder = builder.port(port);
        }
        if let Some(socketio) = &self.server.socketio {
            builder = builder.socketio(socketio.clone());
        }
        if let Some(kwargs) = &self.server.kwargs {
            builder = builder.server_kwargs(kwargs.clone());
        }
        if let Some(path) = &self.browser.path {
            builder = builder.browser_path(path.clone());
        }
        if let Some(command) = &self.browser.command {
            builder = builder.browser_command(command.clone());
        }

        builder = builder.idle_timeout(secs(self.watchdog.idle_timeout_secs)?);
        if let Some(poll) = self.watchdog.poll_interval_secs {
            builder = builder.poll_interval(secs(poll)?);
        }

        Ok(builder)
    }
}

fn secs(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| Error::InvalidIdleTimeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_settings(&dir.path().join(CONFIG_FILENAME));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[server\nname = ").unwrap();
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn test_file_values_reach_the_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
[server]
name = "flask"
app = "hello:app"
port = 7321

[window]
width = 640
height = 480

[browser]
extra_flags = ["--lang=en"]

[watchdog]
enabled = true
idle_timeout_secs = 1.5
"#,
        )
        .unwrap();

        let config = load_settings(&path)
            .to_builder()
            .unwrap()
            .discover_browser(false)
            .build()
            .unwrap();

        assert_eq!(config.server.name(), "flask");
        assert_eq!(config.port, 7321);
        assert_eq!(config.server_kwargs.app(), Some("hello:app"));
        assert_eq!((config.width, config.height), (Some(640), Some(480)));
        assert_eq!(config.extra_flags, vec!["--lang=en"]);
        assert_eq!(
            config.watchdog.map(|w| w.idle_timeout),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_unknown_server_name_fails() {
        let mut settings = Settings::default();
        settings.server.name = Some("rails".to_string());
        let err = settings.to_builder().unwrap_err();
        assert!(matches!(err, Error::UnknownServer { .. }));
    }

    #[test]
    fn test_no_server_name_fails() {
        let err = Settings::default().to_builder().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let mut settings = Settings::default();
        settings.server.name = Some("fastapi".to_string());
        settings.watchdog.idle_timeout_secs = -1.0;
        assert!(matches!(
            settings.to_builder().unwrap_err(),
            Error::InvalidIdleTimeout
        ));
    }
}
