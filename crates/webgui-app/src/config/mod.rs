//! Session configuration
//!
//! A [`SessionConfig`] is built once, validated once, and then fixed for the
//! session's lifetime: the port, browser path and profile directory are all
//! resolved at build time so the browser command line derived from it is
//! deterministic.
//!
//! Supports:
//! - [`SessionConfig::builder`] - Programmatic configuration
//! - `webgui.toml` - Optional settings file read by the launcher ([`load_settings`])

pub mod settings;
pub mod types;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use webgui_core::prelude::*;
use webgui_core::Platform;
use webgui_daemon::{
    default_profile_dir, find_browser, free_port, local_url, BrowserCommand, BrowserOptions,
    ServerBackend, ServerInputs, ServerKwargs,
};

pub use settings::{default_settings_path, load_settings, CONFIG_FILENAME};
pub use types::*;

/// Lifecycle hook run synchronously on the orchestrating task
pub type Hook = Box<dyn FnOnce() -> color_eyre::Result<()> + Send>;

/// Default idle timeout for the liveness watchdog
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Watchdog timing, present only when the watchdog replaces the browser-exit wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub idle_timeout: Duration,
    pub poll_interval: Duration,
}

/// Optional startup and shutdown callbacks
#[derive(Default)]
pub struct Hooks {
    pub on_startup: Option<Hook>,
    pub on_shutdown: Option<Hook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_startup", &self.on_startup.is_some())
            .field("on_shutdown", &self.on_shutdown.is_some())
            .finish()
    }
}

/// Fully resolved, validated session configuration
#[derive(Debug)]
pub struct SessionConfig {
    pub server: ServerBackend,
    pub server_kwargs: ServerKwargs,
    pub port: u16,
    pub app_dir: Option<PathBuf>,
    pub python: PathBuf,

    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fullscreen: bool,
    pub maximized: bool,
    pub app_mode: bool,

    /// Located or caller-supplied browser; `None` means the OS opener
    pub browser_path: Option<PathBuf>,
    pub browser_command: Option<Vec<String>>,
    pub extra_flags: Vec<String>,
    pub profile_dir: PathBuf,

    pub watchdog: Option<WatchdogConfig>,
    /// Turn SIGINT/SIGTERM (Ctrl+C on Windows) into a shutdown trigger
    pub handle_signals: bool,
    pub hooks: Hooks,
}

impl SessionConfig {
    pub fn builder(server: ServerBackend) -> SessionConfigBuilder {
        SessionConfigBuilder::new(server)
    }

    /// Re-check invariants the builder established
    pub fn validate(&self) -> Result<()> {
        if self.server.requires_app() && self.server_kwargs.app().is_none() {
            return Err(Error::missing_app(self.server.name()));
        }
        validate_geometry(self.width, self.height)?;
        if let Some(watchdog) = &self.watchdog {
            if watchdog.idle_timeout.is_zero() || watchdog.poll_interval.is_zero() {
                return Err(Error::InvalidIdleTimeout);
            }
        }
        if let Some(command) = &self.browser_command {
            if command.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(Error::config("browser command must name a program"));
            }
        }
        Ok(())
    }

    /// `http://127.0.0.1:<port>`
    pub fn url(&self) -> String {
        local_url(self.port)
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            url: self.url(),
            profile_dir: self.profile_dir.clone(),
            width: self.width,
            height: self.height,
            fullscreen: self.fullscreen,
            maximized: self.maximized,
            app_mode: self.app_mode,
            extra_flags: self.extra_flags.clone(),
        }
    }

    /// Browser invocation for this session; same config, same argv
    pub fn browser_command(&self) -> Result<BrowserCommand> {
        match &self.browser_command {
            Some(argv) => BrowserCommand::custom(argv),
            None => Ok(BrowserCommand::derive(
                self.browser_path.as_deref(),
                &self.browser_options(),
                Platform::current(),
            )),
        }
    }

    /// File the instrumented framework rewrites on every request.
    ///
    /// Only set in watchdog mode for frameworks that accept the injection.
    pub fn keep_alive_file(&self) -> Option<PathBuf> {
        (self.watchdog.is_some() && self.server.supports_keep_alive_injection())
            .then(|| keep_alive_path(&self.profile_dir))
    }
}

/// Sibling of the profile directory, so the browser never touches it
fn keep_alive_path(profile_dir: &Path) -> PathBuf {
    let mut name = profile_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "webgui".into());
    name.push(".alive");
    profile_dir.with_file_name(name)
}

fn validate_geometry(width: Option<u32>, height: Option<u32>) -> Result<()> {
    match (width, height) {
        (Some(0), _) | (_, Some(0)) => Err(Error::InvalidGeometry {
            width: width.unwrap_or_default(),
            height: height.unwrap_or_default(),
        }),
        _ => Ok(()),
    }
}

/// Builder for [`SessionConfig`]
#[derive(Debug)]
pub struct SessionConfigBuilder {
    server: ServerBackend,
    app: Option<String>,
    socketio: Option<String>,
    server_kwargs: Option<ServerKwargs>,
    port: Option<u16>,
    app_dir: Option<PathBuf>,
    python: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    fullscreen: bool,
    maximized: bool,
    app_mode: bool,
    browser_path: Option<PathBuf>,
    browser_command: Option<Vec<String>>,
    discover_browser: bool,
    extra_flags: Vec<String>,
    profile_dir: Option<PathBuf>,
    watchdog: bool,
    idle_timeout: Duration,
    poll_interval: Option<Duration>,
    handle_signals: bool,
    hooks: Hooks,
}

impl SessionConfigBuilder {
    fn new(server: ServerBackend) -> Self {
        Self {
            server,
            app: None,
            socketio: None,
            server_kwargs: None,
            port: None,
            app_dir: None,
            python: None,
            width: None,
            height: None,
            fullscreen: false,
            maximized: false,
            app_mode: true,
            browser_path: None,
            browser_command: None,
            discover_browser: true,
            extra_flags: Vec::new(),
            profile_dir: None,
            watchdog: false,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            poll_interval: None,
            handle_signals: false,
            hooks: Hooks::default(),
        }
    }

    /// Import target of the application, e.g. `main:app`
    pub fn app(mut self, target: impl Into<String>) -> Self {
        self.app = Some(target.into());
        self
    }

    /// Flask-SocketIO object; defaults to `<app module>:socketio`
    pub fn socketio(mut self, target: impl Into<String>) -> Self {
        self.socketio = Some(target.into());
        self
    }

    /// Use `kwargs` verbatim instead of the derived bundle
    pub fn server_kwargs(mut self, kwargs: ServerKwargs) -> Self {
        self.server_kwargs = Some(kwargs);
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn app_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.app_dir = Some(dir.into());
        self
    }

    pub fn python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = Some(python.into());
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn width(mut self, width: Option<u32>) -> Self {
        self.width = width;
        self
    }

    pub fn height(mut self, height: Option<u32>) -> Self {
        self.height = height;
        self
    }

    pub fn fullscreen(mut self, fullscreen: bool) -> Self {
        self.fullscreen = fullscreen;
        self
    }

    pub fn maximized(mut self, maximized: bool) -> Self {
        self.maximized = maximized;
        self
    }

    pub fn app_mode(mut self, app_mode: bool) -> Self {
        self.app_mode = app_mode;
        self
    }

    /// Explicit browser executable; `build()` fails if it does not exist
    pub fn browser_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser_path = Some(path.into());
        self
    }

    /// Complete browser argv, program first
    pub fn browser_command(mut self, argv: Vec<String>) -> Self {
        self.browser_command = Some(argv);
        self
    }

    /// Skip discovery; without an explicit path the OS opener is used
    pub fn discover_browser(mut self, discover: bool) -> Self {
        self.discover_browser = discover;
        self
    }

    pub fn extra_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_flags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = Some(dir.into());
        self
    }

    /// Replace the browser-exit wait with the liveness watchdog
    pub fn watchdog(mut self, enabled: bool) -> Self {
        self.watchdog = enabled;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn on_startup<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> color_eyre::Result<()> + Send + 'static,
    {
        self.hooks.on_startup = Some(Box::new(hook));
        self
    }

    pub fn on_shutdown<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> color_eyre::Result<()> + Send + 'static,
    {
        self.hooks.on_shutdown = Some(Box::new(hook));
        self
    }

    /// Validate and resolve port, kwargs, browser and profile directory
    pub fn build(self) -> Result<SessionConfig> {
        if self.server.requires_app()
            && self.app.is_none()
            && self.server_kwargs.as_ref().and_then(|k| k.app()).is_none()
        {
            return Err(Error::missing_app(self.server.name()));
        }
        validate_geometry(self.width, self.height)?;
        if self.watchdog && self.idle_timeout.is_zero() {
            return Err(Error::InvalidIdleTimeout);
        }
        if let Some(path) = &self.browser_path {
            if !path.exists() {
                return Err(Error::browser_not_found(path.clone()));
            }
        }

        let requested = self
            .port
            .or_else(|| self.server_kwargs.as_ref().and_then(ServerKwargs::port));
        let port = match requested {
            Some(port) => port,
            None => free_port()?,
        };

        let server_kwargs = match self.server_kwargs {
            Some(mut kwargs) => {
                // The server binds the same port the browser and teardown use
                if kwargs.contains_key("port") && kwargs.port() != Some(port) {
                    warn!("Server kwargs port replaced by session port {}", port);
                    kwargs.insert("port", port);
                }
                kwargs
            }
            None => self.server.derive_kwargs(&ServerInputs {
                app: self.app,
                port,
                socketio: self.socketio,
            }),
        };

        let browser_path = match (&self.browser_command, self.browser_path) {
            (Some(_), _) => None,
            (None, Some(path)) => Some(path),
            (None, None) if self.discover_browser => find_browser(),
            (None, None) => None,
        };

        let watchdog = self.watchdog.then(|| WatchdogConfig {
            idle_timeout: self.idle_timeout,
            poll_interval: self.poll_interval.unwrap_or(self.idle_timeout),
        });

        let config = SessionConfig {
            server: self.server,
            server_kwargs,
            port,
            app_dir: self.app_dir,
            python: self
                .python
                .unwrap_or_else(|| PathBuf::from(Platform::current().python())),
            width: self.width,
            height: self.height,
            fullscreen: self.fullscreen,
            maximized: self.maximized,
            app_mode: self.app_mode,
            browser_path,
            browser_command: self.browser_command,
            extra_flags: self.extra_flags,
            profile_dir: self.profile_dir.unwrap_or_else(|| default_profile_dir(port)),
            watchdog,
            handle_signals: self.handle_signals,
            hooks: self.hooks,
        };
        config.validate()?;

        debug!("Session config resolved: server={} port={}", config.server, config.port);
        Ok(config)
    }
}
