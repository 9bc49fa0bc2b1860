//! webgui - open a local Python web app in its own window
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use webgui::prelude::*;
use webgui::{default_settings_path, load_settings, Settings};

/// webgui - open a local Python web app in its own window
#[derive(Parser, Debug)]
#[command(name = "webgui")]
#[command(about = "Open a local Python web app in a chromeless browser window", long_about = None)]
struct Args {
    /// Framework: flask, fastapi, django or flask_socketio
    #[arg(value_name = "SERVER")]
    server: Option<String>,

    /// Application import target, e.g. main:app
    #[arg(long)]
    app: Option<String>,

    /// Directory the server runs in
    #[arg(long, value_name = "DIR")]
    app_dir: Option<PathBuf>,

    /// Python interpreter
    #[arg(long, value_name = "PATH")]
    python: Option<PathBuf>,

    /// Port to serve on (default: a free one)
    #[arg(long)]
    port: Option<u16>,

    /// Flask-SocketIO object import target, e.g. main:socketio
    #[arg(long)]
    socketio: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fullscreen: bool,

    #[arg(long)]
    maximized: bool,

    /// Open a normal browser window instead of an app window
    #[arg(long)]
    no_app_mode: bool,

    /// Browser executable (default: discovered)
    #[arg(long, value_name = "PATH")]
    browser: Option<PathBuf>,

    /// Extra browser flag, may be repeated
    #[arg(long = "browser-flag", value_name = "FLAG", allow_hyphen_values = true)]
    browser_flags: Vec<String>,

    /// Close when the UI goes quiet instead of when the browser exits
    #[arg(long)]
    watchdog: bool,

    /// Watchdog idle timeout in seconds
    #[arg(long, value_name = "SECS")]
    idle_timeout: Option<f64>,

    /// Settings file (default: ./webgui.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Args {
    /// Command-line values take precedence over the settings file
    fn apply(self, settings: &mut Settings) {
        let server = &mut settings.server;
        server.name = self.server.or(server.name.take());
        server.app = self.app.or(server.app.take());
        server.app_dir = self.app_dir.or(server.app_dir.take());
        server.python = self.python.or(server.python.take());
        server.port = self.port.or(server.port);
        server.socketio = self.socketio.or(server.socketio.take());

        let window = &mut settings.window;
        window.width = self.width.or(window.width);
        window.height = self.height.or(window.height);
        window.fullscreen |= self.fullscreen;
        window.maximized |= self.maximized;
        if self.no_app_mode {
            window.app_mode = false;
        }

        if self.browser.is_some() {
            settings.browser.path = self.browser;
        }
        settings.browser.extra_flags.extend(self.browser_flags);

        settings.watchdog.enabled |= self.watchdog;
        if let Some(secs) = self.idle_timeout {
            settings.watchdog.idle_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();

    let settings_path = args.config.take().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    args.apply(&mut settings);

    let config = settings.to_builder()?.handle_signals(true).build()?;
    let url = config.url();
    eprintln!("Serving {} at {}", config.server, url);

    let report = webgui::run(config).await?;
    eprintln!(
        "Session on port {} ended: {} ({}s)",
        report.port,
        report.reason,
        report.duration().num_seconds()
    );
    Ok(())
}
