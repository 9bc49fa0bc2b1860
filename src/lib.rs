//! webgui Library
//!
//! Runs a local Python web application in a chromeless browser window and
//! tears everything down when the window closes.
//!
//! The work is split across three crates, re-exported here:
//! - `webgui_core` - error taxonomy, logging, lifecycle types
//! - `webgui_daemon` - ports, browser discovery, processes, server adapters
//! - `webgui_app` - session configuration and orchestration

pub use webgui_app::{
    default_settings_path, load_settings, Session, SessionConfig, SessionConfigBuilder,
    SessionHandle, SessionReport, Settings,
};
pub use webgui_core::{logging, prelude, Error, Result, SessionState, ShutdownReason};
pub use webgui_daemon::{
    find_browser, free_port, kill_port, BrowserCommand, ServerBackend, ServerContext,
    ServerKwargs, StopSignal,
};

use webgui_core::prelude::*;

/// Launcher entry point: install reporting and logging, then run one session
pub async fn run(config: SessionConfig) -> Result<SessionReport> {
    color_eyre::install().map_err(|e| Error::config(format!("error reporter: {}", e)))?;

    logging::init()?;

    info!("═══════════════════════════════════════════════════════");
    info!("webgui starting: {} on port {}", config.server, config.port);
    info!("═══════════════════════════════════════════════════════");

    let result = match Session::new(config) {
        Ok(session) => session.run().await,
        Err(e) => Err(e),
    };

    if let Err(ref e) = result {
        error!("Session error: {:?}", e);
    }

    info!("webgui exiting");
    result
}
