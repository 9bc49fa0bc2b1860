//! # webgui-app - Session Orchestration
//!
//! Turns a [`SessionConfig`] into a running desktop window and back again.
//!
//! Depends on [`webgui_core`] for domain types and error handling, and on
//! [`webgui_daemon`] for ports, browsers, processes and server adapters.
//!
//! ## Public API
//!
//! ### Configuration
//! - [`SessionConfig`] / [`SessionConfigBuilder`] - Validated session settings
//! - [`Settings`] / [`load_settings()`] - Optional `webgui.toml`
//!
//! ### Orchestration
//! - [`Session`] - Runs the state machine to completion
//! - [`SessionHandle`] - Observe state, request shutdown
//! - [`SessionReport`] - Why and when the session ended
//!
//! ### Liveness
//! - [`Watchdog`] - Idle-timeout alternative to waiting on the browser process

pub mod config;
pub mod session;
pub mod signals;
pub mod watchdog;

pub use config::{
    default_settings_path, load_settings, Hook, Hooks, SessionConfig, SessionConfigBuilder,
    Settings, WatchdogConfig, DEFAULT_IDLE_TIMEOUT,
};
pub use session::{Session, SessionHandle, SessionReport, JOIN_TIMEOUT};
pub use signals::spawn_signal_handler;
pub use watchdog::{Probe, Watchdog, WatchdogOutcome};
