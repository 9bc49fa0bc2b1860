//! # webgui-daemon - Process and Browser Plumbing
//!
//! Everything that touches the operating system on behalf of a session:
//! loopback ports, browser discovery and command lines, child processes,
//! server threads, and the framework launch adapters.
//!
//! Depends on [`webgui_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Ports
//! - [`free_port()`] - Ask the OS for an unused loopback port
//! - [`kill_port()`] - Terminate other processes listening on a port
//!
//! ### Browser
//! - [`BrowserLocator`] / [`find_browser()`] - Chromium-family discovery
//! - [`BrowserCommand`] - App-mode command line or OS opener fallback
//!
//! ### Execution Units
//! - [`ManagedProcess`] - Child process with kill channel and exit notification
//! - [`ServerThread`] - In-process server with a cooperative [`StopSignal`]
//! - [`ExecutionUnit`] - One handle over both
//!
//! ### Servers
//! - [`ServerBackend`] - flask / fastapi / django / flask_socketio / custom
//! - [`ServerKwargs`] - Keyword-argument bundle passed to a server
//!
//! ### Keep-Alive
//! - [`KeepAlive`] - Shared last-seen timestamp with an injectable [`Clock`]

pub mod browser;
pub mod keep_alive;
pub mod port;
pub mod process;
pub mod server;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod thread;
pub mod unit;

pub use browser::{
    candidate_paths, default_browser_hint, default_profile_dir, find_browser, remove_profile_dir,
    BrowserCommand, BrowserLocator, BrowserOptions,
};
pub use keep_alive::{Clock, KeepAlive, TokioClock};
pub use port::{free_port, kill_port, local_url, port_is_free, LOOPBACK};
pub use process::{process_is_alive, ManagedProcess, ProcessCommand};
pub use server::{
    CustomServer, LaunchContext, ServerBackend, ServerContext, ServerInputs, ServerKwargs,
    SUPPORTED_SERVERS,
};
pub use thread::{ServerThread, StopSignal, ThreadOutcome};
pub use unit::{ExecutionUnit, UnitExit};
