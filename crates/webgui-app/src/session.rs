//! Session orchestration
//!
//! A [`Session`] drives one desktop window through
//! `Idle → ServerStarting → Running → Stopping → Stopped`:
//!
//! 1. Run the startup hook; failure aborts before anything is spawned.
//! 2. Launch the server unit, then the browser. No readiness handshake: the
//!    browser retries until the server accepts connections.
//! 3. Wait for the first shutdown trigger.
//! 4. Tear down. Every step is attempted and failures are only logged, so the
//!    session always reaches `Stopped`.
//!
//! State changes are published on a watch channel and observed through a
//! cloneable [`SessionHandle`], which is also the only external way to ask a
//! running session to stop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::watch;
use webgui_core::prelude::*;
use webgui_core::{Platform, SessionState, ShutdownReason};
use webgui_daemon::{
    kill_port, local_url, remove_profile_dir, BrowserCommand, KeepAlive, LaunchContext,
    ManagedProcess, StopSignal,
};

use crate::config::{Hook, SessionConfig};
use crate::signals::spawn_signal_handler;
use crate::watchdog::{Probe, Watchdog, WatchdogOutcome};

/// How long teardown waits for each unit to go away
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Summary returned by [`Session::run`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub port: u16,
    pub reason: ShutdownReason,
    /// Exit code of the browser if it had exited before teardown
    pub browser_exit_code: Option<i32>,
    pub started_at: DateTime<Local>,
    pub stopped_at: DateTime<Local>,
}

impl SessionReport {
    pub fn duration(&self) -> chrono::Duration {
        self.stopped_at - self.started_at
    }
}

struct HandleInner {
    port: u16,
    state: watch::Sender<SessionState>,
    trigger: watch::Sender<Option<ShutdownReason>>,
}

/// Cloneable view of a session: observe its state, ask it to stop
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    pub(crate) fn new(port: u16) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (trigger, _) = watch::channel(None);
        Self {
            inner: Arc::new(HandleInner {
                port,
                state,
                trigger,
            }),
        }
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn url(&self) -> String {
        local_url(self.inner.port)
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the session has reached `target` or any later state
    pub async fn wait_for_state(&self, target: SessionState) -> SessionState {
        let mut rx = self.subscribe();
        let reached = rx
            .wait_for(|state| *state >= target)
            .await
            .map(|state| *state);
        reached.unwrap_or_else(|_| self.state())
    }

    /// Ask the session to tear down. No effect once another trigger fired.
    pub fn request_shutdown(&self) {
        if self.trigger(ShutdownReason::Requested) {
            info!("Shutdown requested for session on port {}", self.inner.port);
        }
    }

    /// The trigger that ended (or is ending) the session
    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        self.inner.trigger.borrow().clone()
    }

    /// Record `reason` unless a trigger already fired. Returns whether it won.
    pub(crate) fn trigger(&self, reason: ShutdownReason) -> bool {
        self.inner.trigger.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        })
    }

    fn triggers(&self) -> watch::Receiver<Option<ShutdownReason>> {
        self.inner.trigger.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.inner.state.send_replace(state);
        debug!("Session state {} -> {}", previous, state);
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("port", &self.inner.port)
            .field("state", &self.state())
            .finish()
    }
}

/// Browser process plus whether its exit means the window closed
struct LaunchedBrowser {
    process: ManagedProcess,
    direct: bool,
}

/// One desktop window backed by one local server
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    handle: SessionHandle,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let handle = SessionHandle::new(config.port);
        Ok(Self { config, handle })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the session to completion.
    ///
    /// Returns `Err` only when the session could not start (startup hook or
    /// server launch failure). Once running, it always tears down and reports.
    pub async fn run(mut self) -> Result<SessionReport> {
        let started_at = Local::now();
        let handle = self.handle.clone();
        let port = self.config.port;
        info!("Starting {} session at {}", self.config.server, self.config.url());

        let browser_command = self.config.browser_command()?;

        handle.set_state(SessionState::ServerStarting);
        if let Some(hook) = self.config.hooks.on_startup.take() {
            if let Err(message) = run_hook(hook) {
                error!("Startup hook failed: {}", message);
                handle.set_state(SessionState::Stopped);
                return Err(Error::hook("startup", message));
            }
        }

        let keep_alive = KeepAlive::new();
        let keep_alive_file = self.config.keep_alive_file();
        let ctx = LaunchContext {
            port,
            python: self.config.python.clone(),
            app_dir: self.config.app_dir.clone(),
            keep_alive_file: keep_alive_file.clone(),
            stop: StopSignal::new(),
            keep_alive: keep_alive.clone(),
        };

        let kwargs = self.config.server_kwargs.clone();
        let mut server = match self.config.server.launch(kwargs, ctx).await {
            Ok(unit) => unit,
            Err(e) => {
                error!("Failed to start {} server: {}", self.config.server, e);
                handle.set_state(SessionState::Stopping);
                self.finish_teardown();
                return Err(e);
            }
        };

        let mut browser = launch_browser(&browser_command, &self.config);
        keep_alive.touch();
        handle.set_state(SessionState::Running);

        let signal_task = self
            .config
            .handle_signals
            .then(|| spawn_signal_handler(handle.clone()));

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let watchdog_task = self.config.watchdog.map(|timing| {
            let mut watchdog = Watchdog::new(keep_alive.clone(), timing.idle_timeout)
                .with_poll_interval(timing.poll_interval);
            if let Some(path) = &keep_alive_file {
                watchdog = watchdog.with_probe(Probe::KeepAliveFile(path.clone()));
            } else if let Some(pid) = browser
                .as_ref()
                .filter(|b| b.direct)
                .and_then(|b| b.process.id())
            {
                watchdog = watchdog.with_probe(Probe::BrowserProcess(pid));
            }

            let handle = handle.clone();
            tokio::spawn(async move {
                if watchdog.run(cancel_rx).await == WatchdogOutcome::Stale {
                    handle.trigger(ShutdownReason::Idle);
                }
            })
        });

        // Only a browser we spawned directly tracks the window; the OS opener
        // exits as soon as it has handed the URL over.
        let browser_closes_session =
            self.config.watchdog.is_none() && browser.as_ref().is_some_and(|b| b.direct);

        let mut triggers = handle.triggers();
        let reason = tokio::select! {
            code = wait_browser(browser.as_ref(), browser_closes_session) => {
                info!("Browser window closed");
                ShutdownReason::BrowserExited { code }
            }
            exit = server.wait() => {
                warn!(
                    "{} server {} exited unexpectedly ({:?})",
                    self.config.server,
                    server.kind(),
                    exit
                );
                ShutdownReason::ServerExited { code: exit.code() }
            }
            reason = next_trigger(&mut triggers) => reason,
        };
        handle.trigger(reason.clone());
        let reason = handle.shutdown_reason().unwrap_or(reason);

        handle.set_state(SessionState::Stopping);
        info!("Stopping session: {}", reason);

        let browser_exit_code = browser
            .as_ref()
            .filter(|b| b.process.has_exited())
            .and_then(|b| b.process.exit_code());

        let _ = cancel_tx.send(true);
        if let Some(task) = watchdog_task {
            let _ = task.await;
        }
        if let Some(task) = signal_task {
            task.abort();
        }

        if let Some(b) = browser.as_mut().filter(|b| b.process.is_running()) {
            b.process.kill();
            if !b.process.join(JOIN_TIMEOUT).await {
                warn!("Browser did not exit within {:?}", JOIN_TIMEOUT);
            }
        }

        server.terminate(port).await;
        if !server.join(JOIN_TIMEOUT).await {
            warn!(
                "Server {} still running after {:?}; abandoning it",
                server.kind(),
                JOIN_TIMEOUT
            );
        }
        if server.needs_port_sweep() {
            kill_port(port).await;
        }

        self.finish_teardown();

        let report = SessionReport {
            port,
            reason,
            browser_exit_code,
            started_at,
            stopped_at: Local::now(),
        };
        info!(
            "Session on port {} stopped after {}s: {}",
            report.port,
            report.duration().num_seconds(),
            report.reason
        );
        Ok(report)
    }

    /// Filesystem cleanup and shutdown hook; always ends in `Stopped`
    fn finish_teardown(&mut self) {
        if let Err(e) = remove_profile_dir(&self.config.profile_dir) {
            warn!(
                "Failed to remove profile directory {}: {}",
                self.config.profile_dir.display(),
                e
            );
        }

        if let Some(path) = self.config.keep_alive_file() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }

        if let Some(hook) = self.config.hooks.on_shutdown.take() {
            if let Err(message) = run_hook(hook) {
                warn!("{}", Error::hook("shutdown", message));
            }
        }

        self.handle.set_state(SessionState::Stopped);
    }
}

/// Spawn the browser, degrading to the OS opener if a direct launch fails
fn launch_browser(command: &BrowserCommand, config: &SessionConfig) -> Option<LaunchedBrowser> {
    match ManagedProcess::spawn("browser", command.process_command()) {
        Ok(process) => Some(LaunchedBrowser {
            process,
            direct: command.is_direct(),
        }),
        Err(e) if command.is_direct() => {
            warn!("Failed to launch browser ({}), opening the default browser instead", e);
            let fallback =
                BrowserCommand::derive(None, &config.browser_options(), Platform::current());
            launch_browser(&fallback, config)
        }
        Err(e) => {
            warn!("Failed to open the default browser: {}", e);
            None
        }
    }
}

async fn wait_browser(browser: Option<&LaunchedBrowser>, closes_session: bool) -> Option<i32> {
    match browser {
        Some(b) if closes_session => b.process.wait().await,
        _ => std::future::pending().await,
    }
}

async fn next_trigger(rx: &mut watch::Receiver<Option<ShutdownReason>>) -> ShutdownReason {
    let fired = rx
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|reason| reason.clone());
    match fired {
        Some(reason) => reason,
        None => std::future::pending().await,
    }
}

/// Run a hook, folding errors and panics into a message
fn run_hook(hook: Hook) -> std::result::Result<(), String> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(hook)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(report)) => Err(format!("{:#}", report)),
        Err(_) => Err("hook panicked".to_string()),
    }
}
