//! Child process management for servers and browsers

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Notify};
use webgui_core::prelude::*;

/// A fully resolved command line, ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.current_dir = dir;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl std::fmt::Display for ProcessCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Manages a child process (a framework server or a browser).
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background task that
/// calls `child.wait()`, so the real exit code is captured when the process ends.
///
/// `ManagedProcess` retains a kill channel ([`kill_tx`]) to request a force-kill, an
/// atomic flag ([`exited`]) for synchronous `has_exited()` checks, and a [`Notify`]
/// handle so `wait()` can await exit without polling.
pub struct ManagedProcess {
    /// Short name used in log lines ("server", "browser")
    label: String,
    /// Process ID, retained for liveness probes and termination fallbacks
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to force-kill the process.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
    /// Exit code recorded by the wait task before `exited` is set
    exit_code: Arc<Mutex<Option<i32>>>,
    /// Notified by the wait task immediately after the child exits.
    exit_notify: Arc<Notify>,
}

impl ManagedProcess {
    /// Spawn `command`; stdout/stderr lines are forwarded to the log.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(label: impl Into<String>, command: &ProcessCommand) -> Result<Self> {
        let label = label.into();
        info!("Spawning {}: {}", label, command);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            let program = command.program.display().to_string();
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ExecutableNotFound { program }
            } else {
                Error::process_spawn(program, e.to_string())
            }
        })?;

        let pid = child.id();
        info!("{} process started with PID: {:?}", label, pid);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(Self::output_reader(stdout, label.clone(), "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(Self::output_reader(stderr, label.clone(), "stderr"));
        }

        Ok(Self::watch(label, child))
    }

    /// Hand `child` to a wait task and build the handle around it
    fn watch(label: String, child: Child) -> Self {
        let pid = child.id();
        let exited = Arc::new(AtomicBool::new(false));
        let exit_code = Arc::new(Mutex::new(None));
        let exit_notify = Arc::new(Notify::new());

        // Kill channel: ManagedProcess holds the sender, wait task holds the receiver.
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            label.clone(),
            kill_rx,
            Arc::clone(&exited),
            Arc::clone(&exit_code),
            Arc::clone(&exit_notify),
        ));

        Self {
            label,
            pid,
            kill_tx: Some(kill_tx),
            exited,
            exit_code,
            exit_notify,
        }
    }

    /// Background task: owns `child`, waits for it to exit.
    ///
    /// Two ways the task can end:
    /// 1. The process exits naturally and `child.wait()` resolves.
    /// 2. `kill_rx` fires: kill the child first, then wait for it.
    async fn wait_for_exit(
        mut child: Child,
        label: String,
        kill_rx: oneshot::Receiver<()>,
        exited: Arc<AtomicBool>,
        exit_code: Arc<Mutex<Option<i32>>>,
        exit_notify: Arc<Notify>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("{} process exited with status: {}", label, status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for {} process: {}", label, e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Force-killing {} process", label);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {} process: {}", label, e);
                }
                match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!("Error waiting after kill of {}: {}", label, e);
                        None
                    }
                }
            }
        };

        if let Ok(mut slot) = exit_code.lock() {
            *slot = code;
        }
        // Mark as exited before waking waiters so `has_exited()` is already true for them.
        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();
    }

    /// Forward child output to the log, line by line
    async fn output_reader<R>(stream: R, label: String, channel: &'static str)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stream).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            debug!("[{} {}] {}", label, channel, line);
        }
        trace!("{} {} reader finished", label, channel);
    }

    /// Wait until the process has exited and return its exit code.
    pub async fn wait(&self) -> Option<i32> {
        loop {
            // Create the `notified()` future BEFORE checking the flag so a
            // notification fired in between is not lost.
            let notified = self.exit_notify.notified();
            if self.has_exited() {
                return self.exit_code();
            }
            notified.await;
        }
    }

    /// Wait at most `timeout` for exit. Returns `true` if the process is gone.
    pub async fn join(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    /// Force kill the process by signalling the wait task.
    ///
    /// The wait task calls `child.kill()` and then `child.wait()`, so the OS
    /// reaps the process before `has_exited()` turns true.
    pub fn kill(&mut self) {
        if self.has_exited() {
            return;
        }
        if let Some(tx) = self.kill_tx.take() {
            // The wait task may have already exited naturally.
            let _ = tx.send(());
        }
    }

    /// Non-blocking check backed by the flag set in the wait task
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    /// Exit code, once the process has exited (None if killed by a signal)
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code.lock().ok().and_then(|code| *code)
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("label", &self.label)
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .finish()
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            debug!("{} process handle dropped while running, killing", self.label);
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
        // kill_on_drop(true) on the Child is the final safety net if the
        // wait task hasn't had a chance to handle the kill yet.
    }
}

/// Whether `pid` is present in the process table and not a zombie
pub fn process_is_alive(pid: u32) -> bool {
    use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid)
        .map(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
        .unwrap_or(false)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessCommand {
        ProcessCommand::new("sh").args(["-c", script])
    }

    #[test]
    fn test_argv_starts_with_program() {
        let cmd = ProcessCommand::new("/usr/bin/chromium").args(["--no-first-run", "--app=x"]);
        assert_eq!(
            cmd.argv(),
            vec!["/usr/bin/chromium", "--no-first-run", "--app=x"]
        );
        assert_eq!(cmd.to_string(), "/usr/bin/chromium --no-first-run --app=x");
    }

    #[tokio::test]
    async fn test_exit_code_captured_on_normal_exit() {
        let process = ManagedProcess::spawn("test", &sh("exit 0")).unwrap();
        assert_eq!(process.wait().await, Some(0));
        assert!(process.has_exited());
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_exit_code_captured_on_error_exit() {
        let process = ManagedProcess::spawn("test", &sh("exit 42")).unwrap();
        assert_eq!(process.wait().await, Some(42));
        assert_eq!(process.exit_code(), Some(42));
    }

    #[tokio::test]
    async fn test_join_times_out_while_running() {
        let mut process = ManagedProcess::spawn("test", &sh("sleep 30")).unwrap();
        assert!(!process.join(Duration::from_millis(100)).await);
        assert!(process.is_running());

        process.kill();
        assert!(process.join(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_kill_long_running_process() {
        let mut process = ManagedProcess::spawn("test", &sh("sleep 60")).unwrap();
        let pid = process.id().expect("pid");
        assert!(process_is_alive(pid));

        process.kill();
        assert!(process.join(Duration::from_secs(5)).await);
        // Killed by signal: no exit code
        assert_eq!(process.exit_code(), None);
        assert!(!process_is_alive(pid));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let result = ManagedProcess::spawn(
            "test",
            &ProcessCommand::new("/nonexistent/webgui-test-binary"),
        );
        assert!(matches!(result, Err(Error::ExecutableNotFound { .. })));
    }

    #[tokio::test]
    async fn test_env_and_current_dir_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = sh("test \"$WEBGUI_TEST_VALUE\" = ok && test -n \"$(pwd)\" && touch marker")
            .env("WEBGUI_TEST_VALUE", "ok")
            .current_dir(Some(dir.path().to_path_buf()));

        let process = ManagedProcess::spawn("test", &cmd).unwrap();
        assert_eq!(process.wait().await, Some(0));
        assert!(dir.path().join("marker").exists());
    }
}
