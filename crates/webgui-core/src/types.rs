//! Domain types shared by every webgui crate

use serde::{Deserialize, Serialize};

/// Lifecycle state of a desktop session
///
/// Transitions only move forward:
/// `Idle → ServerStarting → Running → Stopping → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    ServerStarting,
    Running,
    Stopping,
    Stopped,
}

impl SessionState {
    /// Whether the session has begun or finished tearing down
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopping | SessionState::Stopped)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::ServerStarting => "server-starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What moved a session from `Running` to `Stopping`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ShutdownReason {
    /// The app-mode browser window was closed
    BrowserExited { code: Option<i32> },
    /// No keep-alive signal arrived within the idle timeout
    Idle,
    /// SIGINT/SIGTERM (or Ctrl+C) from the controlling terminal
    Interrupted,
    /// `SessionHandle::request_shutdown` was called
    Requested,
    /// The server execution unit terminated on its own
    ServerExited { code: Option<i32> },
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::BrowserExited { code } => write!(f, "browser exited ({:?})", code),
            ShutdownReason::Idle => write!(f, "keep-alive went stale"),
            ShutdownReason::Interrupted => write!(f, "interrupted"),
            ShutdownReason::Requested => write!(f, "shutdown requested"),
            ShutdownReason::ServerExited { code } => write!(f, "server exited ({:?})", code),
        }
    }
}

/// Operating system family, as far as browser discovery and process
/// control are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    MacOS,
    Windows,
    Other,
}

impl Platform {
    /// Platform this binary was compiled for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }

    /// Default Python interpreter name
    pub fn python(&self) -> &'static str {
        match self {
            Platform::Windows => "python",
            _ => "python3",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::MacOS => write!(f, "macos"),
            Platform::Windows => write!(f, "windows"),
            Platform::Other => write!(f, "other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_ordering_follows_lifecycle() {
        assert!(SessionState::Idle < SessionState::ServerStarting);
        assert!(SessionState::ServerStarting < SessionState::Running);
        assert!(SessionState::Running < SessionState::Stopping);
        assert!(SessionState::Stopping < SessionState::Stopped);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Stopping.is_terminal());
        assert!(SessionState::Stopped.is_terminal());
    }

    #[test]
    fn test_shutdown_reason_serializes_with_tag() {
        let json = serde_json::to_string(&ShutdownReason::BrowserExited { code: Some(0) }).unwrap();
        assert_eq!(json, r#"{"reason":"browser_exited","code":0}"#);
    }

    #[test]
    fn test_python_name_per_platform() {
        assert_eq!(Platform::Windows.python(), "python");
        assert_eq!(Platform::Linux.python(), "python3");
        assert_eq!(Platform::MacOS.python(), "python3");
    }
}
