//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Unknown server '{name}'. Supported servers: {supported}")]
    UnknownServer { name: String, supported: String },

    #[error("Server '{server}' needs an application target (e.g. \"main:app\") or explicit server kwargs")]
    MissingApp { server: String },

    #[error("Browser executable not found: {path}")]
    BrowserNotFound { path: PathBuf },

    #[error("Invalid window geometry {width}x{height}: width and height must be positive")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("Idle timeout must be positive")]
    InvalidIdleTimeout,

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Process/Server Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to allocate a free port: {reason}")]
    PortAllocation { reason: String },

    #[error("Executable not found: {program}")]
    ExecutableNotFound { program: String },

    #[error("Failed to spawn {program}: {reason}")]
    ProcessSpawn { program: String, reason: String },

    #[error("Process error: {message}")]
    Process { message: String },

    #[error("Server error: {message}")]
    Server { message: String },

    // ─────────────────────────────────────────────────────────────
    // Lifecycle Errors
    // ─────────────────────────────────────────────────────────────
    #[error("{stage} hook failed: {message}")]
    Hook { stage: String, message: String },

    #[error("Signal handler error: {message}")]
    Signal { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn unknown_server(name: impl Into<String>, supported: &[&str]) -> Self {
        Self::UnknownServer {
            name: name.into(),
            supported: supported.join(", "),
        }
    }

    pub fn missing_app(server: impl Into<String>) -> Self {
        Self::MissingApp {
            server: server.into(),
        }
    }

    pub fn browser_not_found(path: impl Into<PathBuf>) -> Self {
        Self::BrowserNotFound { path: path.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn port_allocation(reason: impl Into<String>) -> Self {
        Self::PortAllocation {
            reason: reason.into(),
        }
    }

    pub fn process_spawn(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn hook(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn signal(message: impl Into<String>) -> Self {
        Self::Signal {
            message: message.into(),
        }
    }

    /// Errors raised while building a session, before anything is spawned
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownServer { .. }
                | Error::MissingApp { .. }
                | Error::BrowserNotFound { .. }
                | Error::InvalidGeometry { .. }
                | Error::InvalidIdleTimeout
                | Error::Config { .. }
        )
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Process { .. }
                | Error::Server { .. }
                | Error::Signal { .. }
        )
    }

    /// Check if this error aborts the session
    pub fn is_fatal(&self) -> bool {
        self.is_config_error()
            || matches!(
                self,
                Error::PortAllocation { .. }
                    | Error::ExecutableNotFound { .. }
                    | Error::ProcessSpawn { .. }
                    | Error::Hook { .. }
            )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_server_lists_supported() {
        let err = Error::unknown_server("not-a-real-framework", &["flask", "fastapi"]);
        let msg = err.to_string();
        assert!(msg.contains("not-a-real-framework"));
        assert!(msg.contains("flask, fastapi"));
        assert!(err.is_config_error());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_hook_error_is_fatal_not_recoverable() {
        let err = Error::hook("startup", "database unavailable");
        assert_eq!(err.to_string(), "startup hook failed: database unavailable");
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_runtime_errors_are_recoverable() {
        assert!(Error::process("kill failed").is_recoverable());
        assert!(Error::server("boom").is_recoverable());
        assert!(Error::signal("no SIGTERM handler").is_recoverable());
        assert!(!Error::InvalidIdleTimeout.is_recoverable());
    }

    #[test]
    fn test_browser_not_found_mentions_path() {
        let err = Error::browser_not_found("/opt/nope/chrome");
        assert!(err.to_string().contains("/opt/nope/chrome"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_context_preserves_variant() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.context("removing profile").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
