//! Server launch adapters
//!
//! A closed set of framework families, each knowing how to derive its keyword
//! arguments and how to serve an application, plus one escape hatch for any
//! other server expressed as a Rust closure.
//!
//! Named adapters exec a fresh Python interpreter and therefore always run as
//! a separate process. A custom closure cannot leave this address space and
//! always runs on a dedicated thread.

mod command;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use webgui_core::prelude::*;

use crate::keep_alive::KeepAlive;
use crate::process::ManagedProcess;
use crate::thread::{ServerThread, StopSignal};
use crate::unit::ExecutionUnit;

pub use command::{
    build_command, kwargs_to_options, waitress_available, BOOTSTRAP, KEEPALIVE_FILE_ENV,
    SERVER_KWARGS_ENV,
};

/// Identifiers accepted by [`ServerBackend::from_str`]
pub const SUPPORTED_SERVERS: &[&str] = &["flask", "fastapi", "django", "flask_socketio"];

/// Keyword-argument bundle handed to a server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerKwargs(BTreeMap<String, Value>);

impl ServerKwargs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `port` entry, if present and a valid port number
    pub fn port(&self) -> Option<u16> {
        self.get("port")
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
    }

    /// `app` entry, if present and a string
    pub fn app(&self) -> Option<&str> {
        self.get("app").and_then(Value::as_str)
    }
}

impl FromIterator<(String, Value)> for ServerKwargs {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Generic inputs every adapter derives its kwargs from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInputs {
    /// Import target of the application, e.g. `main:app`
    pub app: Option<String>,
    pub port: u16,
    /// Import target of the Flask-SocketIO object, e.g. `main:socketio`
    pub socketio: Option<String>,
}

/// What a custom server closure receives besides its kwargs
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub port: u16,
    /// Raised at teardown; poll it to return promptly
    pub stop: StopSignal,
    /// Touch on each request to keep a watchdog-mode session alive
    pub keep_alive: KeepAlive,
}

/// Everything the launch step needs beyond the kwargs
#[derive(Debug, Clone)]
pub struct LaunchContext {
    /// Port to use when the kwargs carry none
    pub port: u16,
    pub python: PathBuf,
    /// Working directory for the server
    pub app_dir: Option<PathBuf>,
    /// Set when the framework should be instrumented to write keep-alives here
    pub keep_alive_file: Option<PathBuf>,
    pub stop: StopSignal,
    pub keep_alive: KeepAlive,
}

type ServeFn = dyn Fn(ServerKwargs, ServerContext) -> Result<()> + Send + Sync;

/// A caller-supplied server body
#[derive(Clone)]
pub struct CustomServer {
    name: String,
    serve: Arc<ServeFn>,
}

impl CustomServer {
    /// `serve` must block until the server stops
    pub fn new<F>(name: impl Into<String>, serve: F) -> Self
    where
        F: Fn(ServerKwargs, ServerContext) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            serve: Arc::new(serve),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomServer")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Framework family used to serve the application
#[derive(Debug, Clone)]
pub enum ServerBackend {
    Flask,
    FastApi,
    Django,
    FlaskSocketIo,
    Custom(CustomServer),
}

impl FromStr for ServerBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "flask" => Ok(ServerBackend::Flask),
            "fastapi" => Ok(ServerBackend::FastApi),
            "django" => Ok(ServerBackend::Django),
            "flask_socketio" | "flask-socketio" => Ok(ServerBackend::FlaskSocketIo),
            other => Err(Error::unknown_server(other, SUPPORTED_SERVERS)),
        }
    }
}

impl fmt::Display for ServerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ServerBackend {
    pub fn custom<F>(name: impl Into<String>, serve: F) -> Self
    where
        F: Fn(ServerKwargs, ServerContext) -> Result<()> + Send + Sync + 'static,
    {
        ServerBackend::Custom(CustomServer::new(name, serve))
    }

    pub fn name(&self) -> &str {
        match self {
            ServerBackend::Flask => "flask",
            ServerBackend::FastApi => "fastapi",
            ServerBackend::Django => "django",
            ServerBackend::FlaskSocketIo => "flask_socketio",
            ServerBackend::Custom(custom) => custom.name(),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, ServerBackend::Custom(_))
    }

    /// Named adapters cannot serve anything without an import target
    pub fn requires_app(&self) -> bool {
        !self.is_custom()
    }

    /// Whether a keep-alive route and request hook can be injected
    pub fn supports_keep_alive_injection(&self) -> bool {
        matches!(
            self,
            ServerBackend::Flask | ServerBackend::FastApi | ServerBackend::FlaskSocketIo
        )
    }

    /// Build the kwargs bundle from generic inputs
    pub fn derive_kwargs(&self, inputs: &ServerInputs) -> ServerKwargs {
        let mut kwargs = ServerKwargs::new();
        if let Some(app) = &inputs.app {
            kwargs.insert("app", app.as_str());
        }
        kwargs.insert("port", inputs.port);

        if let ServerBackend::FlaskSocketIo = self {
            let socketio = inputs
                .socketio
                .clone()
                .or_else(|| inputs.app.as_deref().map(default_socketio_target));
            if let Some(socketio) = socketio {
                kwargs.insert("flask_socketio", socketio);
            }
        }
        kwargs
    }

    /// Start serving. Returns once the unit is spawned, not once it is ready.
    pub async fn launch(&self, kwargs: ServerKwargs, ctx: LaunchContext) -> Result<ExecutionUnit> {
        match self {
            ServerBackend::Custom(custom) => {
                let port = kwargs.port().unwrap_or(ctx.port);
                let server_ctx = ServerContext {
                    port,
                    stop: ctx.stop.clone(),
                    keep_alive: ctx.keep_alive.clone(),
                };
                let serve = Arc::clone(&custom.serve);
                info!("Starting custom server {} on port {}", custom.name, port);

                let name = format!("{}-server", custom.name);
                let thread =
                    ServerThread::spawn(name, ctx.stop, move || serve(kwargs, server_ctx))?;
                Ok(ExecutionUnit::Thread(thread))
            }
            named => {
                if ctx.keep_alive_file.is_some() && !named.supports_keep_alive_injection() {
                    warn!(
                        "Keep-alive injection is not implemented for {}; \
                         the watchdog will rely on the browser process",
                        named
                    );
                }

                let waitress = if command::prefers_waitress(named, &ctx) {
                    waitress_available(&ctx.python, ctx.app_dir.as_deref()).await
                } else {
                    false
                };
                if matches!(named, ServerBackend::Flask | ServerBackend::Django) && !waitress {
                    info!("waitress not available, using the {} development server", named);
                }

                let cmd = build_command(named, &kwargs, &ctx, waitress)?;
                let process = ManagedProcess::spawn("server", &cmd)?;
                Ok(ExecutionUnit::Process(process))
            }
        }
    }
}

/// `main:app` → `main:socketio`
fn default_socketio_target(app: &str) -> String {
    let module = app.split_once(':').map(|(m, _)| m).unwrap_or(app);
    format!("{}:socketio", module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn inputs() -> ServerInputs {
        ServerInputs {
            app: Some("main:app".to_string()),
            port: 5000,
            socketio: None,
        }
    }

    #[test]
    fn test_parse_supported_identifiers() {
        assert!(matches!("flask".parse::<ServerBackend>(), Ok(ServerBackend::Flask)));
        assert!(matches!("fastapi".parse::<ServerBackend>(), Ok(ServerBackend::FastApi)));
        assert!(matches!("django".parse::<ServerBackend>(), Ok(ServerBackend::Django)));
        for alias in ["flask_socketio", "flask-socketio"] {
            assert!(matches!(
                alias.parse::<ServerBackend>(),
                Ok(ServerBackend::FlaskSocketIo)
            ));
        }
    }

    #[test]
    fn test_unknown_identifier_lists_supported() {
        let err = "not-a-real-framework".parse::<ServerBackend>().unwrap_err();
        assert!(err.is_config_error());
        let msg = err.to_string();
        assert!(msg.contains("not-a-real-framework"));
        for name in SUPPORTED_SERVERS {
            assert!(msg.contains(name), "{} missing from {}", name, msg);
        }
    }

    #[test]
    fn test_derive_kwargs_named() {
        for backend in [ServerBackend::Flask, ServerBackend::FastApi, ServerBackend::Django] {
            let kwargs = backend.derive_kwargs(&inputs());
            assert_eq!(kwargs.len(), 2);
            assert_eq!(kwargs.app(), Some("main:app"));
            assert_eq!(kwargs.port(), Some(5000));
        }
    }

    #[test]
    fn test_derive_kwargs_socketio() {
        let kwargs = ServerBackend::FlaskSocketIo.derive_kwargs(&inputs());
        assert_eq!(
            kwargs.get("flask_socketio").and_then(Value::as_str),
            Some("main:socketio")
        );

        let explicit = ServerInputs {
            socketio: Some("app.realtime:sio".to_string()),
            ..inputs()
        };
        let kwargs = ServerBackend::FlaskSocketIo.derive_kwargs(&explicit);
        assert_eq!(
            kwargs.get("flask_socketio").and_then(Value::as_str),
            Some("app.realtime:sio")
        );
    }

    #[test]
    fn test_derive_kwargs_custom_without_app() {
        let backend = ServerBackend::custom("noop", |_, _| Ok(()));
        let kwargs = backend.derive_kwargs(&ServerInputs {
            app: None,
            port: 8123,
            socketio: None,
        });
        assert_eq!(kwargs.len(), 1);
        assert_eq!(kwargs.port(), Some(8123));
        assert!(!backend.requires_app());
    }

    #[test]
    fn test_keep_alive_injection_support() {
        assert!(ServerBackend::Flask.supports_keep_alive_injection());
        assert!(ServerBackend::FastApi.supports_keep_alive_injection());
        assert!(ServerBackend::FlaskSocketIo.supports_keep_alive_injection());
        assert!(!ServerBackend::Django.supports_keep_alive_injection());
    }

    #[test]
    fn test_kwargs_port_rejects_out_of_range() {
        let kwargs = ServerKwargs::new().with("port", 70000);
        assert_eq!(kwargs.port(), None);
    }

    #[tokio::test]
    async fn test_custom_server_receives_verbatim_kwargs() {
        let (tx, rx) = std::sync::mpsc::channel();
        let backend = ServerBackend::custom("probe", move |kwargs, ctx| {
            let _ = tx.send((kwargs, ctx.port));
            Ok(())
        });

        let kwargs = ServerKwargs::new().with("port", 6001).with("threaded", true);
        let ctx = LaunchContext {
            port: 6001,
            python: PathBuf::from("python3"),
            app_dir: None,
            keep_alive_file: None,
            stop: StopSignal::new(),
            keep_alive: KeepAlive::new(),
        };

        let unit = backend.launch(kwargs.clone(), ctx).await.unwrap();
        assert_eq!(unit.kind(), "thread");
        assert!(unit.join(Duration::from_secs(2)).await);

        let (seen, port) = rx.recv().unwrap();
        assert_eq!(seen, kwargs);
        assert_eq!(port, 6001);
    }
}
