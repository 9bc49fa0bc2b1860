//! Command lines for the named framework adapters

use std::path::Path;
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;
use webgui_core::prelude::*;

use super::{LaunchContext, ServerBackend, ServerKwargs};
use crate::port::LOOPBACK;
use crate::process::ProcessCommand;

/// Python entry point used for socketio and keep-alive instrumented launches
pub const BOOTSTRAP: &str = include_str!("bootstrap.py");

/// Env var carrying the keep-alive file path to the bootstrap
pub const KEEPALIVE_FILE_ENV: &str = "WEBGUI_KEEPALIVE_FILE";

/// Env var carrying extra server kwargs (JSON) to the bootstrap
pub const SERVER_KWARGS_ENV: &str = "WEBGUI_SERVER_KWARGS";

/// Keys consumed by the adapters themselves
const RESERVED_KEYS: &[&str] = &["app", "port", "flask_socketio"];

/// Whether `import waitress` succeeds for `python`
pub async fn waitress_available(python: &Path, app_dir: Option<&Path>) -> bool {
    let mut cmd = Command::new(python);
    cmd.args(["-c", "import waitress"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(dir) = app_dir {
        cmd.current_dir(dir);
    }

    match cmd.status().await {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("Could not probe waitress with {}: {}", python.display(), e);
            false
        }
    }
}

/// Only plain flask and django launches choose between waitress and a dev server
pub(super) fn prefers_waitress(backend: &ServerBackend, ctx: &LaunchContext) -> bool {
    match backend {
        ServerBackend::Flask => !uses_bootstrap(backend, ctx),
        ServerBackend::Django => true,
        _ => false,
    }
}

fn uses_bootstrap(backend: &ServerBackend, ctx: &LaunchContext) -> bool {
    match backend {
        ServerBackend::FlaskSocketIo => true,
        ServerBackend::Flask | ServerBackend::FastApi => ctx.keep_alive_file.is_some(),
        _ => false,
    }
}

/// Render extra kwargs as `--key=value` options.
///
/// Underscores in keys become dashes; `true` is a bare flag, `false` and
/// `null` are dropped.
pub fn kwargs_to_options<'a, I>(extras: I) -> Vec<String>
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    extras
        .into_iter()
        .filter_map(|(key, value)| {
            let flag = format!("--{}", key.replace('_', "-"));
            match value {
                Value::Bool(true) => Some(flag),
                Value::Bool(false) | Value::Null => None,
                Value::String(s) => Some(format!("{}={}", flag, s)),
                other => Some(format!("{}={}", flag, other)),
            }
        })
        .collect()
}

/// Build the child-process command for a named adapter.
///
/// `waitress` says whether the production WSGI server is importable; it is
/// ignored by adapters that do not use it.
pub fn build_command(
    backend: &ServerBackend,
    kwargs: &ServerKwargs,
    ctx: &LaunchContext,
    waitress: bool,
) -> Result<ProcessCommand> {
    let app = kwargs
        .app()
        .ok_or_else(|| Error::missing_app(backend.name()))?
        .to_string();
    let port = kwargs.port().unwrap_or(ctx.port);

    let extras: Vec<(&String, &Value)> = kwargs
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .filter(|(key, _)| !(matches!(backend, ServerBackend::Flask) && key.as_str() == "debug"))
        .collect();

    let python = ProcessCommand::new(&ctx.python).current_dir(ctx.app_dir.clone());

    if uses_bootstrap(backend, ctx) {
        let extras_json: serde_json::Map<String, Value> = extras
            .iter()
            .map(|(k, v)| ((*k).clone(), (*v).clone()))
            .collect();

        let mut cmd = python
            .args(["-c", BOOTSTRAP])
            .arg(backend.name())
            .arg(app)
            .arg(port.to_string())
            .env(SERVER_KWARGS_ENV, Value::Object(extras_json).to_string());

        if let ServerBackend::FlaskSocketIo = backend {
            let socketio = kwargs
                .get("flask_socketio")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::config("flask_socketio requires a socketio import target"))?;
            cmd = cmd.arg(socketio);
        }
        if let Some(path) = &ctx.keep_alive_file {
            cmd = cmd.env(KEEPALIVE_FILE_ENV, path.to_string_lossy());
        }
        return Ok(cmd);
    }

    let options = kwargs_to_options(extras);
    let cmd = match backend {
        ServerBackend::Flask if waitress => waitress_command(python, &app, port, options),
        ServerBackend::Flask => python
            .args(["-m", "flask", "--app", app.as_str(), "run"])
            .args(["--host".to_string(), LOOPBACK.to_string()])
            .args(["--port".to_string(), port.to_string()])
            .args(options),
        ServerBackend::FastApi => python
            .args(["-m", "uvicorn", app.as_str()])
            .args(["--host".to_string(), LOOPBACK.to_string()])
            .args(["--port".to_string(), port.to_string()])
            .args(options),
        ServerBackend::Django if waitress => waitress_command(python, &app, port, options),
        ServerBackend::Django => python
            .args(["manage.py", "runserver"])
            .arg(format!("{}:{}", LOOPBACK, port))
            .args(options),
        ServerBackend::FlaskSocketIo | ServerBackend::Custom(_) => {
            return Err(Error::server(format!(
                "{} has no standalone command line",
                backend.name()
            )))
        }
    };
    Ok(cmd)
}

fn waitress_command(
    python: ProcessCommand,
    app: &str,
    port: u16,
    options: Vec<String>,
) -> ProcessCommand {
    python
        .args(["-m", "waitress"])
        .arg(format!("--host={}", LOOPBACK))
        .arg(format!("--port={}", port))
        .args(options)
        .arg(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keep_alive::KeepAlive;
    use crate::thread::StopSignal;
    use std::path::PathBuf;

    fn ctx() -> LaunchContext {
        LaunchContext {
            port: 5000,
            python: PathBuf::from("python3"),
            app_dir: Some(PathBuf::from("/srv/app")),
            keep_alive_file: None,
            stop: StopSignal::new(),
            keep_alive: KeepAlive::new(),
        }
    }

    fn kwargs() -> ServerKwargs {
        ServerKwargs::new().with("app", "main:app").with("port", 5123)
    }

    #[test]
    fn test_flask_prefers_waitress() {
        let cmd = build_command(&ServerBackend::Flask, &kwargs(), &ctx(), true).unwrap();
        assert_eq!(
            cmd.argv(),
            vec!["python3", "-m", "waitress", "--host=127.0.0.1", "--port=5123", "main:app"]
        );
        assert_eq!(cmd.current_dir, Some(PathBuf::from("/srv/app")));
    }

    #[test]
    fn test_flask_dev_server_fallback_drops_debug() {
        let kwargs = kwargs().with("debug", true).with("with_threads", true);
        let cmd = build_command(&ServerBackend::Flask, &kwargs, &ctx(), false).unwrap();
        assert_eq!(
            cmd.argv(),
            vec![
                "python3", "-m", "flask", "--app", "main:app", "run", "--host", "127.0.0.1",
                "--port", "5123", "--with-threads"
            ]
        );
    }

    #[test]
    fn test_fastapi_always_uvicorn() {
        let kwargs = kwargs().with("log_level", "warning").with("reload", false);
        let cmd = build_command(&ServerBackend::FastApi, &kwargs, &ctx(), true).unwrap();
        assert_eq!(
            cmd.argv(),
            vec![
                "python3", "-m", "uvicorn", "main:app", "--host", "127.0.0.1", "--port", "5123",
                "--log-level=warning"
            ]
        );
    }

    #[test]
    fn test_django_runserver_fallback() {
        let kwargs = ServerKwargs::new()
            .with("app", "mysite.wsgi:application")
            .with("port", 8000);
        let cmd = build_command(&ServerBackend::Django, &kwargs, &ctx(), false).unwrap();
        assert_eq!(
            cmd.argv(),
            vec!["python3", "manage.py", "runserver", "127.0.0.1:8000"]
        );

        let cmd = build_command(&ServerBackend::Django, &kwargs, &ctx(), true).unwrap();
        assert_eq!(cmd.argv().last().unwrap(), "mysite.wsgi:application");
        assert!(cmd.argv().contains(&"waitress".to_string()));
    }

    #[test]
    fn test_socketio_runs_bootstrap() {
        let kwargs = kwargs().with("flask_socketio", "main:socketio").with("debug", false);
        let cmd = build_command(&ServerBackend::FlaskSocketIo, &kwargs, &ctx(), false).unwrap();
        let argv = cmd.argv();
        assert_eq!(argv[1], "-c");
        assert_eq!(argv[2], BOOTSTRAP);
        assert_eq!(&argv[3..], ["flask_socketio", "main:app", "5123", "main:socketio"]);
        assert!(cmd
            .env
            .contains(&(SERVER_KWARGS_ENV.to_string(), r#"{"debug":false}"#.to_string())));
    }

    #[test]
    fn test_keep_alive_file_switches_flask_to_bootstrap() {
        let mut ctx = ctx();
        ctx.keep_alive_file = Some(PathBuf::from("/tmp/ka"));
        assert!(!prefers_waitress(&ServerBackend::Flask, &ctx));

        let cmd = build_command(&ServerBackend::Flask, &kwargs(), &ctx, true).unwrap();
        assert_eq!(cmd.argv()[2], BOOTSTRAP);
        assert!(cmd
            .env
            .contains(&(KEEPALIVE_FILE_ENV.to_string(), "/tmp/ka".to_string())));
    }

    #[test]
    fn test_missing_app_is_rejected() {
        let kwargs = ServerKwargs::new().with("port", 5000);
        let err = build_command(&ServerBackend::FastApi, &kwargs, &ctx(), false).unwrap_err();
        assert!(matches!(err, Error::MissingApp { .. }));
    }

    #[test]
    fn test_port_falls_back_to_context() {
        let kwargs = ServerKwargs::new().with("app", "main:app");
        let cmd = build_command(&ServerBackend::FastApi, &kwargs, &ctx(), false).unwrap();
        assert!(cmd.argv().contains(&"5000".to_string()));
    }

    #[test]
    fn test_kwargs_to_options() {
        let kwargs = ServerKwargs::new()
            .with("threads", 8)
            .with("url_scheme", "https")
            .with("ipv6", false)
            .with("expose_tracebacks", true)
            .with("ident", Value::Null);
        assert_eq!(
            kwargs_to_options(kwargs.iter()),
            vec!["--expose-tracebacks", "--threads=8", "--url-scheme=https"]
        );
    }

    #[test]
    fn test_bootstrap_knows_every_injectable_backend() {
        for backend in [
            ServerBackend::Flask,
            ServerBackend::FastApi,
            ServerBackend::FlaskSocketIo,
        ] {
            assert!(BOOTSTRAP.contains(&format!("\"{}\"", backend.name())));
        }
        assert!(BOOTSTRAP.contains(KEEPALIVE_FILE_ENV));
        assert!(BOOTSTRAP.contains(SERVER_KWARGS_ENV));
        assert!(BOOTSTRAP.contains("/webgui-keep-server-alive"));
    }
}
