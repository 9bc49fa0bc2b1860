//! Test utilities for session-level tests
//!
//! Provides an in-process stand-in for a web server and, on Unix, stand-ins
//! for browser executables.

use std::io::{Read, Write};
use std::net::{SocketAddrV4, TcpListener};
use std::path::{Path, PathBuf};
use std::time::Duration;

use webgui_core::prelude::*;

use crate::port::LOOPBACK;
use crate::server::ServerBackend;

/// Custom backend answering every request with `ok` until stopped.
///
/// Each accepted connection touches the session keep-alive.
pub fn loopback_server(name: &str) -> ServerBackend {
    ServerBackend::custom(name, |_kwargs, ctx| {
        let listener = TcpListener::bind(SocketAddrV4::new(LOOPBACK, ctx.port))?;
        listener.set_nonblocking(true)?;

        while !ctx.stop.is_raised() {
            match listener.accept() {
                Ok((mut stream, _)) => {
                    ctx.keep_alive.touch();
                    let _ = stream.set_nonblocking(false);
                    let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf);
                    let _ = stream.write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                    );
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!("loopback server on port {} stopped", ctx.port);
        Ok(())
    })
}

/// Write an executable shell script named `name` into `dir`
#[cfg(unix)]
pub fn script(dir: &Path, name: &str, body: &str) -> std::io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
    let mut perms = std::fs::metadata(&path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms)?;
    Ok(path)
}

/// Fake browser that ignores its flags and exits after `secs` seconds
#[cfg(unix)]
pub fn fake_browser(dir: &Path, secs: f32) -> std::io::Result<PathBuf> {
    script(dir, "fake-browser", &format!("sleep {}\nexit 0", secs))
}

/// Fake browser that records its argv, one per line, into `record`
#[cfg(unix)]
pub fn recording_browser(dir: &Path, record: &Path) -> std::io::Result<PathBuf> {
    script(
        dir,
        "recording-browser",
        &format!("for a in \"$@\"; do echo \"$a\" >> '{}'; done\nexit 0", record.display()),
    )
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_browser_runs() {
        let dir = tempfile::tempdir().unwrap();
        let browser = fake_browser(dir.path(), 0.0).unwrap();
        let status = tokio::process::Command::new(&browser)
            .arg("--app=http://127.0.0.1:1")
            .status()
            .await
            .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_recording_browser_writes_args() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("argv.txt");
        let browser = recording_browser(dir.path(), &record).unwrap();
        tokio::process::Command::new(&browser)
            .args(["--no-first-run", "--app=x"])
            .status()
            .await
            .unwrap();
        let lines = std::fs::read_to_string(&record).unwrap();
        assert_eq!(lines, "--no-first-run\n--app=x\n");
    }
}
