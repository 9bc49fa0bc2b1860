//! OS signal handling for session shutdown

use tokio::task::JoinHandle;
use webgui_core::prelude::*;
use webgui_core::ShutdownReason;

use crate::session::SessionHandle;

/// Spawn a task that turns the first termination signal into a shutdown trigger
pub fn spawn_signal_handler(handle: SessionHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        match next_signal().await {
            Ok(name) => {
                info!("{} received, stopping session on port {}", name, handle.port());
                handle.trigger(ShutdownReason::Interrupted);
            }
            // Without a listener the other triggers still end the session
            Err(e) => warn!("{}", e),
        }
    })
}

/// Resolves with the name of the first termination signal
#[cfg(unix)]
async fn next_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let listen = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| Error::signal(format!("cannot listen for {}: {}", name, e)))
    };
    let mut sigint = listen(SignalKind::interrupt(), "SIGINT")?;
    let mut sigterm = listen(SignalKind::terminate(), "SIGTERM")?;

    Ok(tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    })
}

#[cfg(windows)]
async fn next_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::signal(format!("cannot listen for Ctrl+C: {}", e)))?;
    Ok("Ctrl+C")
}
