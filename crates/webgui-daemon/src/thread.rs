//! In-process server threads
//!
//! A thread cannot be killed from the outside. Stopping one means raising its
//! [`StopSignal`] (honoured only if the server polls it) and reclaiming the
//! port from whatever process holds it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use webgui_core::prelude::*;

/// Cooperative stop flag shared with a server thread
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    raised: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

/// How a server thread finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadOutcome {
    Returned,
    Failed(String),
    Panicked,
}

/// Handle to a server running on a dedicated OS thread
pub struct ServerThread {
    name: String,
    stop: StopSignal,
    finished: Arc<AtomicBool>,
    outcome: Arc<Mutex<Option<ThreadOutcome>>>,
    finish_notify: Arc<Notify>,
}

impl ServerThread {
    /// Run `body` on a new named thread
    pub fn spawn<F>(name: impl Into<String>, stop: StopSignal, body: F) -> Result<Self>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let name = name.into();
        let finished = Arc::new(AtomicBool::new(false));
        let outcome = Arc::new(Mutex::new(None));
        let finish_notify = Arc::new(Notify::new());

        let thread_finished = Arc::clone(&finished);
        let thread_outcome = Arc::clone(&outcome);
        let thread_notify = Arc::clone(&finish_notify);
        let thread_name = name.clone();

        std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(body));
                let finished_with = match result {
                    Ok(Ok(())) => {
                        info!("{} thread returned", thread_name);
                        ThreadOutcome::Returned
                    }
                    Ok(Err(e)) => {
                        error!("{} thread failed: {}", thread_name, e);
                        ThreadOutcome::Failed(e.to_string())
                    }
                    Err(_) => {
                        error!("{} thread panicked", thread_name);
                        ThreadOutcome::Panicked
                    }
                };

                if let Ok(mut slot) = thread_outcome.lock() {
                    *slot = Some(finished_with);
                }
                thread_finished.store(true, Ordering::Release);
                thread_notify.notify_waiters();
            })
            .map_err(|e| Error::process_spawn(name.clone(), e.to_string()))?;

        info!("Started {} thread", name);

        Ok(Self {
            name,
            stop,
            finished,
            outcome,
            finish_notify,
        })
    }

    /// Wait until the thread body has returned
    pub async fn wait(&self) -> ThreadOutcome {
        loop {
            let notified = self.finish_notify.notified();
            if self.has_finished() {
                return self.outcome().unwrap_or(ThreadOutcome::Returned);
            }
            notified.await;
        }
    }

    /// Wait at most `timeout`. Returns `true` if the thread has finished.
    pub async fn join(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    /// Raise the stop signal. The thread keeps running until it notices.
    pub fn request_stop(&self) {
        debug!("Raising stop signal for {} thread", self.name);
        self.stop.raise();
    }

    pub fn has_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn outcome(&self) -> Option<ThreadOutcome> {
        self.outcome.lock().ok().and_then(|o| o.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ServerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerThread")
            .field("name", &self.name)
            .field("finished", &self.has_finished())
            .field("stop_raised", &self.stop.is_raised())
            .finish()
    }
}
