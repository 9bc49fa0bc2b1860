//! Liveness watchdog
//!
//! Polls a [`KeepAlive`] at a fixed interval and reports the session as
//! abandoned once nothing has touched it for longer than the idle timeout.
//! Probes run on every tick and touch the keep-alive when they see a sign of
//! life, so a browser process or an instrumented framework can keep the
//! session open without sharing memory with it.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use webgui_core::prelude::*;
use webgui_daemon::{process_is_alive, KeepAlive};

/// A sign-of-life check run on each tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Alive while this pid is in the process table and not a zombie
    BrowserProcess(u32),
    /// Alive whenever the file's modification time has moved since the last tick
    KeepAliveFile(PathBuf),
}

/// Why the watchdog loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    Stale,
    Cancelled,
}

#[derive(Debug)]
pub struct Watchdog {
    keep_alive: KeepAlive,
    idle_timeout: Duration,
    poll_interval: Duration,
    probes: Vec<Probe>,
    last_mtime: Option<SystemTime>,
}

impl Watchdog {
    pub fn new(keep_alive: KeepAlive, idle_timeout: Duration) -> Self {
        Self {
            keep_alive,
            idle_timeout,
            poll_interval: idle_timeout,
            probes: Vec::new(),
            last_mtime: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// Nothing has touched the keep-alive for longer than the idle timeout
    pub fn is_stale(&self) -> bool {
        self.keep_alive.elapsed() > self.idle_timeout
    }

    /// Poll until stale or until `cancel` flips to `true` (or its sender is dropped)
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> WatchdogOutcome {
        debug!(
            "Watchdog started: idle_timeout={:?} poll_interval={:?} probes={:?}",
            self.idle_timeout, self.poll_interval, self.probes
        );

        loop {
            if *cancel.borrow() {
                return WatchdogOutcome::Cancelled;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        debug!("Watchdog cancelled");
                        return WatchdogOutcome::Cancelled;
                    }
                    continue;
                }
            }

            if self.poll_probes() {
                self.keep_alive.touch();
            }

            if self.is_stale() {
                info!(
                    "No keep-alive for {:?} (idle timeout {:?})",
                    self.keep_alive.elapsed(),
                    self.idle_timeout
                );
                return WatchdogOutcome::Stale;
            }
        }
    }

    /// Run every probe; `true` if any saw a sign of life
    fn poll_probes(&mut self) -> bool {
        let mut alive = false;
        for probe in &self.probes {
            match probe {
                Probe::BrowserProcess(pid) => {
                    if process_is_alive(*pid) {
                        alive = true;
                    } else {
                        trace!("Browser process {} is gone", pid);
                    }
                }
                Probe::KeepAliveFile(path) => {
                    let mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok();
                    if mtime.is_some() && mtime != self.last_mtime {
                        self.last_mtime = mtime;
                        alive = true;
                    }
                }
            }
        }
        alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_untouched_keep_alive_goes_stale_within_two_intervals() {
        let unit = Duration::from_secs(1);
        let keep_alive = KeepAlive::new();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let start = tokio::time::Instant::now();
        let outcome = Watchdog::new(keep_alive, unit).run(cancel_rx).await;

        assert_eq!(outcome, WatchdogOutcome::Stale);
        assert!(start.elapsed() <= unit * 2, "took {:?}", start.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touches_keep_session_alive() {
        let keep_alive = KeepAlive::new();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let watchdog = Watchdog::new(keep_alive.clone(), Duration::from_secs(1))
            .with_poll_interval(Duration::from_millis(250));
        let task = tokio::spawn(watchdog.run(cancel_rx));

        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(500)).await;
            keep_alive.touch();
        }
        assert!(!task.is_finished());

        cancel_tx.send(true).unwrap();
        assert_eq!(task.await.unwrap(), WatchdogOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_cancel_sender_stops_the_loop() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let watchdog = Watchdog::new(KeepAlive::new(), Duration::from_secs(60));
        let task = tokio::spawn(watchdog.run(cancel_rx));
        drop(cancel_tx);
        assert_eq!(task.await.unwrap(), WatchdogOutcome::Cancelled);
    }

    #[test]
    fn test_file_probe_detects_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.alive");
        let mut watchdog = Watchdog::new(KeepAlive::new(), Duration::from_secs(1))
            .with_probe(Probe::KeepAliveFile(path.clone()));

        assert!(!watchdog.poll_probes(), "missing file is not a sign of life");

        std::fs::write(&path, "1").unwrap();
        assert!(watchdog.poll_probes());
        assert!(!watchdog.poll_probes(), "unchanged file is not a sign of life");

        let later = SystemTime::now() + Duration::from_secs(5);
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(later).unwrap();
        assert!(watchdog.poll_probes());
    }

    #[test]
    fn test_process_probe() {
        let mut alive = Watchdog::new(KeepAlive::new(), Duration::from_secs(1))
            .with_probe(Probe::BrowserProcess(std::process::id()));
        assert!(alive.poll_probes());

        let mut gone = Watchdog::new(KeepAlive::new(), Duration::from_secs(1))
            .with_probe(Probe::BrowserProcess(u32::MAX - 1));
        assert!(!gone.poll_probes());
    }
}
