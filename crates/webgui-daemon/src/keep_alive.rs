//! Shared keep-alive timestamp
//!
//! Written by whatever proves the UI is still in use (a server thread on each
//! request, a watchdog probe) and read by the watchdog. The lock is held for a
//! single read or write, never across an await.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Source of "now" for keep-alive bookkeeping
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Tokio's clock; follows paused time in tests
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Last time the session was seen alive
#[derive(Clone)]
pub struct KeepAlive {
    last: Arc<Mutex<Instant>>,
    clock: Arc<dyn Clock>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TokioClock))
    }

    /// Start the timestamp at `clock.now()`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            last: Arc::new(Mutex::new(now)),
            clock,
        }
    }

    /// Record activity now
    pub fn touch(&self) {
        let now = self.clock.now();
        match self.last.lock() {
            Ok(mut last) => *last = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    pub fn last_touch(&self) -> Instant {
        match self.last.lock() {
            Ok(last) => *last,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Time since the last touch, per this keep-alive's clock
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.last_touch())
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAlive")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FixedClock(Mutex<Instant>);

    impl FixedClock {
        fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn test_touch_resets_elapsed() {
        let clock = Arc::new(FixedClock(Mutex::new(Instant::now())));
        let keep_alive = KeepAlive::with_clock(clock.clone());

        clock.advance(Duration::from_secs(3));
        assert_eq!(keep_alive.elapsed(), Duration::from_secs(3));

        keep_alive.touch();
        assert_eq!(keep_alive.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_clones_share_timestamp() {
        let clock = Arc::new(FixedClock(Mutex::new(Instant::now())));
        let keep_alive = KeepAlive::with_clock(clock.clone());
        let writer = keep_alive.clone();

        clock.advance(Duration::from_secs(10));
        writer.touch();
        assert_eq!(keep_alive.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_clock_follows_paused_time() {
        let keep_alive = KeepAlive::new();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(keep_alive.elapsed() >= Duration::from_secs(2));
    }
}
