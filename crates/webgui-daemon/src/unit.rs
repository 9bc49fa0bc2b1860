//! Execution unit handle: one interface over server processes and threads

use std::time::Duration;

use webgui_core::prelude::*;

use crate::port::kill_port;
use crate::process::ManagedProcess;
use crate::thread::{ServerThread, ThreadOutcome};

/// An independently scheduled unit running a server
#[derive(Debug)]
pub enum ExecutionUnit {
    /// Separate OS process; can be killed unconditionally
    Process(ManagedProcess),
    /// Thread in this process; stopped cooperatively, port reclaimed by signal
    Thread(ServerThread),
}

/// How an execution unit ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitExit {
    Process { code: Option<i32> },
    Thread(ThreadOutcome),
}

impl UnitExit {
    /// Exit code for processes, 0/1 for threads that returned/failed
    pub fn code(&self) -> Option<i32> {
        match self {
            UnitExit::Process { code } => *code,
            UnitExit::Thread(ThreadOutcome::Returned) => Some(0),
            UnitExit::Thread(_) => Some(1),
        }
    }
}

impl ExecutionUnit {
    pub fn is_alive(&self) -> bool {
        match self {
            ExecutionUnit::Process(p) => p.is_running(),
            ExecutionUnit::Thread(t) => !t.has_finished(),
        }
    }

    /// Wait for the unit to end on its own
    pub async fn wait(&self) -> UnitExit {
        match self {
            ExecutionUnit::Process(p) => UnitExit::Process { code: p.wait().await },
            ExecutionUnit::Thread(t) => UnitExit::Thread(t.wait().await),
        }
    }

    /// Wait at most `timeout`. Returns `true` once the unit is gone.
    pub async fn join(&self, timeout: Duration) -> bool {
        match self {
            ExecutionUnit::Process(p) => p.join(timeout).await,
            ExecutionUnit::Thread(t) => t.join(timeout).await,
        }
    }

    /// Stop the unit.
    ///
    /// Processes get an unconditional kill. Threads get their stop signal
    /// raised and whichever process holds `port` is sent a termination signal.
    pub async fn terminate(&mut self, port: u16) {
        match self {
            ExecutionUnit::Process(p) => {
                info!("Killing server process {:?}", p.id());
                p.kill();
            }
            ExecutionUnit::Thread(t) => {
                info!("Stopping server thread {}, reclaiming port {}", t.name(), port);
                t.request_stop();
                kill_port(port).await;
            }
        }
    }

    /// Whether the port still needs sweeping once the unit is joined.
    ///
    /// Thread units reclaim it in [`terminate`](Self::terminate); a killed
    /// process may leave children bound to it.
    pub fn needs_port_sweep(&self) -> bool {
        matches!(self, ExecutionUnit::Process(_))
    }

    /// Pid of the unit if it is a separate process
    pub fn pid(&self) -> Option<u32> {
        match self {
            ExecutionUnit::Process(p) => p.id(),
            ExecutionUnit::Thread(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionUnit::Process(_) => "process",
            ExecutionUnit::Thread(_) => "thread",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::StopSignal;

    #[test]
    fn test_unit_exit_codes() {
        assert_eq!(UnitExit::Process { code: Some(3) }.code(), Some(3));
        assert_eq!(UnitExit::Thread(ThreadOutcome::Returned).code(), Some(0));
        assert_eq!(UnitExit::Thread(ThreadOutcome::Panicked).code(), Some(1));
    }

    #[tokio::test]
    async fn test_thread_unit_terminate_raises_stop() {
        let stop = StopSignal::new();
        let seen = stop.clone();
        let thread = ServerThread::spawn("unit-thread", stop, move || {
            while !seen.is_raised() {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        })
        .unwrap();
        let mut unit = ExecutionUnit::Thread(thread);
        assert!(unit.is_alive());
        assert_eq!(unit.kind(), "thread");
        assert_eq!(unit.pid(), None);
        assert!(!unit.needs_port_sweep());

        let port = crate::port::free_port().unwrap();
        unit.terminate(port).await;

        assert!(unit.join(Duration::from_secs(2)).await);
        assert!(!unit.is_alive());
        assert_eq!(unit.wait().await, UnitExit::Thread(ThreadOutcome::Returned));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_unit_terminate_kills() {
        use crate::process::ProcessCommand;

        let process =
            ManagedProcess::spawn("unit-proc", &ProcessCommand::new("sh").args(["-c", "sleep 60"]))
                .unwrap();
        let mut unit = ExecutionUnit::Process(process);
        assert!(unit.pid().is_some());
        assert!(unit.needs_port_sweep());

        unit.terminate(0).await;

        assert!(unit.join(Duration::from_secs(5)).await);
        assert!(!unit.is_alive());
    }
}
