//! Loopback port allocation and port-based process termination

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use tokio::process::Command;
use webgui_core::prelude::*;

/// Address every server is bound to and every browser is pointed at
pub const LOOPBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Obtain a currently unused TCP port on the loopback interface.
///
/// Binds a transient listener to port 0, reads back the OS-assigned port and
/// releases the listener. Another process may grab the port between release
/// and reuse; for a single local desktop session that window is accepted.
pub fn free_port() -> Result<u16> {
    let listener = TcpListener::bind(SocketAddrV4::new(LOOPBACK, 0))
        .map_err(|e| Error::port_allocation(e.to_string()))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::port_allocation(e.to_string()))?
        .port();
    drop(listener);

    debug!("Allocated free port {}", port);
    Ok(port)
}

/// `http://127.0.0.1:<port>` without a trailing slash
pub fn local_url(port: u16) -> String {
    format!("http://{}:{}", LOOPBACK, port)
}

/// Whether nothing is currently listening on `port` on loopback
pub fn port_is_free(port: u16) -> bool {
    TcpListener::bind(SocketAddrV4::new(LOOPBACK, port)).is_ok()
}

/// Terminate every process (other than this one) listening on `port`.
///
/// Returns the pids that were signalled. Lookup or signal failures are logged
/// and skipped; an in-process listener is left alone since signalling our own
/// pid would take the caller down with it.
pub async fn kill_port(port: u16) -> Vec<u32> {
    let own_pid = std::process::id();
    let pids = match listening_pids(port).await {
        Ok(pids) => pids,
        Err(e) => {
            warn!("Could not list processes on port {}: {}", port, e);
            return Vec::new();
        }
    };

    let mut killed = Vec::new();
    for pid in pids {
        if pid == own_pid {
            debug!(
                "Port {} is held by this process; abandoning in-process listener",
                port
            );
            continue;
        }

        debug!("Terminating PID {} on port {}", pid, port);
        match terminate_pid(pid).await {
            Ok(()) => killed.push(pid),
            Err(e) => debug!("Failed to terminate {}: {}", pid, e),
        }
    }

    if !killed.is_empty() {
        info!("Terminated {:?} holding port {}", killed, port);
    }
    killed
}

/// List pids with a listening socket on `port`
async fn listening_pids(port: u16) -> Result<Vec<u32>> {
    #[cfg(unix)]
    {
        let output = Command::new("lsof")
            .args(["-t", &format!("-iTCP:{}", port), "-sTCP:LISTEN"])
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            // lsof exits 1 when nothing matches
            Ok(output) => Ok(parse_lsof_pids(&String::from_utf8_lossy(&output.stdout))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("lsof not available, skipping port sweep");
                Ok(Vec::new())
            }
            Err(e) => Err(Error::process(format!("Failed to run lsof: {}", e))),
        }
    }

    #[cfg(windows)]
    {
        let output = Command::new("netstat")
            .args(["-ano", "-p", "TCP"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::process(format!("Failed to run netstat: {}", e)))?;

        Ok(parse_netstat_pids(
            &String::from_utf8_lossy(&output.stdout),
            port,
        ))
    }
}

/// Parse `lsof -t` output: one pid per line
pub(crate) fn parse_lsof_pids(output: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Parse `netstat -ano` output for LISTENING sockets on `port`
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn parse_netstat_pids(output: &str, port: u16) -> Vec<u32> {
    static LISTENING: OnceLock<Regex> = OnceLock::new();
    let re = LISTENING.get_or_init(|| {
        Regex::new(r"^\s*TCP\s+\S+:(\d+)\s+\S+\s+LISTENING\s+(\d+)\s*$")
            .expect("netstat pattern is valid")
    });

    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| re.captures(line))
        .filter(|caps| caps[1].parse::<u16>().ok() == Some(port))
        .filter_map(|caps| caps[2].parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Ask a process to terminate (SIGTERM on Unix, `taskkill /F` on Windows)
async fn terminate_pid(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| Error::process(format!("pid {} out of range", pid)))?;
        kill(Pid::from_raw(raw), Signal::SIGTERM)
            .map_err(|e| Error::process(format!("kill -TERM {}: {}", pid, e)))
    }

    #[cfg(windows)]
    {
        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::process(format!("Failed to run taskkill: {}", e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::process(format!("taskkill {} returned {}", pid, status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_port_is_bindable() {
        let port = free_port().unwrap();
        assert_ne!(port, 0);
        assert!(port_is_free(port));
    }

    #[test]
    fn test_sequential_ports_are_distinct() {
        // Hold each listener so the OS cannot hand the same port out twice
        let mut held = Vec::new();
        let mut ports = std::collections::HashSet::new();
        for _ in 0..8 {
            let port = free_port().unwrap();
            held.push(TcpListener::bind(SocketAddrV4::new(LOOPBACK, port)).unwrap());
            assert!(ports.insert(port), "port {} allocated twice", port);
        }
    }

    #[test]
    fn test_local_url_has_no_trailing_slash() {
        assert_eq!(local_url(5000), "http://127.0.0.1:5000");
    }

    #[test]
    fn test_port_is_free_false_while_bound() {
        let listener = TcpListener::bind(SocketAddrV4::new(LOOPBACK, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!port_is_free(port));
        drop(listener);
        assert!(port_is_free(port));
    }

    #[test]
    fn test_parse_lsof_pids() {
        let out = "1234\n  5678 \n\nnot-a-pid\n1234\n";
        assert_eq!(parse_lsof_pids(out), vec![1234, 5678]);
    }

    #[test]
    fn test_parse_netstat_pids_filters_port_and_state() {
        let out = "\
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    127.0.0.1:5000         0.0.0.0:0              LISTENING       4242
  TCP    127.0.0.1:50001        0.0.0.0:0              LISTENING       1111
  TCP    127.0.0.1:5000         127.0.0.1:61000        ESTABLISHED     4242
  TCP    [::1]:5000             [::]:0                 LISTENING       4243
";
        assert_eq!(parse_netstat_pids(out, 5000), vec![4242, 4243]);
        assert!(parse_netstat_pids(out, 6000).is_empty());
    }

    #[tokio::test]
    async fn test_kill_port_skips_own_listener() {
        let listener = TcpListener::bind(SocketAddrV4::new(LOOPBACK, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let killed = kill_port(port).await;

        assert!(killed.is_empty());
        assert!(!port_is_free(port));
    }
}
