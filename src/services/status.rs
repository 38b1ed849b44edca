//! Pid-file liveness probe.

use std::fmt;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::Serialize;
use tracing::debug;

/// Observed state of the broker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceStatus {
    Running { pid: i32 },
    NotRunning,
}

impl ServiceStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ServiceStatus::Running { .. })
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Running { pid } => write!(f, "RabbitMQ running on PID {}", pid),
            ServiceStatus::NotRunning => f.write_str("RabbitMQ not running"),
        }
    }
}

/// Probe the process named by a pid file with signal 0.
///
/// A missing or unreadable file, an empty or non-numeric pid, and a pid
/// with no live process all report [`ServiceStatus::NotRunning`].
pub fn probe_pid_file(pid_file: &Path) -> ServiceStatus {
    let content = match std::fs::read_to_string(pid_file) {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %pid_file.display(), error = %e, "Pid file not readable");
            return ServiceStatus::NotRunning;
        }
    };

    let pid = match content.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => pid,
        _ => {
            debug!(path = %pid_file.display(), "Pid file holds no usable pid");
            return ServiceStatus::NotRunning;
        }
    };

    match kill(Pid::from_raw(pid), None) {
        // EPERM: the process exists but belongs to another user.
        Ok(()) | Err(Errno::EPERM) => ServiceStatus::Running { pid },
        Err(_) => ServiceStatus::NotRunning,
    }
}
