//! Service command construction.
//!
//! The stock init script does not daemonize cleanly when run from a
//! non-interactive parent, so every start goes through `setsid` and is
//! followed by a readiness wait.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::NodeConfig;

/// Upper bound on `rabbitmqctl wait` after a start.
pub const READINESS_TIMEOUT_SECS: u64 = 60;

/// Lifecycle actions on the managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Enable,
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Enable => "enable",
        };
        f.write_str(name)
    }
}

/// Shell commands supervising the broker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub start: String,
    pub stop: String,
    pub restart: String,
    pub status: String,
    /// Pid file consulted by the manual status command, if any.
    pub pid_file: Option<PathBuf>,
}

impl ServiceDescriptor {
    /// Build the command set for `name` controlled by `init_script`.
    ///
    /// Pure construction. Callers must have checked that `status_broken`
    /// implies a pid file; without one the manual status command treats
    /// the broker as never running.
    pub fn build(name: &str, init_script: &Path, node: &NodeConfig) -> Self {
        let init = shell_quote(&init_script.to_string_lossy());
        let wait = wait_command(node.pid_file.as_deref());
        let start = format!("setsid {} start; {}", init, wait);

        let (stop, restart, status) = if node.status_broken {
            let pid_file = node
                .pid_file
                .as_deref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            (
                "rabbitmqctl stop".to_string(),
                format!("rabbitmqctl stop\nsetsid {} start\n{}", init, wait),
                manual_status_script(&pid_file),
            )
        } else {
            (
                format!("{} stop", init),
                format!("setsid {} restart\n{}", init, wait),
                format!("{} status", init),
            )
        };

        Self {
            name: name.to_string(),
            start,
            stop,
            restart,
            status,
            pid_file: node.pid_file.clone(),
        }
    }

    /// Command string for a lifecycle action. `Enable` is platform
    /// specific and has no command here.
    pub fn command_for(&self, action: ServiceAction) -> Option<&str> {
        match action {
            ServiceAction::Start => Some(&self.start),
            ServiceAction::Stop => Some(&self.stop),
            ServiceAction::Restart => Some(&self.restart),
            ServiceAction::Enable => None,
        }
    }
}

/// Readiness wait run after every start.
fn wait_command(pid_file: Option<&Path>) -> String {
    match pid_file {
        Some(path) => format!(
            "timeout {} rabbitmqctl wait {}",
            READINESS_TIMEOUT_SECS,
            shell_quote(&path.to_string_lossy())
        ),
        None => "sleep 1".to_string(),
    }
}

/// Status check for init scripts whose own `status` is unreliable.
///
/// Missing pid file, empty pid, and a dead process all report not running.
fn manual_status_script(pid_file: &str) -> String {
    format!(
        r#"pid_file={}
if test -f "$pid_file"; then
  pid=$(tr -d '[:space:]' < "$pid_file")
  if test "$pid" != "" && kill -0 "$pid" 2>/dev/null; then
    echo RabbitMQ running on PID $pid
    true
  else
    echo RabbitMQ not running
    false
  fi
else
  echo RabbitMQ not running
  false
fi"#,
        shell_quote(pid_file)
    )
}

/// Quote a value for POSIX `sh` using single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
