//! Subprocess execution.
//!
//! Package managers and init scripts run synchronously with a deadline.
//! Output is drained on reader threads while the child runs, so chatty
//! commands such as `apt-get install` cannot stall on a full pipe.

use std::io::Read;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{CommandErrorKind, ConvergeError};

/// Interval between exit checks while waiting on a child.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long output may keep flowing after the child exits. A daemon
/// started by an init script can inherit the pipes and hold them open.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Result of a subprocess execution.
#[derive(Debug, Clone)]
pub struct SubprocessResult {
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Builder for subprocess execution.
pub struct SubprocessBuilder {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    timeout: Duration,
    capture_output: bool,
}

impl SubprocessBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: Duration::from_secs(60),
            capture_output: true,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send stdout and stderr to `/dev/null`. Needed for commands that leave
    /// a daemon behind, which would otherwise inherit and hold the pipes.
    pub fn discard_output(mut self) -> Self {
        self.capture_output = false;
        self
    }

    /// Run to completion or until the timeout, whichever comes first.
    ///
    /// A process exceeding the timeout is killed and reaped, and a timeout
    /// error is returned. A non-zero exit is not an error here; callers
    /// inspect [`SubprocessResult::success`].
    pub fn run(self) -> Result<SubprocessResult, ConvergeError> {
        debug!(
            program = %self.program,
            args = ?self.args,
            timeout_secs = self.timeout.as_secs(),
            "Executing subprocess"
        );

        let output = || {
            if self.capture_output {
                Stdio::piped()
            } else {
                Stdio::null()
            }
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output())
            .spawn()
            .map_err(|e| {
                ConvergeError::execution_failed(format!("Failed to spawn {}: {}", self.program, e))
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let start = Instant::now();

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() > self.timeout => {
                    warn!(
                        program = %self.program,
                        timeout_secs = self.timeout.as_secs(),
                        "Process timed out, killing"
                    );
                    kill_and_reap(&mut child);
                    return Err(ConvergeError::Command {
                        kind: CommandErrorKind::Timeout {
                            timeout_secs: self.timeout.as_secs(),
                        },
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill_and_reap(&mut child);
                    return Err(ConvergeError::execution_failed(format!(
                        "Failed to check status of {}: {}",
                        self.program, e
                    )));
                }
            }
        };

        let result = SubprocessResult {
            success: status.success(),
            exit_code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        debug!(
            program = %self.program,
            success = result.success,
            exit_code = ?result.exit_code,
            duration_ms = start.elapsed().as_millis(),
            "Subprocess completed"
        );
        Ok(result)
    }
}

/// Pipe readers: stdout and stderr are both drained the same way.
trait Pipe: Read + Send + 'static {}
impl Pipe for ChildStdout {}
impl Pipe for ChildStderr {}

fn drain<P: Pipe>(pipe: Option<P>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf) {
                debug!(error = %e, "Failed to read subprocess output");
            }
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(handle) = handle else {
        return String::new();
    };

    let deadline = Instant::now() + DRAIN_GRACE;
    while !handle.is_finished() {
        if Instant::now() > deadline {
            debug!("Output pipe still held open after exit, not waiting for it");
            return String::new();
        }
        thread::sleep(POLL_INTERVAL);
    }

    handle
        .join()
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(error = %e, "Failed to kill process");
    }
    let _ = child.wait();
}

/// Run a command with the given arguments and timeout.
pub fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<SubprocessResult, ConvergeError> {
    SubprocessBuilder::new(program)
        .args(args.iter().copied())
        .timeout(timeout)
        .run()
}

/// Run a command with environment variables.
pub fn run_command_with_env(
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
    timeout: Duration,
) -> Result<SubprocessResult, ConvergeError> {
    let mut builder = SubprocessBuilder::new(program)
        .args(args.iter().copied())
        .timeout(timeout);

    for (key, value) in env {
        builder = builder.env(key, value);
    }

    builder.run()
}

/// Run a shell script through `sh -c`.
///
/// Service commands are shell strings (`setsid ...; timeout 60 ...`), so
/// they cannot be exec'd directly.
pub fn run_shell(script: &str, timeout: Duration) -> Result<SubprocessResult, ConvergeError> {
    SubprocessBuilder::new("sh")
        .arg("-c")
        .arg(script)
        .timeout(timeout)
        .run()
}

/// Run a service lifecycle script through `sh -c` with output discarded.
///
/// Start and restart scripts leave the broker running detached, and it
/// would keep captured pipes open for its whole lifetime.
pub fn run_service_script(
    script: &str,
    timeout: Duration,
) -> Result<SubprocessResult, ConvergeError> {
    SubprocessBuilder::new("sh")
        .arg("-c")
        .arg(script)
        .timeout(timeout)
        .discard_output()
        .run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_echo() {
        let result = run_command("echo", &["hello", "world"], Duration::from_secs(5)).unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello world");
    }

    #[test]
    fn test_run_false_command() {
        let result = run_command("false", &[], Duration::from_secs(5)).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
    }

    #[test]
    fn test_run_with_env() {
        let result = run_command_with_env(
            "sh",
            &["-c", "echo $DEBIAN_FRONTEND"],
            &[("DEBIAN_FRONTEND", "noninteractive")],
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(result.success);
        assert_eq!(result.stdout.trim(), "noninteractive");
    }

    #[test]
    fn test_run_shell_sequence() {
        let result = run_shell("echo one; echo two >&2; true", Duration::from_secs(5)).unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "one");
        assert_eq!(result.stderr.trim(), "two");
    }

    #[test]
    fn test_large_output_does_not_block() {
        // well past a pipe buffer
        let result = run_shell(
            "i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done",
            Duration::from_secs(30),
        )
        .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.lines().count(), 20000);
    }

    #[test]
    fn test_service_script_does_not_wait_on_background_child() {
        let start = Instant::now();
        let result =
            run_service_script("sleep 5 & echo started; exit 0", Duration::from_secs(10)).unwrap();

        assert!(result.success);
        assert!(result.stdout.is_empty());
        assert!(start.elapsed() < DRAIN_GRACE);
    }

    #[test]
    fn test_service_script_reports_failure() {
        let result = run_service_script("exit 3", Duration::from_secs(5)).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
    }

    #[test]
    fn test_nonexistent_command() {
        let result = run_command("nonexistent_command_12345", &[], Duration::from_secs(5));
        assert!(result.is_err());
    }

    #[test]
    fn test_timeout_kills_process() {
        let result = run_command("sleep", &["5"], Duration::from_millis(200));
        assert!(matches!(
            result,
            Err(ConvergeError::Command {
                kind: CommandErrorKind::Timeout { .. }
            })
        ));
    }
}
