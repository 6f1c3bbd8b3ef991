//! Blocking `sh -c` execution with an optional timeout, used by the lint and
//! test checks.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Output is capped to this many bytes, keeping the tail.
const MAX_OUTPUT: usize = 10 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ShellOutcome {
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Combined stdout and stderr, trimmed and capped.
    pub output: String,
    pub duration_ms: u64,
}

impl ShellOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run `command` under `sh -c` in `cwd`.
///
/// Uses dedicated threads for stdout/stderr reading (avoiding pipe-buffer
/// deadlocks) and a waiter thread with `mpsc::recv_timeout` for the deadline.
/// `None` timeout means wait indefinitely. Spawn failures are returned as
/// `Err` so callers can tell "could not run" apart from "ran and failed".
pub fn run(command: &str, cwd: &Path, timeout: Option<Duration>) -> std::io::Result<ShellOutcome> {
    let start = Instant::now();
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let child_pid = child.id();

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || read_all(stdout_handle));
    let stderr_thread = std::thread::spawn(move || read_all(stderr_handle));

    let status = match timeout {
        None => child.wait()?,
        Some(dur) => {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = tx.send(child.wait());
            });
            match rx.recv_timeout(dur) {
                Ok(result) => result?,
                Err(_) => {
                    // The waiter thread unblocks once the killed process exits;
                    // reader threads see EOF on the closed pipes.
                    kill_process(child_pid);
                    return Ok(ShellOutcome {
                        exit_code: None,
                        timed_out: true,
                        output: format!("timed out after {}s", dur.as_secs()),
                        duration_ms: start.elapsed().as_millis() as u64,
                    });
                }
            }
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    Ok(ShellOutcome {
        exit_code: status.code(),
        timed_out: false,
        output: combine_output(&stdout, &stderr),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn read_all<R: Read>(handle: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut r) = handle {
        let _ = r.read_to_string(&mut buf);
    }
    buf
}

fn combine_output(stdout: &str, stderr: &str) -> String {
    let output = if stderr.is_empty() {
        stdout.to_string()
    } else if stdout.is_empty() {
        stderr.to_string()
    } else {
        format!("{stdout}\n{stderr}")
    };
    crate::session::tail(output.trim(), MAX_OUTPUT).to_string()
}

/// Terminate a process by PID using SIGKILL. Best-effort; errors are silently ignored.
fn kill_process(pid: u32) {
    let _ = Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_succeeds() {
        let out = run("true", Path::new("/tmp"), Some(Duration::from_secs(10))).unwrap();
        assert!(out.success());
        assert_eq!(out.exit_code, Some(0));
    }

    #[test]
    fn exit_code_is_preserved() {
        let out = run("exit 3", Path::new("/tmp"), None).unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, Some(3));
    }

    #[test]
    fn captures_both_streams() {
        let out = run("echo out; echo err >&2", Path::new("/tmp"), None).unwrap();
        assert!(out.output.contains("out"));
        assert!(out.output.contains("err"));
    }

    #[test]
    fn timeout_kills_process() {
        let out = run("sleep 60", Path::new("/tmp"), Some(Duration::from_millis(150))).unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
        assert!(out.output.contains("timed out"));
    }

    #[test]
    fn runs_in_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let out = run("cat marker.txt", dir.path(), None).unwrap();
        assert_eq!(out.output, "here");
    }

    #[test]
    fn missing_cwd_is_spawn_error() {
        let err = run("true", Path::new("/definitely/not/here"), None);
        assert!(err.is_err());
    }
}
