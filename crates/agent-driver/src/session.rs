use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::process::AgentProcess;

// ─── Types ────────────────────────────────────────────────────────────────

/// Everything needed to launch one agent session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Identifies the session in the pool; at most one live session per key.
    pub key: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Working directory of the agent process.
    pub cwd: PathBuf,
    /// Written to the agent's stdin, newline-terminated.
    pub prompt: String,
    pub timeout: Duration,
}

/// How an agent process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessExit {
    Exited { code: i32 },
    /// Terminated by a signal it did not trap.
    Signaled,
    /// Killed by the driver once the session timeout elapsed.
    TimedOut { after: Duration },
    SpawnFailed { reason: String },
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub key: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub exit: ProcessExit,
    /// Interleaved stdout and `[stderr] `-prefixed stderr lines.
    pub transcript: String,
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Drive one agent session to completion.
///
/// Never fails: spawn errors and IO errors while waiting are folded into
/// [`ProcessExit::SpawnFailed`] so every request yields an outcome.
pub async fn run_session(req: &SessionRequest) -> SessionOutcome {
    let started_at = Utc::now();
    tracing::info!(key = %req.key, program = %req.program, cwd = %req.cwd.display(), "starting session");

    let (exit, transcript) = match AgentProcess::spawn(req).await {
        Err(e) => (
            ProcessExit::SpawnFailed {
                reason: e.to_string(),
            },
            String::new(),
        ),
        Ok(mut process) => {
            let exit = match process.wait(req.timeout).await {
                Ok(exit) => exit,
                Err(e) => {
                    process.kill().await;
                    ProcessExit::SpawnFailed {
                        reason: format!("lost track of process: {e}"),
                    }
                }
            };
            (exit, process.transcript())
        }
    };

    let ended_at = Utc::now();
    match &exit {
        ProcessExit::Exited { code: 0 } => tracing::info!(key = %req.key, "session finished"),
        ProcessExit::TimedOut { after } => {
            tracing::warn!(key = %req.key, after_secs = after.as_secs(), "session timed out; killed")
        }
        other => tracing::warn!(key = %req.key, exit = ?other, "session ended abnormally"),
    }

    SessionOutcome {
        key: req.key.clone(),
        started_at,
        ended_at,
        exit,
        transcript,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(key: &str, script: &str, timeout: Duration) -> SessionRequest {
        SessionRequest {
            key: key.into(),
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: vec![("AGENTBENCH_TEST".into(), "1".into())],
            cwd: std::env::temp_dir(),
            prompt: "add a reset button".into(),
            timeout,
        }
    }

    #[tokio::test]
    async fn prompt_reaches_stdin_and_output_is_captured() {
        let req = sh("a", "read line; echo \"got: $line\"; echo oops >&2", Duration::from_secs(10));
        let out = run_session(&req).await;
        assert_eq!(out.exit, ProcessExit::Exited { code: 0 });
        assert!(out.transcript.contains("got: add a reset button"));
        assert!(out.transcript.contains("[stderr] oops"));
        assert!(out.ended_at >= out.started_at);
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let out = run_session(&sh("a", "exit 3", Duration::from_secs(10))).await;
        assert_eq!(out.exit, ProcessExit::Exited { code: 3 });
    }

    #[tokio::test]
    async fn env_and_cwd_are_applied() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut req = sh("a", "echo $AGENTBENCH_TEST; pwd", Duration::from_secs(10));
        req.cwd = dir.path().to_path_buf();
        let out = run_session(&req).await;
        let lines: Vec<&str> = out.transcript.lines().collect();
        assert_eq!(lines[0], "1");
        let reported = std::fs::canonicalize(lines[1]).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let started = std::time::Instant::now();
        let out = run_session(&sh("a", "exec sleep 30", Duration::from_millis(300))).await;
        assert_eq!(
            out.exit,
            ProcessExit::TimedOut {
                after: Duration::from_millis(300)
            }
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn timeout_applies_while_prompt_is_unread() {
        let mut req = sh("a", "exec sleep 5", Duration::from_millis(300));
        req.prompt = "x".repeat(1024 * 1024);
        let started = std::time::Instant::now();
        let out = run_session(&req).await;
        assert!(matches!(out.exit, ProcessExit::TimedOut { .. }), "{:?}", out.exit);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let mut req = sh("a", "true", Duration::from_secs(1));
        req.program = "/nonexistent/agent-binary".into();
        let out = run_session(&req).await;
        assert!(matches!(out.exit, ProcessExit::SpawnFailed { .. }));
        assert!(out.transcript.is_empty());
    }
}
