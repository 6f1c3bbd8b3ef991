use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Exit code reported for a timed-out session in places that need a plain
/// integer (tables, summaries). Matches coreutils `timeout`.
pub const TIMED_OUT_EXIT_CODE: i32 = 124;

/// Sentinel for sessions that never produced a process exit status.
pub const NO_PROCESS_EXIT_CODE: i32 = -1;

/// Bytes of transcript kept inline in a `SessionResult`.
pub const LOG_TAIL_BYTES: usize = 10 * 1024;

// ---------------------------------------------------------------------------
// SessionExit
// ---------------------------------------------------------------------------

/// How a session ended. A timed-out session never carries the process's own
/// exit code: once the deadline passes the process is killed and whatever it
/// reports afterwards is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionExit {
    Exited { code: i32 },
    /// Terminated by a signal it did not receive from us.
    Signaled,
    TimedOut { after_secs: u64 },
    SpawnFailed { reason: String },
    /// Never started: another session for the same scenario was in flight.
    Rejected { reason: String },
}

impl SessionExit {
    pub fn code(&self) -> i32 {
        match self {
            SessionExit::Exited { code } => *code,
            SessionExit::TimedOut { .. } => TIMED_OUT_EXIT_CODE,
            SessionExit::Signaled
            | SessionExit::SpawnFailed { .. }
            | SessionExit::Rejected { .. } => NO_PROCESS_EXIT_CODE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SessionExit::Exited { code: 0 })
    }

    pub fn label(&self) -> String {
        match self {
            SessionExit::Exited { code } => format!("exit {code}"),
            SessionExit::Signaled => "killed by signal".to_string(),
            SessionExit::TimedOut { after_secs } => format!("timed out after {after_secs}s"),
            SessionExit::SpawnFailed { reason } => format!("spawn failed: {reason}"),
            SessionExit::Rejected { reason } => format!("rejected: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub scenario_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub exit: SessionExit,
    /// Tail of the combined stdout/stderr transcript.
    pub log_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl SessionResult {
    /// A result for a session that never got a process.
    pub fn not_started(scenario_id: impl Into<String>, exit: SessionExit) -> Self {
        let now = Utc::now();
        Self {
            scenario_id: scenario_id.into(),
            started_at: now,
            ended_at: now,
            exit,
            log_output: String::new(),
            log_file: None,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds().max(0)
    }
}

// ---------------------------------------------------------------------------
// RunRecord
// ---------------------------------------------------------------------------

/// Everything persisted to one `benchmark-results-*` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub prompt: String,
    pub parallelism: usize,
    pub results: Vec<SessionResult>,
}

/// Keep at most `max` bytes from the end of `s`, on a char boundary.
pub fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
