use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task.
///
/// Transitions: `Queued → Started → Completed | Failed`. A `Started` task
/// that outlives the task timeout is re-dispatched (back through `Started`
/// with a fresh deadline) until its retries run out, then it is `Failed`.
/// A `Queued` task whose worker never becomes ready fails after the same
/// timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Started,
    Completed { result: serde_json::Value },
    Failed { reason: String },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed { .. } | TaskStatus::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Started => "started",
            TaskStatus::Completed { .. } => "completed",
            TaskStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub agent_name: String,
    pub action: String,
    pub params: serde_json::Value,
    pub status: TaskStatus,
    /// Number of times `execute` has been sent for this task.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        agent_name: impl Into<String>,
        action: impl Into<String>,
        params: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            agent_name: agent_name.into(),
            action: action.into(),
            params,
            status: TaskStatus::Queued,
            attempts: 0,
            created_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub(crate) fn mark_started(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Started;
        self.attempts += 1;
        self.started_at = Some(now);
    }

    pub(crate) fn finish(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.finished_at = Some(now);
    }

    /// Seconds since the last dispatch, if started.
    pub fn running_for(&self, now: DateTime<Utc>) -> Option<i64> {
        match (&self.status, self.started_at) {
            (TaskStatus::Started, Some(at)) => Some((now - at).num_seconds()),
            _ => None,
        }
    }

    /// Seconds spent waiting for the worker to become ready.
    pub fn queued_for(&self, now: DateTime<Utc>) -> Option<i64> {
        (self.status == TaskStatus::Queued).then(|| (now - self.created_at).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_queued() {
        let t = Task::new("linter", "lint_file", serde_json::json!({"file": "a.js"}), Utc::now());
        assert_eq!(t.status, TaskStatus::Queued);
        assert_eq!(t.attempts, 0);
        assert!(t.running_for(Utc::now()).is_none());
    }

    #[test]
    fn started_tracks_attempts_and_age() {
        let now = Utc::now();
        let mut t = Task::new("linter", "lint_file", serde_json::Value::Null, now);
        t.mark_started(now);
        t.mark_started(now);
        assert_eq!(t.attempts, 2);
        let later = now + chrono::Duration::seconds(30);
        assert_eq!(t.running_for(later), Some(30));
    }

    #[test]
    fn status_json_is_tagged() {
        let s = TaskStatus::Failed {
            reason: "timed out".into(),
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"type\":\"failed\""));
        assert!(s.is_terminal());
        assert!(!TaskStatus::Started.is_terminal());
    }
}
