//! Wire messages exchanged with workers (one JSON object per line) and the
//! events fed to the dispatch loop.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parent → worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParentMessage {
    Execute {
        task_id: Uuid,
        action: String,
        params: serde_json::Value,
    },
    Shutdown,
}

/// Worker → parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Ready,
    TaskCompleted {
        task_id: Uuid,
        #[serde(default)]
        result: serde_json::Value,
    },
    TaskFailed {
        task_id: Uuid,
        error: String,
    },
    /// Ask the parent to record `key = value` in the shared state file.
    StateUpdate {
        key: String,
        value: serde_json::Value,
    },
    Log {
        message: String,
    },
}

/// Everything the dispatch loop reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    FileChanged { path: String },
    Worker { agent: String, message: WorkerMessage },
    WorkerExited { agent: String, code: Option<i32> },
    Tick,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_wire_format() {
        let id = Uuid::nil();
        let msg = ParentMessage::Execute {
            task_id: id,
            action: "lint_file".into(),
            params: serde_json::json!({"file": "src/App.jsx"}),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "execute");
        assert_eq!(json["action"], "lint_file");
        assert_eq!(json["params"]["file"], "src/App.jsx");
    }

    #[test]
    fn worker_messages_parse() {
        let ready: WorkerMessage = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, WorkerMessage::Ready);

        let done: WorkerMessage = serde_json::from_str(
            r#"{"type":"task_completed","task_id":"00000000-0000-0000-0000-000000000000"}"#,
        )
        .unwrap();
        assert!(matches!(
            done,
            WorkerMessage::TaskCompleted { result: serde_json::Value::Null, .. }
        ));
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(serde_json::from_str::<WorkerMessage>(r#"{"type":"heartbeat"}"#).is_err());
    }
}
