//! Toy multi-agent task orchestrator.
//!
//! File-change events are routed by glob pattern to long-lived worker
//! processes. Each match becomes a [`Task`] that moves through
//! `queued → started → completed | failed`. Workers report back over
//! JSON lines ([`message`]). The [`dispatch::handle`] function owns every
//! state transition and is free of IO, so the async loop that drives it
//! (in the CLI) only spawns processes, forwards lines and persists state.

pub mod config;
pub mod dispatch;
pub mod message;
pub mod pattern;
pub mod task;

pub use config::{AgentSpec, OrchestratorConfig, RetryPolicy, Router};
pub use dispatch::{handle, DispatchContext, OrchestratorState, Outgoing, SharedState, WorkerStatus};
pub use message::{Incoming, ParentMessage, WorkerMessage};
pub use pattern::GlobPattern;
pub use task::{Task, TaskStatus};

use crate::error::Result;
use crate::io::atomic_write;
use std::path::Path;

/// Load the shared state file. A missing file is an empty state.
pub fn load_shared_state(path: &Path) -> Result<SharedState> {
    if !path.exists() {
        return Ok(SharedState::new());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(SharedState::new());
    }
    Ok(serde_json::from_str(&data)?)
}

/// Replace the shared state file atomically.
pub fn persist_shared_state(path: &Path, state: &SharedState) -> Result<()> {
    let data = serde_json::to_vec_pretty(state)?;
    atomic_write(path, &data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_state_round_trips_through_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".agentbench/shared-state.json");
        assert!(load_shared_state(&path).unwrap().is_empty());

        let mut s = SharedState::new();
        s.insert("lastLint".into(), serde_json::json!({"ok": true}));
        persist_shared_state(&path, &s).unwrap();
        assert_eq!(load_shared_state(&path).unwrap(), s);
    }
}
