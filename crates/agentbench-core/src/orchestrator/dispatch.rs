//! The orchestrator's state store and its pure message handler.
//!
//! `handle` never performs IO. It consumes the current state and one
//! [`Incoming`] event and returns the next state plus the side effects the
//! dispatch loop must carry out, in order.

use super::config::{RetryPolicy, Router};
use super::message::{Incoming, ParentMessage, WorkerMessage};
use super::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type SharedState = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Spawned, has not announced `ready` yet.
    Starting,
    Ready,
    Exited { code: Option<i32> },
}

/// Side effects requested by the handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Send {
        agent: String,
        message: ParentMessage,
    },
    /// Write the full shared state to disk.
    PersistState(SharedState),
    /// A task reached a terminal state and has left the live map.
    TaskFinished(Task),
    Notice {
        agent: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorState {
    /// Live tasks: queued or started. Terminal tasks are removed.
    pub tasks: BTreeMap<Uuid, Task>,
    pub workers: BTreeMap<String, WorkerStatus>,
    pub shared: SharedState,
    pub shutting_down: bool,
}

impl OrchestratorState {
    pub fn new(agents: impl IntoIterator<Item = String>, shared: SharedState) -> Self {
        Self {
            tasks: BTreeMap::new(),
            workers: agents
                .into_iter()
                .map(|a| (a, WorkerStatus::Starting))
                .collect(),
            shared,
            shutting_down: false,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn all_workers_exited(&self) -> bool {
        self.workers
            .values()
            .all(|w| matches!(w, WorkerStatus::Exited { .. }))
    }

    pub fn count(&self, status: &str) -> usize {
        self.tasks
            .values()
            .filter(|t| t.status.as_str() == status)
            .count()
    }
}

pub struct DispatchContext<'a> {
    pub router: &'a Router,
    pub policy: RetryPolicy,
    pub now: DateTime<Utc>,
}

pub fn handle(
    mut state: OrchestratorState,
    msg: Incoming,
    ctx: &DispatchContext<'_>,
) -> (OrchestratorState, Vec<Outgoing>) {
    let mut out = Vec::new();
    match msg {
        Incoming::FileChanged { path } => on_file_changed(&mut state, &path, ctx, &mut out),
        Incoming::Worker { agent, message } => {
            on_worker_message(&mut state, &agent, message, ctx, &mut out)
        }
        Incoming::WorkerExited { agent, code } => {
            state
                .workers
                .insert(agent.clone(), WorkerStatus::Exited { code });
            let reason = match code {
                Some(c) => format!("worker exited with code {c}"),
                None => "worker terminated by signal".to_string(),
            };
            let orphaned: Vec<Uuid> = state
                .tasks
                .values()
                .filter(|t| t.agent_name == agent)
                .map(|t| t.task_id)
                .collect();
            for id in orphaned {
                finish(&mut state, id, TaskStatus::Failed { reason: reason.clone() }, ctx.now, &mut out);
            }
        }
        Incoming::Tick => on_tick(&mut state, ctx, &mut out),
        Incoming::Shutdown => {
            state.shutting_down = true;
            for (agent, status) in &state.workers {
                if !matches!(status, WorkerStatus::Exited { .. }) {
                    out.push(Outgoing::Send {
                        agent: agent.clone(),
                        message: ParentMessage::Shutdown,
                    });
                }
            }
        }
    }
    (state, out)
}

fn on_file_changed(
    state: &mut OrchestratorState,
    path: &str,
    ctx: &DispatchContext<'_>,
    out: &mut Vec<Outgoing>,
) {
    if state.shutting_down {
        out.push(Outgoing::Notice {
            agent: None,
            message: format!("ignoring change to {path}: shutting down"),
        });
        return;
    }
    let matches = ctx.router.route(path);
    if matches.is_empty() {
        out.push(Outgoing::Notice {
            agent: None,
            message: format!("no agent matched {path}"),
        });
        return;
    }
    for (agent, action) in matches {
        let task = Task::new(
            agent,
            action,
            serde_json::json!({ "file": path }),
            ctx.now,
        );
        let id = task.task_id;
        state.tasks.insert(id, task);
        match state.workers.get(agent).copied() {
            Some(WorkerStatus::Ready) => dispatch(state, id, ctx.now, out),
            Some(WorkerStatus::Starting) => {}
            Some(WorkerStatus::Exited { .. }) | None => finish(
                state,
                id,
                TaskStatus::Failed {
                    reason: format!("worker '{agent}' is not running"),
                },
                ctx.now,
                out,
            ),
        }
    }
}

fn on_worker_message(
    state: &mut OrchestratorState,
    agent: &str,
    message: WorkerMessage,
    ctx: &DispatchContext<'_>,
    out: &mut Vec<Outgoing>,
) {
    match message {
        WorkerMessage::Ready => {
            state.workers.insert(agent.to_string(), WorkerStatus::Ready);
            let mut queued: Vec<&Task> = state
                .tasks
                .values()
                .filter(|t| t.agent_name == agent && t.status == TaskStatus::Queued)
                .collect();
            queued.sort_by_key(|t| t.created_at);
            let ids: Vec<Uuid> = queued.iter().map(|t| t.task_id).collect();
            for id in ids {
                dispatch(state, id, ctx.now, out);
            }
        }
        WorkerMessage::TaskCompleted { task_id, result } => {
            report(state, agent, task_id, TaskStatus::Completed { result }, ctx, out)
        }
        WorkerMessage::TaskFailed { task_id, error } => {
            report(state, agent, task_id, TaskStatus::Failed { reason: error }, ctx, out)
        }
        WorkerMessage::StateUpdate { key, value } => {
            state.shared.insert(key, value);
            out.push(Outgoing::PersistState(state.shared.clone()));
        }
        WorkerMessage::Log { message } => out.push(Outgoing::Notice {
            agent: Some(agent.to_string()),
            message,
        }),
    }
}

/// Apply a worker's completion report, ignoring reports for tasks the
/// worker does not own or that already left the live map.
fn report(
    state: &mut OrchestratorState,
    agent: &str,
    task_id: Uuid,
    status: TaskStatus,
    ctx: &DispatchContext<'_>,
    out: &mut Vec<Outgoing>,
) {
    let owned = state
        .tasks
        .get(&task_id)
        .is_some_and(|t| t.agent_name == agent && t.status == TaskStatus::Started);
    if !owned {
        out.push(Outgoing::Notice {
            agent: Some(agent.to_string()),
            message: format!("ignoring {} report for unknown task {task_id}", status.as_str()),
        });
        return;
    }
    finish(state, task_id, status, ctx.now, out);
}

fn on_tick(state: &mut OrchestratorState, ctx: &DispatchContext<'_>, out: &mut Vec<Outgoing>) {
    let timeout = ctx.policy.task_timeout_secs;
    if timeout == 0 {
        return;
    }
    // A worker that never announces `ready` would hold its queue forever.
    let stranded: Vec<(Uuid, String)> = state
        .tasks
        .values()
        .filter(|t| t.queued_for(ctx.now).is_some_and(|s| s >= timeout as i64))
        .map(|t| (t.task_id, t.agent_name.clone()))
        .collect();
    for (id, agent) in stranded {
        finish(
            state,
            id,
            TaskStatus::Failed {
                reason: format!("worker '{agent}' not ready after {timeout}s"),
            },
            ctx.now,
            out,
        );
    }

    let overdue: Vec<(Uuid, u32)> = state
        .tasks
        .values()
        .filter(|t| t.running_for(ctx.now).is_some_and(|s| s >= timeout as i64))
        .map(|t| (t.task_id, t.attempts))
        .collect();

    for (id, attempts) in overdue {
        if attempts <= ctx.policy.max_task_retries {
            if let Some(t) = state.tasks.get(&id) {
                out.push(Outgoing::Notice {
                    agent: Some(t.agent_name.clone()),
                    message: format!(
                        "task {id} silent for {timeout}s, retrying (attempt {})",
                        attempts + 1
                    ),
                });
            }
            dispatch(state, id, ctx.now, out);
        } else {
            finish(
                state,
                id,
                TaskStatus::Failed {
                    reason: format!("timed out after {timeout}s ({attempts} attempt(s))"),
                },
                ctx.now,
                out,
            );
        }
    }
}

fn dispatch(state: &mut OrchestratorState, id: Uuid, now: DateTime<Utc>, out: &mut Vec<Outgoing>) {
    if let Some(task) = state.tasks.get_mut(&id) {
        task.mark_started(now);
        out.push(Outgoing::Send {
            agent: task.agent_name.clone(),
            message: ParentMessage::Execute {
                task_id: task.task_id,
                action: task.action.clone(),
                params: task.params.clone(),
            },
        });
    }
}

fn finish(
    state: &mut OrchestratorState,
    id: Uuid,
    status: TaskStatus,
    now: DateTime<Utc>,
    out: &mut Vec<Outgoing>,
) {
    if let Some(mut task) = state.tasks.remove(&id) {
        task.finish(status, now);
        out.push(Outgoing::TaskFinished(task));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
