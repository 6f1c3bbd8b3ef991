use crate::output::print_json;
use agent_driver::{WorkerEvent, WorkerProcess, WorkerSpec};
use agentbench_core::orchestrator::{
    self, handle, DispatchContext, Incoming, OrchestratorConfig, OrchestratorState, Outgoing,
    ParentMessage, Router, Task, TaskStatus, WorkerMessage,
};
use agentbench_core::paths;
use anyhow::Context;
use chrono::Utc;
use clap::Args;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// How long workers get to exit after `shutdown` before they are killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct OrchestrateArgs {
    /// Orchestrator config (default: <root>/orchestrator.yaml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// A changed file path to route; repeatable. More paths are read from
    /// stdin, one per line, until EOF.
    #[arg(long = "event", value_name = "PATH")]
    pub events: Vec<String>,

    /// Timer tick interval in milliseconds
    #[arg(long, default_value_t = 1000, hide = true)]
    pub tick_ms: u64,
}

/// Everything the dispatch loop drains, in arrival order.
enum LoopEvent {
    Dispatch(Incoming),
    /// Stdin reached EOF: shut down once no live tasks remain.
    InputClosed,
}

pub fn run(root: &Path, args: OrchestrateArgs, json: bool) -> anyhow::Result<()> {
    let config_path = match &args.config {
        Some(p) => super::from_cwd(p)?,
        None => paths::orchestrator_config_path(root),
    };
    let config = OrchestratorConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let router = Router::new(&config.agents)?;
    let state_path = paths::resolve(root, &config.state_file);
    let shared = orchestrator::load_shared_state(&state_path)
        .with_context(|| format!("failed to read {}", state_path.display()))?;

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(dispatch_loop(root, &config, &router, &state_path, shared, args));
    // The stdin reader may still be parked in a blocking read.
    rt.shutdown_background();
    let (finished, state) = outcome?;

    let completed = finished
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Completed { .. }))
        .count();
    let failed = finished.len() - completed;

    if json {
        return print_json(&serde_json::json!({
            "tasks": finished,
            "completed": completed,
            "failed": failed,
            "shared_state": state.shared,
        }));
    }
    println!("{completed} completed, {failed} failed");
    Ok(())
}

async fn dispatch_loop(
    root: &Path,
    config: &OrchestratorConfig,
    router: &Router,
    state_path: &Path,
    shared: orchestrator::SharedState,
    args: OrchestrateArgs,
) -> anyhow::Result<(Vec<Task>, OrchestratorState)> {
    let (tx, mut rx) = mpsc::channel::<LoopEvent>(256);

    // Workers
    let (worker_tx, mut worker_rx) = mpsc::channel::<WorkerEvent<WorkerMessage>>(256);
    let mut workers: HashMap<String, WorkerProcess<WorkerMessage>> = HashMap::new();
    for agent in &config.agents {
        let spec = WorkerSpec {
            name: agent.name.clone(),
            program: agent.command.clone(),
            args: agent.args.clone(),
            cwd: root.to_path_buf(),
        };
        match WorkerProcess::spawn(&spec, worker_tx.clone()) {
            Ok(w) => {
                workers.insert(agent.name.clone(), w);
            }
            Err(e) => {
                tracing::warn!(agent = %agent.name, error = %e, "failed to start worker");
                let _ = tx
                    .send(LoopEvent::Dispatch(Incoming::WorkerExited {
                        agent: agent.name.clone(),
                        code: None,
                    }))
                    .await;
            }
        }
    }
    drop(worker_tx);

    {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(ev) = worker_rx.recv().await {
                let incoming = match ev {
                    WorkerEvent::Message { agent, message } => Incoming::Worker { agent, message },
                    WorkerEvent::Exited { agent, code } => Incoming::WorkerExited { agent, code },
                    WorkerEvent::Malformed { agent, error } => {
                        tracing::warn!(agent = %agent, error = %error, "malformed worker message");
                        continue;
                    }
                    WorkerEvent::Stderr { agent, line } => {
                        tracing::debug!(agent = %agent, "{line}");
                        continue;
                    }
                };
                if tx.send(LoopEvent::Dispatch(incoming)).await.is_err() {
                    break;
                }
            }
        });
    }

    // Inputs: --event paths first, then stdin lines.
    {
        let tx = tx.clone();
        let events = args.events.clone();
        tokio::spawn(async move {
            for path in events {
                if tx
                    .send(LoopEvent::Dispatch(Incoming::FileChanged { path }))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let path = line.trim();
                if path.is_empty() {
                    continue;
                }
                let ev = LoopEvent::Dispatch(Incoming::FileChanged {
                    path: path.to_string(),
                });
                if tx.send(ev).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(LoopEvent::InputClosed).await;
        });
    }

    // Timer
    {
        let tx = tx.clone();
        let period = Duration::from_millis(args.tick_ms.max(10));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if tx.send(LoopEvent::Dispatch(Incoming::Tick)).await.is_err() {
                    break;
                }
            }
        });
    }

    // Ctrl-C
    {
        let tx = tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(LoopEvent::Dispatch(Incoming::Shutdown)).await;
            }
        });
    }
    drop(tx);

    let mut state = OrchestratorState::new(config.agents.iter().map(|a| a.name.clone()), shared);
    let policy = config.policy();
    let mut finished = Vec::new();
    let mut input_closed = false;
    let mut shutdown_at: Option<Instant> = None;
    let mut killed = false;

    tracing::info!(agents = config.agents.len(), "orchestrator started");

    while let Some(ev) = rx.recv().await {
        let mut next = match ev {
            LoopEvent::InputClosed => {
                input_closed = true;
                None
            }
            LoopEvent::Dispatch(msg) => Some(msg),
        };

        loop {
            if let Some(msg) = next.take() {
                let ctx = DispatchContext {
                    router,
                    policy,
                    now: Utc::now(),
                };
                let (after, out) = handle(state, msg, &ctx);
                state = after;
                for o in out {
                    apply(o, &mut workers, state_path, &mut finished).await;
                }
            }
            if input_closed && !state.shutting_down && state.is_idle() {
                next = Some(Incoming::Shutdown);
                continue;
            }
            break;
        }

        if state.shutting_down {
            if state.all_workers_exited() {
                break;
            }
            let at = *shutdown_at.get_or_insert_with(Instant::now);
            if !killed && at.elapsed() > SHUTDOWN_GRACE {
                killed = true;
                for (name, w) in workers.iter_mut() {
                    tracing::warn!(agent = %name, "worker ignored shutdown; killing");
                    w.kill();
                }
            }
        }
    }

    tracing::info!(finished = finished.len(), "orchestrator stopped");
    Ok((finished, state))
}

async fn apply(
    out: Outgoing,
    workers: &mut HashMap<String, WorkerProcess<WorkerMessage>>,
    state_path: &Path,
    finished: &mut Vec<Task>,
) {
    match out {
        Outgoing::Send { agent, message } => {
            let Some(worker) = workers.get_mut(&agent) else {
                tracing::warn!(agent = %agent, "no such worker");
                return;
            };
            if let Err(e) = worker.send(&message).await {
                tracing::warn!(agent = %agent, error = %e, "failed to write to worker");
            }
            if message == ParentMessage::Shutdown {
                worker.close_stdin();
            }
        }
        Outgoing::PersistState(shared) => {
            if let Err(e) = orchestrator::persist_shared_state(state_path, &shared) {
                tracing::warn!(path = %state_path.display(), error = %e, "failed to persist shared state");
            }
        }
        Outgoing::TaskFinished(task) => {
            match &task.status {
                TaskStatus::Failed { reason } => tracing::warn!(
                    agent = %task.agent_name,
                    task = %task.task_id,
                    %reason,
                    "task failed"
                ),
                _ => tracing::info!(
                    agent = %task.agent_name,
                    task = %task.task_id,
                    attempts = task.attempts,
                    "task completed"
                ),
            }
            finished.push(task);
        }
        Outgoing::Notice { agent, message } => match agent {
            Some(a) => tracing::info!(agent = %a, "{message}"),
            None => tracing::info!("{message}"),
        },
    }
}
