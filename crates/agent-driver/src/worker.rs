use std::marker::PhantomData;
use std::path::PathBuf;
use std::process::Stdio;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};

use crate::process::DRAIN_GRACE;
use crate::{AgentDriverError, Result};

// ─── Types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// What a worker produced, tagged with the worker's name.
#[derive(Debug)]
pub enum WorkerEvent<M> {
    Message { agent: String, message: M },
    /// A stdout line that was neither a known message nor a typed JSON object.
    Malformed { agent: String, error: AgentDriverError },
    Stderr { agent: String, line: String },
    /// Always the last event for a worker.
    Exited { agent: String, code: Option<i32> },
}

// ─── WorkerProcess ────────────────────────────────────────────────────────

/// A long-lived worker that speaks JSON lines on stdin/stdout.
///
/// Every stdout line is decoded as `M` and forwarded on the event channel.
/// Lines that are valid JSON with an unrecognised `"type"` are skipped.
/// When stdout closes the child is reaped and [`WorkerEvent::Exited`] is
/// sent after all of its messages.
pub struct WorkerProcess<M> {
    name: String,
    stdin: Option<ChildStdin>,
    kill_tx: Option<oneshot::Sender<()>>,
    _message: PhantomData<fn() -> M>,
}

impl<M> WorkerProcess<M>
where
    M: DeserializeOwned + Send + 'static,
{
    pub fn spawn(spec: &WorkerSpec, events: mpsc::Sender<WorkerEvent<M>>) -> Result<Self> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| AgentDriverError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        tracing::debug!(agent = %spec.name, pid = ?child.id(), "worker spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentDriverError::Process("stdout not captured".into()))?;
        let stdin = child.stdin.take();

        if let Some(stderr) = child.stderr.take() {
            let tx = events.clone();
            let agent = spec.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let ev = WorkerEvent::Stderr {
                        agent: agent.clone(),
                        line,
                    };
                    if tx.send(ev).await.is_err() {
                        break;
                    }
                }
            });
        }

        let reader = {
            let tx = events.clone();
            let agent = spec.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let ev = match decode::<M>(&line) {
                        Decoded::Skip => continue,
                        Decoded::Message(message) => WorkerEvent::Message {
                            agent: agent.clone(),
                            message,
                        },
                        Decoded::Malformed(error) => WorkerEvent::Malformed {
                            agent: agent.clone(),
                            error,
                        },
                    };
                    if tx.send(ev).await.is_err() {
                        break;
                    }
                }
            })
        };

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let agent = spec.name.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    let _ = child.kill().await;
                    child.wait().await
                }
            };
            // A grandchild holding stdout open must not delay `Exited` forever.
            let abort = reader.abort_handle();
            if tokio::time::timeout(DRAIN_GRACE, reader).await.is_err() {
                abort.abort();
            }
            let code = status.ok().and_then(|s| s.code());
            tracing::debug!(agent = %agent, ?code, "worker exited");
            let _ = events.send(WorkerEvent::Exited { agent, code }).await;
        });

        Ok(Self {
            name: spec.name.clone(),
            stdin,
            kill_tx: Some(kill_tx),
            _message: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write one JSON message followed by a newline.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AgentDriverError::Process("stdin already closed".into()))?;

        let mut buf = serde_json::to_vec(msg).map_err(|e| {
            AgentDriverError::Process(format!("failed to serialize worker message: {e}"))
        })?;
        buf.push(b'\n');

        stdin.write_all(&buf).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Close stdin; a well-behaved worker exits on EOF.
    pub fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Kill the worker (best-effort). The `Exited` event still follows.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

enum Decoded<M> {
    Message(M),
    Skip,
    Malformed(AgentDriverError),
}

fn decode<M: DeserializeOwned>(line: &str) -> Decoded<M> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Decoded::Skip;
    }
    match serde_json::from_str::<M>(trimmed) {
        Ok(m) => Decoded::Message(m),
        Err(e) if is_unknown_message_type(trimmed, &e) => {
            tracing::debug!(line = trimmed, "skipping unknown worker message type");
            Decoded::Skip
        }
        Err(source) => Decoded::Malformed(AgentDriverError::Parse {
            line: trimmed.to_owned(),
            source,
        }),
    }
}

/// Valid JSON whose string `"type"` names no variant of the message enum.
/// A known type with a bad payload, or a non-string `type`, is malformed.
fn is_unknown_message_type(line: &str, err: &serde_json::Error) -> bool {
    let has_string_type = serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("type").map(|t| t.is_string()))
        .unwrap_or(false);
    // serde reports a tag outside the enum as `unknown variant ...`.
    has_string_type && err.to_string().starts_with("unknown variant")
}

// ─── Tests ────────────────────────────────────────────────────────────────
