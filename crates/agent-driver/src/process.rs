use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::session::{ProcessExit, SessionRequest};
use crate::{AgentDriverError, Result};

/// How long to keep draining output after the child is gone. A grandchild
/// that inherited the pipes can hold them open indefinitely.
pub(crate) const DRAIN_GRACE: Duration = Duration::from_secs(2);

// ─── AgentProcess ─────────────────────────────────────────────────────────

/// A running one-shot agent session.
///
/// The prompt is written to stdin, then stdin is closed. Stdout and stderr
/// are drained by background tasks into a shared transcript; stderr lines
/// carry a `[stderr] ` prefix.
pub(crate) struct AgentProcess {
    child: Child,
    transcript: Arc<Mutex<String>>,
    readers: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl AgentProcess {
    pub(crate) async fn spawn(req: &SessionRequest) -> Result<Self> {
        let mut cmd = Command::new(&req.program);
        cmd.args(&req.args).current_dir(&req.cwd);
        // Allow launching from inside another agent session.
        cmd.env_remove("CLAUDECODE");
        for (k, v) in &req.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| AgentDriverError::Spawn {
            program: req.program.clone(),
            source,
        })?;

        let transcript = Arc::new(Mutex::new(String::new()));
        let mut readers = Vec::new();
        if let Some(out) = child.stdout.take() {
            readers.push(drain(out, Arc::clone(&transcript), ""));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(drain(err, Arc::clone(&transcript), "[stderr] "));
        }

        // The write runs beside the deadline: an agent that never reads a
        // prompt larger than the pipe buffer must still time out.
        let writer = child.stdin.take().map(|mut stdin| {
            let mut buf = req.prompt.clone().into_bytes();
            if !buf.ends_with(b"\n") {
                buf.push(b'\n');
            }
            tokio::spawn(async move {
                match stdin.write_all(&buf).await {
                    Ok(()) => {
                        let _ = stdin.flush().await;
                    }
                    // An agent that exits without reading its prompt is not a driver error.
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => tracing::warn!(error = %e, "failed to write prompt to agent stdin"),
                }
                // Dropping stdin here sends EOF.
            })
        });

        Ok(Self {
            child,
            transcript,
            readers,
            writer,
        })
    }

    /// Wait for exit, killing the child when `timeout` elapses first.
    pub(crate) async fn wait(&mut self, timeout: Duration) -> Result<ProcessExit> {
        let exit = match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => match status.code() {
                Some(code) => ProcessExit::Exited { code },
                None => ProcessExit::Signaled,
            },
            Ok(Err(e)) => return Err(AgentDriverError::Io(e)),
            Err(_) => {
                self.kill().await;
                ProcessExit::TimedOut { after: timeout }
            }
        };
        self.finish_readers().await;
        Ok(exit)
    }

    pub(crate) fn transcript(&self) -> String {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Kill the subprocess (best-effort; errors are silently ignored).
    pub(crate) async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }

    async fn finish_readers(&mut self) {
        // Drops stdin if the prompt was still being written.
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        for handle in self.readers.drain(..) {
            let abort = handle.abort_handle();
            if tokio::time::timeout(DRAIN_GRACE, handle).await.is_err() {
                abort.abort();
            }
        }
    }
}

fn drain<R>(stream: R, buf: Arc<Mutex<String>>, prefix: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Ok(mut b) = buf.lock() {
                b.push_str(prefix);
                b.push_str(&line);
                b.push('\n');
            }
        }
    })
}
