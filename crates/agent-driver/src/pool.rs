use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::session::{run_session, SessionOutcome, SessionRequest};
use crate::{AgentDriverError, Result};

/// Runs agent sessions with bounded parallelism.
///
/// At most `max_parallel` sessions are live at once, and a key that already
/// has a live session is rejected with [`AgentDriverError::InFlight`] rather
/// than started twice. Cloning shares the same limits.
#[derive(Debug, Clone)]
pub struct SessionPool {
    max_parallel: usize,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SessionPool {
    pub fn new(max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);
        Self {
            max_parallel,
            semaphore: Arc::new(Semaphore::new(max_parallel)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Run one session once a slot is free.
    pub async fn run(&self, req: SessionRequest) -> Result<SessionOutcome> {
        let _claim = self.claim(&req.key)?;
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AgentDriverError::Process("session pool closed".into()))?;
        Ok(run_session(&req).await)
    }

    /// Run every request and return the results in request order.
    ///
    /// With a single slot the sessions run strictly one after another in the
    /// order given.
    pub async fn run_all(&self, requests: Vec<SessionRequest>) -> Vec<(String, Result<SessionOutcome>)> {
        if self.max_parallel == 1 {
            let mut results = Vec::with_capacity(requests.len());
            for req in requests {
                let key = req.key.clone();
                results.push((key, self.run(req).await));
            }
            return results;
        }

        // Claim every key before spawning so duplicates in one batch are
        // rejected deterministically.
        let pending: Vec<_> = requests
            .into_iter()
            .map(|req| {
                let key = req.key.clone();
                let slot = self.claim(&key).map(|claim| {
                    let sem = Arc::clone(&self.semaphore);
                    tokio::spawn(async move {
                        let _claim = claim;
                        let _permit = sem
                            .acquire()
                            .await
                            .map_err(|_| AgentDriverError::Process("session pool closed".into()))?;
                        Ok::<_, AgentDriverError>(run_session(&req).await)
                    })
                });
                (key, slot)
            })
            .collect();

        join_all(pending.into_iter().map(|(key, slot)| async move {
            let outcome = match slot {
                Err(rejected) => Err(rejected),
                Ok(handle) => handle
                    .await
                    .unwrap_or_else(|e| Err(AgentDriverError::Process(format!("task join error: {e}")))),
            };
            (key, outcome)
        }))
        .await
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.in_flight
            .lock()
            .map(|s| s.contains(key))
            .unwrap_or(false)
    }

    fn claim(&self, key: &str) -> Result<Claim> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| AgentDriverError::Process("in-flight set poisoned".into()))?;
        if !set.insert(key.to_string()) {
            return Err(AgentDriverError::InFlight(key.to_string()));
        }
        Ok(Claim {
            key: key.to_string(),
            set: Arc::clone(&self.in_flight),
        })
    }
}

/// Releases a key from the in-flight set on drop.
struct Claim {
    key: String,
    set: Arc<Mutex<HashSet<String>>>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        if let Ok(mut s) = self.set.lock() {
            s.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ProcessExit;
    use std::time::{Duration, Instant};

    fn req(key: &str, script: &str) -> SessionRequest {
        SessionRequest {
            key: key.into(),
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: vec![],
            cwd: std::env::temp_dir(),
            prompt: String::new(),
            timeout: Duration::from_secs(20),
        }
    }

    #[tokio::test]
    async fn results_keep_request_order() {
        let pool = SessionPool::new(3);
        let results = pool
            .run_all(vec![
                req("slow", "sleep 0.4; exit 1"),
                req("fast", "exit 2"),
                req("mid", "sleep 0.1; exit 3"),
            ])
            .await;
        let codes: Vec<_> = results
            .iter()
            .map(|(k, r)| (k.as_str(), r.as_ref().unwrap().exit.clone()))
            .collect();
        assert_eq!(
            codes,
            vec![
                ("slow", ProcessExit::Exited { code: 1 }),
                ("fast", ProcessExit::Exited { code: 2 }),
                ("mid", ProcessExit::Exited { code: 3 }),
            ]
        );
    }

    #[tokio::test]
    async fn parallel_sessions_overlap() {
        let pool = SessionPool::new(2);
        let started = Instant::now();
        let results = pool
            .run_all(vec![req("a", "sleep 1"), req("b", "sleep 1")])
            .await;
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(started.elapsed() < Duration::from_millis(1900));
    }

    #[tokio::test]
    async fn single_slot_runs_in_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("order.log");
        let script = |name: &str| format!("echo {name} >> '{}'", log.display());
        let pool = SessionPool::new(1);
        pool.run_all(vec![
            req("one", &script("one")),
            req("two", &script("two")),
            req("three", &script("three")),
        ])
        .await;
        let order = std::fs::read_to_string(&log).unwrap();
        assert_eq!(order, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected_while_in_flight() {
        let pool = SessionPool::new(2);
        let results = pool
            .run_all(vec![req("same", "sleep 0.2"), req("same", "true")])
            .await;
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(AgentDriverError::InFlight(ref k)) if k == "same"));
        assert!(!pool.is_running("same"));
    }

    #[test]
    fn zero_parallelism_is_clamped() {
        assert_eq!(SessionPool::new(0).max_parallel(), 1);
    }
}
