use super::{analyze, display_path, from_cwd, setup, Workspace};
use crate::output::{print_json, print_table};
use agent_driver::{AgentDriverError, ProcessExit, SessionOutcome, SessionPool, SessionRequest};
use agentbench_core::config::{SettingsLayer, WarnLevel};
use agentbench_core::error::BenchError;
use agentbench_core::materialize::{self, SampleDirectory};
use agentbench_core::results;
use agentbench_core::session::{tail, RunRecord, SessionExit, SessionResult, LOG_TAIL_BYTES};
use anyhow::Context;
use chrono::Utc;
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Args, Debug, Default)]
pub struct PipelineArgs {
    /// Reuse existing sample directories instead of recreating them
    #[arg(long)]
    pub skip_setup: bool,

    /// Persist session results without running validation
    #[arg(long)]
    pub skip_analysis: bool,

    /// Remove sample directories after the run
    #[arg(long)]
    pub cleanup: bool,

    /// Only this scenario
    #[arg(long)]
    pub scenario: Option<String>,

    /// Prompt file sent to every agent session
    #[arg(long, value_name = "FILE")]
    pub prompt: Option<PathBuf>,

    /// Session timeout in minutes
    #[arg(long, value_name = "MINUTES")]
    pub timeout_minutes: Option<u64>,

    /// Run sessions concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Upper bound on concurrent sessions (implies --parallel)
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<usize>,
}

impl PipelineArgs {
    fn settings_layer(&self) -> SettingsLayer {
        SettingsLayer {
            prompt_file: self.prompt.clone(),
            timeout_minutes: self.timeout_minutes,
            parallel_execution: (self.parallel || self.max_parallel.is_some()).then_some(true),
            max_parallel_sessions: self.max_parallel,
            cleanup_after_run: self.cleanup.then_some(true),
            ..SettingsLayer::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, registry: Option<&Path>, mut args: PipelineArgs, json: bool) -> anyhow::Result<()> {
    args.prompt = args.prompt.as_deref().map(from_cwd).transpose()?;
    let ws = Workspace::load(root, registry, &args.settings_layer())?;
    let settings = &ws.settings;

    let warnings = settings.validate();
    for w in &warnings {
        tracing::warn!("{}", w.message);
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("settings are invalid; see `agentbench config validate`");
    }

    let prompt = settings
        .load_prompt(&ws.root)
        .context("failed to load prompt")?;

    // 1. Samples
    let samples = if args.skip_setup {
        existing_samples(&ws, args.scenario.as_deref())?
    } else {
        setup::materialize_selected(&ws, args.scenario.as_deref())?
    };

    // 2. Sessions
    let parallelism = settings.effective_parallelism();
    let requests = samples
        .iter()
        .map(|s| SessionRequest {
            key: s.scenario_id.clone(),
            program: settings.agent.program.clone(),
            args: settings.agent.args.clone(),
            env: settings
                .agent
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            cwd: s.path.clone(),
            prompt: prompt.clone(),
            timeout: settings.session_timeout(),
        })
        .collect();

    tracing::info!(
        sessions = samples.len(),
        parallelism,
        agent = %settings.agent.program,
        "starting benchmark"
    );
    let started_at = Utc::now();
    let rt = tokio::runtime::Runtime::new()?;
    let outcomes = rt.block_on(SessionPool::new(parallelism).run_all(requests));
    let finished_at = Utc::now();

    let results_dir = ws.results_dir();
    let session_results: Vec<SessionResult> = outcomes
        .into_iter()
        .map(|(id, outcome)| record_session(&results_dir, id, outcome))
        .collect();

    // 3. Persist
    let record = RunRecord {
        run_id: uuid::Uuid::new_v4(),
        started_at,
        finished_at,
        prompt,
        parallelism,
        results: session_results,
    };
    let results_path = results::save_run(&results_dir, &record).context("failed to save results")?;
    tracing::info!(path = %results_path.display(), "results saved");

    // 4. Analysis
    let analysis = if args.skip_analysis {
        None
    } else {
        Some(analyze::analyze_and_save(&ws, &record, &results_path)?)
    };

    // 5. Cleanup
    if settings.cleanup_after_run {
        let removed = materialize::cleanup(
            &ws.samples_dir(),
            samples.iter().map(|s| s.scenario_id.as_str()),
        )
        .context("failed to remove sample directories")?;
        tracing::info!(removed, "sample directories removed");
    }

    if json {
        return print_json(&serde_json::json!({
            "results_file": results_path,
            "report_file": analysis.as_ref().map(|(_, p)| p),
            "run": record,
            "ranking": analysis.as_ref().map(|(r, _)| &r.ranking),
        }));
    }

    let rows = record
        .results
        .iter()
        .map(|r| {
            vec![
                r.scenario_id.clone(),
                r.exit.label(),
                format!("{:.1}s", r.duration_ms() as f64 / 1000.0),
            ]
        })
        .collect();
    print_table(&["SCENARIO", "SESSION", "DURATION"], rows);
    println!("\nResults: {}", display_path(&ws.root, &results_path));
    if let Some((report, path)) = &analysis {
        println!();
        analyze::print_report(&ws, report, path, false)?;
    }
    Ok(())
}

fn existing_samples(ws: &Workspace, scenario: Option<&str>) -> anyhow::Result<Vec<SampleDirectory>> {
    let samples_dir = ws.samples_dir();
    ws.registry
        .select(scenario)?
        .into_iter()
        .map(|s| {
            materialize::existing(&samples_dir, &s.id).with_context(|| {
                format!(
                    "sample for '{}' does not exist; run `agentbench setup` first",
                    s.id
                )
            })
        })
        .collect()
}

/// Turn a driver outcome into a recorded result. The transcript is written
/// in full to the logs directory; the result keeps only its tail.
fn record_session(
    results_dir: &Path,
    scenario_id: String,
    outcome: agent_driver::Result<SessionOutcome>,
) -> SessionResult {
    let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
            let err = match e {
                AgentDriverError::InFlight(key) => BenchError::SessionInFlight(key),
                other => BenchError::Process(other.to_string()),
            };
            tracing::warn!(scenario = %scenario_id, error = %err, "session not started");
            let exit = match err {
                BenchError::SessionInFlight(_) => SessionExit::Rejected {
                    reason: err.to_string(),
                },
                _ => SessionExit::SpawnFailed {
                    reason: err.to_string(),
                },
            };
            return SessionResult::not_started(scenario_id, exit);
        }
    };

    let log_file = match results::save_session_log(
        results_dir,
        &scenario_id,
        outcome.started_at,
        &outcome.transcript,
    ) {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::warn!(scenario = %scenario_id, error = %e, "failed to write session log");
            None
        }
    };

    SessionResult {
        started_at: outcome.started_at,
        ended_at: outcome.ended_at,
        exit: session_exit(outcome.exit),
        log_output: tail(&outcome.transcript, LOG_TAIL_BYTES).to_string(),
        log_file,
        scenario_id,
    }
}

fn session_exit(exit: ProcessExit) -> SessionExit {
    match exit {
        ProcessExit::Exited { code } => SessionExit::Exited { code },
        ProcessExit::Signaled => SessionExit::Signaled,
        ProcessExit::TimedOut { after } => SessionExit::TimedOut {
            after_secs: after.as_secs(),
        },
        ProcessExit::SpawnFailed { reason } => SessionExit::SpawnFailed { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timed_out_never_carries_a_native_code() {
        let exit = session_exit(ProcessExit::TimedOut {
            after: Duration::from_secs(90),
        });
        assert_eq!(exit, SessionExit::TimedOut { after_secs: 90 });
    }

    #[test]
    fn rejected_session_is_recorded_not_raised() {
        let dir = tempfile::TempDir::new().unwrap();
        let r = record_session(
            dir.path(),
            "tdd".into(),
            Err(AgentDriverError::InFlight("tdd".into())),
        );
        assert!(matches!(r.exit, SessionExit::Rejected { .. }));
        assert!(r.log_file.is_none());
    }

    #[test]
    fn transcript_is_logged_in_full_and_tailed_inline() {
        let dir = tempfile::TempDir::new().unwrap();
        let transcript = "x".repeat(LOG_TAIL_BYTES + 100);
        let now = Utc::now();
        let r = record_session(
            dir.path(),
            "minimal".into(),
            Ok(SessionOutcome {
                key: "minimal".into(),
                started_at: now,
                ended_at: now,
                exit: ProcessExit::Exited { code: 0 },
                transcript: transcript.clone(),
            }),
        );
        assert_eq!(r.log_output.len(), LOG_TAIL_BYTES);
        let logged = std::fs::read_to_string(r.log_file.unwrap()).unwrap();
        assert_eq!(logged, transcript);
    }

    #[test]
    fn flags_become_the_top_settings_layer() {
        let args = PipelineArgs {
            max_parallel: Some(4),
            cleanup: true,
            ..PipelineArgs::default()
        };
        let layer = args.settings_layer();
        assert_eq!(layer.parallel_execution, Some(true));
        assert_eq!(layer.max_parallel_sessions, Some(4));
        assert_eq!(layer.cleanup_after_run, Some(true));
        assert_eq!(layer.timeout_minutes, None);
    }
}
