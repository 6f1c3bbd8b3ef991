//! Timestamped result and report files under the results directory.

use crate::error::{BenchError, Result};
use crate::io;
use crate::paths;
use crate::report::AnalysisReport;
use crate::session::RunRecord;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub fn save_run(results_dir: &Path, record: &RunRecord) -> Result<PathBuf> {
    let stem = format!(
        "{}{}",
        paths::RESULTS_PREFIX,
        paths::file_timestamp(record.finished_at)
    );
    let data = serde_json::to_vec_pretty(record)?;
    io::write_unique(results_dir, &stem, "json", &data)
}

pub fn save_report(results_dir: &Path, report: &AnalysisReport) -> Result<PathBuf> {
    let stem = format!(
        "{}{}",
        paths::REPORT_PREFIX,
        paths::file_timestamp(report.generated_at)
    );
    let data = serde_json::to_vec_pretty(report)?;
    io::write_unique(results_dir, &stem, "json", &data)
}

pub fn load_run(path: &Path) -> Result<RunRecord> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

pub fn load_report(path: &Path) -> Result<AnalysisReport> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

/// Write a full session transcript to `logs/<id>-<ts>.log`.
pub fn save_session_log(
    results_dir: &Path,
    scenario_id: &str,
    at: DateTime<Utc>,
    transcript: &str,
) -> Result<PathBuf> {
    let stem = format!("{scenario_id}-{}", paths::file_timestamp(at));
    io::write_unique(&paths::logs_dir(results_dir), &stem, "log", transcript.as_bytes())
}

/// Artifacts with `prefix`, oldest first.
pub fn list(results_dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    if !results_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(results_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix) && n.ends_with(".json"))
        })
        .collect();
    // Timestamps are fixed-width, so name order is chronological. Collision
    // suffixes ("-1") sort after the bare name.
    files.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    Ok(files)
}

fn sort_key(p: &Path) -> (String, u32) {
    let stem = p
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    match stem.rsplit_once('-') {
        Some((base, n)) if n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty() => {
            (base.to_string(), n.parse().unwrap_or(0))
        }
        _ => (stem, 0),
    }
}

pub fn latest(results_dir: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    Ok(list(results_dir, prefix)?.pop())
}

pub fn latest_run(results_dir: &Path) -> Result<PathBuf> {
    latest(results_dir, paths::RESULTS_PREFIX)?
        .ok_or_else(|| BenchError::NoResults(results_dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionExit, SessionResult};
    use tempfile::TempDir;

    fn record(finished_at: DateTime<Utc>) -> RunRecord {
        RunRecord {
            run_id: uuid::Uuid::new_v4(),
            started_at: finished_at,
            finished_at,
            prompt: "add a reset button".into(),
            parallelism: 1,
            results: vec![SessionResult::not_started(
                "minimal",
                SessionExit::Exited { code: 0 },
            )],
        }
    }

    #[test]
    fn same_timestamp_yields_distinct_files() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let a = save_run(dir.path(), &record(now)).unwrap();
        let b = save_run(dir.path(), &record(now)).unwrap();
        assert_ne!(a, b);
        assert_eq!(list(dir.path(), paths::RESULTS_PREFIX).unwrap().len(), 2);
        assert_eq!(latest_run(dir.path()).unwrap(), b);
    }

    #[test]
    fn latest_picks_newest_timestamp() {
        use chrono::TimeZone;
        let dir = TempDir::new().unwrap();
        let older = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let n = save_run(dir.path(), &record(newer)).unwrap();
        save_run(dir.path(), &record(older)).unwrap();
        assert_eq!(latest_run(dir.path()).unwrap(), n);
    }

    #[test]
    fn run_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let rec = record(Utc::now());
        let path = save_run(dir.path(), &rec).unwrap();
        let loaded = load_run(&path).unwrap();
        assert_eq!(loaded.run_id, rec.run_id);
        assert_eq!(loaded.results, rec.results);
    }

    #[test]
    fn no_results_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            latest_run(dir.path()).unwrap_err(),
            BenchError::NoResults(_)
        ));
    }

    #[test]
    fn reports_and_results_are_listed_separately() {
        let dir = TempDir::new().unwrap();
        save_run(dir.path(), &record(Utc::now())).unwrap();
        save_report(dir.path(), &AnalysisReport::build(vec![])).unwrap();
        assert_eq!(list(dir.path(), paths::RESULTS_PREFIX).unwrap().len(), 1);
        assert_eq!(list(dir.path(), paths::REPORT_PREFIX).unwrap().len(), 1);
    }

    #[test]
    fn session_log_lands_in_logs_dir() {
        let dir = TempDir::new().unwrap();
        let p = save_session_log(dir.path(), "tdd", Utc::now(), "hello").unwrap();
        assert!(p.starts_with(dir.path().join("logs")));
        assert_eq!(std::fs::read_to_string(p).unwrap(), "hello");
    }
}
