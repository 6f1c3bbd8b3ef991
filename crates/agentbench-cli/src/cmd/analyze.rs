use super::{display_path, from_cwd, Workspace};
use crate::output::{print_json, print_table};
use agentbench_core::config::SettingsLayer;
use agentbench_core::materialize::SampleDirectory;
use agentbench_core::paths;
use agentbench_core::report::AnalysisReport;
use agentbench_core::results;
use agentbench_core::session::RunRecord;
use agentbench_core::validate::{CheckContext, Validator};
use anyhow::Context;
use std::path::{Path, PathBuf};

pub fn run(root: &Path, registry: Option<&Path>, results_file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root, registry, &SettingsLayer::default())?;
    let results_dir = ws.results_dir();

    let source = match results_file {
        Some(p) => from_cwd(p)?,
        None => results::latest_run(&results_dir)?,
    };
    let record = results::load_run(&source)
        .with_context(|| format!("failed to read {}", source.display()))?;

    let (report, path) = analyze_and_save(&ws, &record, &source)?;
    print_report(&ws, &report, &path, json)
}

/// Validate every session in `record` against its sample directory.
///
/// Sessions are evaluated in the order they were recorded, which is
/// registry order, so ranking ties keep that order.
pub(crate) fn analyze(ws: &Workspace, record: &RunRecord) -> AnalysisReport {
    let validator = Validator::default();
    let template_root = ws.template_root();
    let samples_dir = ws.samples_dir();

    let entries = record
        .results
        .iter()
        .map(|session| {
            let sample = SampleDirectory {
                scenario_id: session.scenario_id.clone(),
                path: paths::sample_dir(&samples_dir, &session.scenario_id),
            };
            let ctx = CheckContext {
                sample: &sample,
                session,
                template_root: &template_root,
                settings: &ws.settings.validation,
                exclude: &ws.settings.exclude,
            };
            tracing::info!(scenario = %session.scenario_id, "validating sample");
            (session, validator.evaluate(&ctx))
        })
        .collect();

    AnalysisReport::build(entries)
}

pub(crate) fn analyze_and_save(
    ws: &Workspace,
    record: &RunRecord,
    source: &Path,
) -> anyhow::Result<(AnalysisReport, PathBuf)> {
    let mut report = analyze(ws, record);
    report.source = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let path = results::save_report(&ws.results_dir(), &report).context("failed to save analysis report")?;
    Ok((report, path))
}

pub(crate) fn print_report(ws: &Workspace, report: &AnalysisReport, path: &Path, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "report_file": path,
            "report": report,
        }));
    }

    let rows = report
        .ranking
        .iter()
        .map(|r| {
            let s = &report.scenarios[&r.scenario_id];
            let failed: Vec<&str> = s
                .outcomes
                .iter()
                .filter(|o| !o.passed)
                .map(|o| o.check_name.as_str())
                .collect();
            vec![
                r.rank.to_string(),
                r.scenario_id.clone(),
                format!("{}/{}", r.passed, r.total),
                s.exit.label(),
                failed.join(","),
            ]
        })
        .collect();
    print_table(&["RANK", "SCENARIO", "PASSED", "SESSION", "FAILED CHECKS"], rows);
    if let Some(w) = report.winner() {
        println!("\nBest: {} ({}/{})", w.scenario_id, w.passed, w.total);
    }
    println!("Report: {}", display_path(&ws.root, path));
    Ok(())
}
