use super::{display_path, MaterializeDirs, Workspace};
use crate::output::{print_json, print_table};
use agentbench_core::config::SettingsLayer;
use agentbench_core::materialize::{self, SampleDirectory};
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, registry: Option<&Path>, scenario: Option<&str>, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root, registry, &SettingsLayer::default())?;
    let samples = materialize_selected(&ws, scenario)?;

    if json {
        print_json(&serde_json::json!({ "samples": samples_json(&samples) }))?;
    } else {
        let rows = samples
            .iter()
            .map(|s| vec![s.scenario_id.clone(), display_path(&ws.root, &s.path)])
            .collect();
        print_table(&["SCENARIO", "SAMPLE"], rows);
    }
    Ok(())
}

/// Recreate the sample directory of every selected scenario, in registry
/// order. Any failure aborts setup.
pub(crate) fn materialize_selected(ws: &Workspace, scenario: Option<&str>) -> anyhow::Result<Vec<SampleDirectory>> {
    let selected = ws.registry.select(scenario)?;
    let dirs = MaterializeDirs::new(ws);
    materialize::materialize_all(&selected, &dirs.options(&ws.settings))
        .context("setup failed")
}

pub(crate) fn samples_json(samples: &[SampleDirectory]) -> Vec<serde_json::Value> {
    samples
        .iter()
        .map(|s| serde_json::json!({ "scenario_id": s.scenario_id, "path": s.path }))
        .collect()
}
