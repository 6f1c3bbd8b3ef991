use super::{display_path, Workspace};
use crate::output::{print_json, print_table, yes_no};
use agentbench_core::config::SettingsLayer;
use agentbench_core::materialize;
use agentbench_core::paths::{REPORT_PREFIX, RESULTS_PREFIX};
use agentbench_core::results;
use std::path::Path;

pub fn run(root: &Path, registry: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root, registry, &SettingsLayer::default())?;
    let samples_dir = ws.samples_dir();
    let results_dir = ws.results_dir();

    let program = &ws.settings.agent.program;
    let agent_path = which::which(program).ok();
    let template_present = ws.template_root().is_dir();
    let latest_results = results::latest(&results_dir, RESULTS_PREFIX)?;
    let latest_report = results::latest(&results_dir, REPORT_PREFIX)?;

    let scenarios: Vec<(String, bool)> = ws
        .registry
        .scenarios()
        .iter()
        .map(|s| (s.id.clone(), materialize::existing(&samples_dir, &s.id).is_some()))
        .collect();

    if json {
        let value = serde_json::json!({
            "root": ws.root,
            "template_present": template_present,
            "agent": {
                "program": program,
                "path": agent_path,
            },
            "scenarios": scenarios
                .iter()
                .map(|(id, present)| serde_json::json!({ "id": id, "sample_present": present }))
                .collect::<Vec<_>>(),
            "latest_results": latest_results,
            "latest_report": latest_report,
        });
        return print_json(&value);
    }

    println!("Root:     {}", ws.root.display());
    println!(
        "Template: {} ({})",
        display_path(&ws.root, &ws.template_root()),
        if template_present { "present" } else { "missing" }
    );
    match &agent_path {
        Some(p) => println!("Agent:    {program} ({})", p.display()),
        None => println!("Agent:    {program} (not found on PATH)"),
    }
    println!();

    let rows = scenarios
        .iter()
        .map(|(id, present)| vec![id.clone(), yes_no(*present)])
        .collect();
    print_table(&["SCENARIO", "SAMPLE"], rows);

    println!();
    let show = |label: &str, p: &Option<std::path::PathBuf>| match p {
        Some(p) => println!("{label} {}", display_path(&ws.root, p)),
        None => println!("{label} none"),
    };
    show("Latest results:", &latest_results);
    show("Latest report: ", &latest_report);
    Ok(())
}
