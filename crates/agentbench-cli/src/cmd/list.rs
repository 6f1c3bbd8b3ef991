use super::Workspace;
use crate::output::{print_json, print_table};
use agentbench_core::config::SettingsLayer;
use std::path::Path;

pub fn run(root: &Path, registry: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root, registry, &SettingsLayer::default())?;
    let scenarios = ws.registry.scenarios();

    if json {
        print_json(&serde_json::json!({ "scenarios": scenarios }))?;
        return Ok(());
    }

    let rows = scenarios
        .iter()
        .map(|s| {
            vec![
                s.id.clone(),
                s.name.clone(),
                s.config_document.display().to_string(),
                s.description.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "DOCUMENT", "DESCRIPTION"], rows);
    Ok(())
}
