use super::Workspace;
use crate::output::print_json;
use agentbench_core::config::{ConfigWarning, SettingsLayer, WarnLevel};
use agentbench_core::paths;
use clap::Subcommand;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the merged settings (defaults, registry, local file, environment)
    Show,

    /// Validate the merged settings for common mistakes
    Validate,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, registry: Option<&Path>, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::load(root, registry, &SettingsLayer::default())?;
    match subcmd {
        ConfigSubcommand::Show => show(&ws, json),
        ConfigSubcommand::Validate => validate(&ws, json),
    }
}

fn show(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&ws.settings);
    }
    print!("{}", serde_yaml::to_string(&ws.settings)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    let mut warnings = ws.settings.validate();
    if !ws.template_root().is_dir() {
        warnings.push(ConfigWarning {
            level: WarnLevel::Warning,
            message: format!(
                "template directory {} does not exist",
                ws.template_root().display()
            ),
        });
    }
    let configs_dir = ws.configs_dir();
    for s in ws.registry.scenarios() {
        let doc = paths::resolve(&configs_dir, &s.config_document);
        if !doc.is_file() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "scenario '{}': configuration document {} not found",
                    s.id,
                    doc.display()
                ),
            });
        }
    }

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
