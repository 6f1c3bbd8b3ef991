//! Typed benchmark settings and their layered merge.
//!
//! Every source of configuration produces a [`SettingsLayer`] whose fields
//! are all optional. [`Settings::resolve`] folds layers lowest-precedence
//! first over the built-in defaults, so a later layer wins field by field.

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// AgentCommand
// ---------------------------------------------------------------------------

/// The external agent process launched once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Default for AgentCommand {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec![
                "--print".to_string(),
                "--permission-mode".to_string(),
                "acceptEdits".to_string(),
            ],
            env: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Path, relative to the sample directory, the agent is asked to create.
    pub expected_file: String,
    pub lint_command: String,
    pub test_command: String,
    pub command_timeout_secs: u64,
    /// Directory whose line count is compared against the template.
    pub source_dir: String,
    pub max_line_delta: Option<usize>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            expected_file: "src/components/ResetButton.jsx".to_string(),
            lint_command: "npm run lint".to_string(),
            test_command: "CI=true npm test -- --watchAll=false".to_string(),
            command_timeout_secs: 300,
            source_dir: "src".to_string(),
            max_line_delta: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_line_delta: Option<usize>,
}

// ---------------------------------------------------------------------------
// Settings (resolved)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub parallel_execution: bool,
    pub max_parallel_sessions: usize,
    pub timeout_minutes: u64,
    pub cleanup_after_run: bool,
    pub agent: AgentCommand,
    /// Inline prompt; ignored when `prompt_file` is set.
    pub prompt: Option<String>,
    pub prompt_file: Option<PathBuf>,
    pub template_dir: PathBuf,
    pub configs_dir: PathBuf,
    pub samples_dir: PathBuf,
    pub results_dir: PathBuf,
    /// File name the scenario's configuration document is copied to.
    pub overlay_target: String,
    /// Entry names skipped when copying the template and counting lines.
    pub exclude: Vec<String>,
    pub validation: ValidationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallel_execution: false,
            max_parallel_sessions: 2,
            timeout_minutes: 30,
            cleanup_after_run: false,
            agent: AgentCommand::default(),
            prompt: None,
            prompt_file: Some(PathBuf::from("prompts/benchmark.md")),
            template_dir: PathBuf::from("template"),
            configs_dir: PathBuf::from("configs"),
            samples_dir: PathBuf::from("samples"),
            results_dir: PathBuf::from("results"),
            overlay_target: "CLAUDE.md".to_string(),
            exclude: vec![
                "node_modules".to_string(),
                ".git".to_string(),
                "dist".to_string(),
                "build".to_string(),
            ],
            validation: ValidationSettings::default(),
        }
    }
}

impl Settings {
    /// Fold `layers` (lowest precedence first) over the built-in defaults.
    pub fn resolve<'a>(layers: impl IntoIterator<Item = &'a SettingsLayer>) -> Self {
        let mut s = Settings::default();
        for layer in layers {
            s.apply(layer);
        }
        s
    }

    fn apply(&mut self, l: &SettingsLayer) {
        if let Some(v) = l.parallel_execution {
            self.parallel_execution = v;
        }
        if let Some(v) = l.max_parallel_sessions {
            self.max_parallel_sessions = v;
        }
        if let Some(v) = l.timeout_minutes {
            self.timeout_minutes = v;
        }
        if let Some(v) = l.cleanup_after_run {
            self.cleanup_after_run = v;
        }
        if let Some(v) = &l.agent {
            self.agent = v.clone();
        }
        // An inline prompt in a higher layer displaces a prompt file from a lower one.
        if let Some(v) = &l.prompt {
            self.prompt = Some(v.clone());
            self.prompt_file = None;
        }
        if let Some(v) = &l.prompt_file {
            self.prompt_file = Some(v.clone());
        }
        if let Some(v) = &l.template_dir {
            self.template_dir = v.clone();
        }
        if let Some(v) = &l.configs_dir {
            self.configs_dir = v.clone();
        }
        if let Some(v) = &l.samples_dir {
            self.samples_dir = v.clone();
        }
        if let Some(v) = &l.results_dir {
            self.results_dir = v.clone();
        }
        if let Some(v) = &l.overlay_target {
            self.overlay_target = v.clone();
        }
        if let Some(v) = &l.exclude {
            self.exclude = v.clone();
        }
        if let Some(v) = &l.validation {
            let t = &mut self.validation;
            if let Some(x) = &v.expected_file {
                t.expected_file = x.clone();
            }
            if let Some(x) = &v.lint_command {
                t.lint_command = x.clone();
            }
            if let Some(x) = &v.test_command {
                t.test_command = x.clone();
            }
            if let Some(x) = v.command_timeout_secs {
                t.command_timeout_secs = x;
            }
            if let Some(x) = &v.source_dir {
                t.source_dir = x.clone();
            }
            if let Some(x) = v.max_line_delta {
                t.max_line_delta = Some(x);
            }
        }
    }

    /// Number of sessions allowed to run at once.
    pub fn effective_parallelism(&self) -> usize {
        if self.parallel_execution {
            self.max_parallel_sessions.max(1)
        } else {
            1
        }
    }

    pub fn session_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }

    /// Load the prompt text, preferring `prompt_file` (resolved against `root`).
    pub fn load_prompt(&self, root: &Path) -> Result<String> {
        if let Some(file) = &self.prompt_file {
            let path = crate::paths::resolve(root, file);
            return std::fs::read_to_string(&path).map_err(|e| BenchError::InvalidSetting {
                key: "prompt_file".to_string(),
                reason: format!("{}: {e}", path.display()),
            });
        }
        match &self.prompt {
            Some(p) if !p.trim().is_empty() => Ok(p.clone()),
            _ => Err(BenchError::InvalidSetting {
                key: "prompt".to_string(),
                reason: "no prompt or prompt_file configured".to_string(),
            }),
        }
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.agent.program.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "agent.program is empty".to_string(),
            });
        }
        if self.timeout_minutes == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "timeout_minutes must be greater than zero".to_string(),
            });
        }
        if self.parallel_execution && self.max_parallel_sessions == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "max_parallel_sessions=0 with parallel_execution; running one at a time"
                    .to_string(),
            });
        }
        if self.max_parallel_sessions > 16 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "max_parallel_sessions={} (>16 is unusual)",
                    self.max_parallel_sessions
                ),
            });
        }
        if self.overlay_target.contains('/') || self.overlay_target.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "overlay_target '{}' must be a plain file name",
                    self.overlay_target
                ),
            });
        }
        for (name, cmd) in [
            ("lint_command", &self.validation.lint_command),
            ("test_command", &self.validation.test_command),
        ] {
            if cmd.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("validation.{name} is empty; the check will always fail"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// SettingsLayer
// ---------------------------------------------------------------------------

/// One precedence layer: the registry's `settings:` block, the local override
/// file, the environment, or CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_execution: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_sessions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_after_run: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configs_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationLayer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocalOverride {
    #[serde(default)]
    settings: SettingsLayer,
}

impl SettingsLayer {
    /// Read `benchmark.local.yaml`. A missing file is an empty layer.
    pub fn load_local(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: LocalOverride = serde_yaml::from_str(&data).map_err(|e| {
            BenchError::InvalidRegistry(format!("{}: {e}", path.display()))
        })?;
        Ok(parsed.settings)
    }

    /// Build a layer from `AGENTBENCH_*` variables supplied by `lookup`.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut layer = Self::default();
        if let Some(v) = lookup("AGENTBENCH_TIMEOUT_MINUTES") {
            layer.timeout_minutes = Some(parse_env("AGENTBENCH_TIMEOUT_MINUTES", &v)?);
        }
        if let Some(v) = lookup("AGENTBENCH_MAX_PARALLEL") {
            layer.max_parallel_sessions = Some(parse_env("AGENTBENCH_MAX_PARALLEL", &v)?);
        }
        if let Some(v) = lookup("AGENTBENCH_PARALLEL") {
            layer.parallel_execution = Some(parse_bool("AGENTBENCH_PARALLEL", &v)?);
        }
        if let Some(v) = lookup("AGENTBENCH_AGENT") {
            let mut parts = v.split_whitespace().map(str::to_string);
            if let Some(program) = parts.next() {
                layer.agent = Some(AgentCommand {
                    program,
                    args: parts.collect(),
                    env: BTreeMap::new(),
                });
            }
        }
        Ok(layer)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| BenchError::InvalidSetting {
        key: key.to_string(),
        reason: format!("cannot parse '{value}'"),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BenchError::InvalidSetting {
            key: key.to_string(),
            reason: format!("expected a boolean, got '{value}'"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_without_layers() {
        let s = Settings::resolve([]);
        assert_eq!(s, Settings::default());
        assert_eq!(s.effective_parallelism(), 1);
        assert_eq!(s.overlay_target, "CLAUDE.md");
    }

    #[test]
    fn later_layer_wins_field_by_field() {
        let registry = SettingsLayer {
            timeout_minutes: Some(10),
            parallel_execution: Some(true),
            ..Default::default()
        };
        let local = SettingsLayer {
            timeout_minutes: Some(5),
            ..Default::default()
        };
        let s = Settings::resolve([&registry, &local]);
        assert_eq!(s.timeout_minutes, 5);
        assert!(s.parallel_execution, "untouched fields survive from lower layers");
        assert_eq!(s.max_parallel_sessions, 2);
    }

    #[test]
    fn layer_order_matters() {
        let a = SettingsLayer {
            max_parallel_sessions: Some(8),
            ..Default::default()
        };
        let b = SettingsLayer {
            max_parallel_sessions: Some(3),
            ..Default::default()
        };
        assert_eq!(Settings::resolve([&a, &b]).max_parallel_sessions, 3);
        assert_eq!(Settings::resolve([&b, &a]).max_parallel_sessions, 8);
    }

    #[test]
    fn validation_block_merges_per_field() {
        let layer = SettingsLayer {
            validation: Some(ValidationLayer {
                lint_command: Some("true".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let s = Settings::resolve([&layer]);
        assert_eq!(s.validation.lint_command, "true");
        assert_eq!(s.validation.expected_file, "src/components/ResetButton.jsx");
    }

    #[test]
    fn inline_prompt_displaces_lower_prompt_file() {
        let layer = SettingsLayer {
            prompt: Some("do the thing".into()),
            ..Default::default()
        };
        let s = Settings::resolve([&layer]);
        assert!(s.prompt_file.is_none());
        assert_eq!(s.load_prompt(Path::new("/nonexistent")).unwrap(), "do the thing");
    }

    #[test]
    fn env_layer_parses_known_keys() {
        let env: HashMap<&str, &str> = [
            ("AGENTBENCH_TIMEOUT_MINUTES", "7"),
            ("AGENTBENCH_PARALLEL", "yes"),
            ("AGENTBENCH_MAX_PARALLEL", "4"),
            ("AGENTBENCH_AGENT", "my-agent --fast"),
        ]
        .into_iter()
        .collect();
        let layer = SettingsLayer::from_env_with(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(layer.timeout_minutes, Some(7));
        assert_eq!(layer.parallel_execution, Some(true));
        assert_eq!(layer.max_parallel_sessions, Some(4));
        let agent = layer.agent.unwrap();
        assert_eq!(agent.program, "my-agent");
        assert_eq!(agent.args, vec!["--fast"]);
    }

    #[test]
    fn env_layer_rejects_garbage() {
        let err = SettingsLayer::from_env_with(|k| {
            (k == "AGENTBENCH_TIMEOUT_MINUTES").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("AGENTBENCH_TIMEOUT_MINUTES"));
    }

    #[test]
    fn layer_rejects_unknown_fields() {
        let yaml = "timeout_minuts: 3\n";
        assert!(serde_yaml::from_str::<SettingsLayer>(yaml).is_err());
    }

    #[test]
    fn local_override_missing_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let layer = SettingsLayer::load_local(&dir.path().join("benchmark.local.yaml")).unwrap();
        assert_eq!(layer, SettingsLayer::default());
    }

    #[test]
    fn local_override_reads_settings_block() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("benchmark.local.yaml");
        std::fs::write(&path, "settings:\n  timeout_minutes: 1\n").unwrap();
        let layer = SettingsLayer::load_local(&path).unwrap();
        assert_eq!(layer.timeout_minutes, Some(1));
    }

    #[test]
    fn validate_flags_zero_timeout_and_empty_program() {
        let mut s = Settings::default();
        s.timeout_minutes = 0;
        s.agent.program = " ".into();
        let w = s.validate();
        assert_eq!(w.iter().filter(|w| w.level == WarnLevel::Error).count(), 2);
    }

    #[test]
    fn validate_default_settings_clean() {
        assert!(Settings::default().validate().is_empty());
    }

    #[test]
    fn parallelism_respects_flag() {
        let mut s = Settings::default();
        s.max_parallel_sessions = 4;
        assert_eq!(s.effective_parallelism(), 1);
        s.parallel_execution = true;
        assert_eq!(s.effective_parallelism(), 4);
        s.max_parallel_sessions = 0;
        assert_eq!(s.effective_parallelism(), 1);
    }
}
