use crate::config::SettingsLayer;
use crate::error::{BenchError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// A named configuration profile under comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    /// Path to the configuration document, relative to `configs_dir`.
    pub config_document: PathBuf,
    #[serde(default)]
    pub description: String,
}

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("valid regex"))
}

pub fn validate_id(id: &str) -> Result<()> {
    if id_regex().is_match(id) {
        Ok(())
    } else {
        Err(BenchError::InvalidScenarioId(id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    #[serde(default)]
    settings: SettingsLayer,
    #[serde(default)]
    scenarios: Vec<Scenario>,
}

/// Scenarios in file order plus the registry's own settings layer.
#[derive(Debug, Clone)]
pub struct Registry {
    pub path: PathBuf,
    pub settings: SettingsLayer,
    scenarios: Vec<Scenario>,
}

impl Registry {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BenchError::RegistryNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let mut registry = Self::parse(&data)?;
        registry.path = path.to_path_buf();
        tracing::debug!(
            path = %path.display(),
            scenarios = registry.scenarios.len(),
            "loaded registry"
        );
        Ok(registry)
    }

    pub fn parse(data: &str) -> Result<Self> {
        let file: RegistryFile =
            serde_yaml::from_str(data).map_err(|e| BenchError::InvalidRegistry(e.to_string()))?;

        if file.scenarios.is_empty() {
            return Err(BenchError::InvalidRegistry(
                "registry lists no scenarios".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for s in &file.scenarios {
            validate_id(&s.id)?;
            if !seen.insert(s.id.as_str()) {
                return Err(BenchError::DuplicateScenario(s.id.clone()));
            }
            if s.config_document.as_os_str().is_empty() {
                return Err(BenchError::InvalidRegistry(format!(
                    "scenario '{}' has an empty config_document",
                    s.id
                )));
            }
        }

        Ok(Self {
            path: PathBuf::new(),
            settings: file.settings,
            scenarios: file.scenarios,
        })
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn get(&self, id: &str) -> Result<&Scenario> {
        self.scenarios
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| BenchError::ScenarioNotFound(id.to_string()))
    }

    /// All scenarios in registry order, or just the one named by `only`.
    pub fn select(&self, only: Option<&str>) -> Result<Vec<&Scenario>> {
        match only {
            Some(id) => Ok(vec![self.get(id)?]),
            None => Ok(self.scenarios.iter().collect()),
        }
    }

    /// Position of `id` in registry order; used to break ranking ties.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.scenarios.iter().position(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"
settings:
  parallel_execution: true
  timeout_minutes: 15
  cleanup_after_run: false
scenarios:
  - id: minimal
    name: Minimal
    config_document: CLAUDE_EMPTY.md
    description: No guidance at all
  - id: tdd
    name: TDD
    config_document: CLAUDE_TDD.md
    description: Red, green, refactor
  - id: no-tdd
    name: No TDD
    config_document: CLAUDE_NO_TDD.md
"#;

    #[test]
    fn parse_preserves_order_and_settings() {
        let r = Registry::parse(REGISTRY).unwrap();
        let ids: Vec<_> = r.scenarios().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["minimal", "tdd", "no-tdd"]);
        assert_eq!(r.settings.timeout_minutes, Some(15));
        assert_eq!(r.settings.parallel_execution, Some(true));
        assert_eq!(r.get("no-tdd").unwrap().description, "");
    }

    #[test]
    fn duplicate_id_rejected() {
        let yaml = r#"
scenarios:
  - id: tdd
    name: A
    config_document: a.md
  - id: tdd
    name: B
    config_document: b.md
"#;
        let err = Registry::parse(yaml).unwrap_err();
        assert!(matches!(err, BenchError::DuplicateScenario(ref id) if id == "tdd"));
    }

    #[test]
    fn malformed_yaml_is_config_error() {
        let err = Registry::parse("scenarios: [ {id: ").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn empty_registry_rejected() {
        assert!(Registry::parse("scenarios: []\n").is_err());
    }

    #[test]
    fn invalid_id_rejected() {
        let yaml = "scenarios:\n  - id: Bad Id\n    name: x\n    config_document: x.md\n";
        assert!(matches!(
            Registry::parse(yaml).unwrap_err(),
            BenchError::InvalidScenarioId(_)
        ));
    }

    #[test]
    fn unknown_field_rejected() {
        let yaml = "scenarios:\n  - id: a\n    name: x\n    config_doc: x.md\n";
        assert!(Registry::parse(yaml).is_err());
    }

    #[test]
    fn select_single_and_missing() {
        let r = Registry::parse(REGISTRY).unwrap();
        assert_eq!(r.select(None).unwrap().len(), 3);
        let one = r.select(Some("tdd")).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].config_document, PathBuf::from("CLAUDE_TDD.md"));
        assert!(matches!(
            r.select(Some("nope")).unwrap_err(),
            BenchError::ScenarioNotFound(_)
        ));
        assert_eq!(r.position("no-tdd"), Some(2));
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Registry::load(&dir.path().join("benchmark.yaml")).unwrap_err();
        assert!(matches!(err, BenchError::RegistryNotFound(_)));
    }

    #[test]
    fn load_records_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("benchmark.yaml");
        std::fs::write(&path, REGISTRY).unwrap();
        let r = Registry::load(&path).unwrap();
        assert_eq!(r.path, path);
    }
}
