use super::pattern::GlobPattern;
use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A named worker process and the file patterns that trigger it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub patterns: Vec<String>,
    /// Action name sent with every task for this agent.
    #[serde(default = "default_action")]
    pub action: String,
}

fn default_action() -> String {
    "handle_change".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    pub agents: Vec<AgentSpec>,
    /// A started task with no report after this long is retried or failed.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_task_retries: u32,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_task_timeout() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    1
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".agentbench/shared-state.json")
}

impl OrchestratorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BenchError::RegistryNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: OrchestratorConfig = serde_yaml::from_str(&data)
            .map_err(|e| BenchError::InvalidRegistry(format!("{}: {e}", path.display())))?;
        cfg.check()?;
        Ok(cfg)
    }

    fn check(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(BenchError::InvalidRegistry(
                "orchestrator config lists no agents".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for a in &self.agents {
            if !seen.insert(a.name.as_str()) {
                return Err(BenchError::InvalidRegistry(format!(
                    "duplicate agent name: {}",
                    a.name
                )));
            }
            if a.command.trim().is_empty() {
                return Err(BenchError::InvalidRegistry(format!(
                    "agent '{}' has an empty command",
                    a.name
                )));
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            task_timeout_secs: self.task_timeout_secs,
            max_task_retries: self.max_task_retries,
        }
    }
}

/// What to do with a task whose worker never reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `0` disables the timeout.
    pub task_timeout_secs: u64,
    pub max_task_retries: u32,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Compiled trigger patterns, in config order.
#[derive(Debug, Clone)]
pub struct Router {
    routes: Vec<Route>,
}

#[derive(Debug, Clone)]
struct Route {
    agent: String,
    action: String,
    patterns: Vec<GlobPattern>,
}

impl Router {
    pub fn new(agents: &[AgentSpec]) -> Result<Self> {
        let routes = agents
            .iter()
            .map(|a| {
                Ok(Route {
                    agent: a.name.clone(),
                    action: a.action.clone(),
                    patterns: a
                        .patterns
                        .iter()
                        .map(|p| GlobPattern::new(p))
                        .collect::<Result<_>>()?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self { routes })
    }

    /// `(agent, action)` for every agent with a pattern matching `path`.
    pub fn route<'a>(&'a self, path: &str) -> Vec<(&'a str, &'a str)> {
        self.routes
            .iter()
            .filter(|r| r.patterns.iter().any(|p| p.matches(path)))
            .map(|r| (r.agent.as_str(), r.action.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
task_timeout_secs: 60
agents:
  - name: test-writer
    command: ./agents/test-writer.sh
    patterns: ["src/**/*.jsx", "src/**/*.js"]
  - name: doc-writer
    command: ./agents/doc-writer.sh
    args: ["--quiet"]
    patterns: ["src/components/*.jsx", "**/*.md"]
    action: update_docs
"#;

    #[test]
    fn parses_with_defaults() {
        let cfg: OrchestratorConfig = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(cfg.task_timeout_secs, 60);
        assert_eq!(cfg.max_task_retries, 1);
        assert_eq!(cfg.agents[0].action, "handle_change");
        assert_eq!(cfg.agents[1].args, vec!["--quiet"]);
        assert_eq!(cfg.state_file, PathBuf::from(".agentbench/shared-state.json"));
    }

    #[test]
    fn routes_to_every_matching_agent() {
        let cfg: OrchestratorConfig = serde_yaml::from_str(YAML).unwrap();
        let router = Router::new(&cfg.agents).unwrap();
        let both = router.route("src/components/Counter.jsx");
        assert_eq!(
            both,
            vec![("test-writer", "handle_change"), ("doc-writer", "update_docs")]
        );
        assert_eq!(router.route("README.md"), vec![("doc-writer", "update_docs")]);
        assert!(router.route("package.json").is_empty());
    }

    #[test]
    fn duplicate_agent_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("orchestrator.yaml");
        std::fs::write(
            &path,
            "agents:\n  - {name: a, command: x, patterns: []}\n  - {name: a, command: y, patterns: []}\n",
        )
        .unwrap();
        let err = OrchestratorConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate agent name"));
    }
}
