pub mod analyze;
pub mod config;
pub mod list;
pub mod orchestrate;
pub mod run;
pub mod setup;
pub mod status;

use agentbench_core::config::{Settings, SettingsLayer};
use agentbench_core::materialize::MaterializeOptions;
use agentbench_core::paths;
use agentbench_core::scenario::Registry;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// A loaded registry plus the fully merged settings, with every directory
/// resolved against the benchmark root.
pub struct Workspace {
    pub root: PathBuf,
    pub registry: Registry,
    pub settings: Settings,
}

impl Workspace {
    /// Load the registry and merge settings: registry `settings:` block,
    /// `benchmark.local.yaml`, `AGENTBENCH_*` environment, then `flags`.
    pub fn load(root: &Path, registry: Option<&Path>, flags: &SettingsLayer) -> anyhow::Result<Self> {
        let registry_path = match registry {
            Some(p) => paths::resolve(root, p),
            None => paths::registry_path(root),
        };
        let registry = Registry::load(&registry_path)
            .with_context(|| format!("failed to load registry {}", registry_path.display()))?;

        let local_path = paths::local_override_path(&registry_path);
        let local = SettingsLayer::load_local(&local_path)
            .with_context(|| format!("failed to load {}", local_path.display()))?;
        let env = SettingsLayer::from_env().context("invalid AGENTBENCH_* environment")?;

        let settings = Settings::resolve([&registry.settings, &local, &env, flags]);
        tracing::debug!(root = %root.display(), "settings resolved");

        Ok(Self {
            root: root.to_path_buf(),
            registry,
            settings,
        })
    }

    pub fn template_root(&self) -> PathBuf {
        paths::resolve(&self.root, &self.settings.template_dir)
    }

    pub fn configs_dir(&self) -> PathBuf {
        paths::resolve(&self.root, &self.settings.configs_dir)
    }

    pub fn samples_dir(&self) -> PathBuf {
        paths::resolve(&self.root, &self.settings.samples_dir)
    }

    pub fn results_dir(&self) -> PathBuf {
        paths::resolve(&self.root, &self.settings.results_dir)
    }
}

/// Owned directories for building a [`MaterializeOptions`].
pub struct MaterializeDirs {
    template_root: PathBuf,
    configs_dir: PathBuf,
    dest_root: PathBuf,
}

impl MaterializeDirs {
    pub fn new(ws: &Workspace) -> Self {
        Self {
            template_root: ws.template_root(),
            configs_dir: ws.configs_dir(),
            dest_root: ws.samples_dir(),
        }
    }

    pub fn options<'a>(&'a self, settings: &'a Settings) -> MaterializeOptions<'a> {
        MaterializeOptions {
            template_root: &self.template_root,
            configs_dir: &self.configs_dir,
            dest_root: &self.dest_root,
            overlay_target: &settings.overlay_target,
            exclude: &settings.exclude,
        }
    }
}

/// Resolve a path given on the command line against the caller's working
/// directory. Paths inside config files resolve against the benchmark root.
pub fn from_cwd(p: &Path) -> anyhow::Result<PathBuf> {
    if p.is_absolute() {
        return Ok(p.to_path_buf());
    }
    let cwd = std::env::current_dir().context("cannot read current directory")?;
    Ok(cwd.join(p))
}

/// Display a path relative to the root when it lives under it.
pub fn display_path(root: &Path, p: &Path) -> String {
    p.strip_prefix(root).unwrap_or(p).display().to_string()
}
