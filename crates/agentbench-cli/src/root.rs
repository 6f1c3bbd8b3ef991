use agentbench_core::paths::REGISTRY_FILE;
use std::path::{Path, PathBuf};

/// Resolve the benchmark root directory.
///
/// Priority:
/// 1. `--root` flag / `AGENTBENCH_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `benchmark.yaml`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd).unwrap_or(cwd)
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(REGISTRY_FILE).is_file())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_root(Some(dir.path())), dir.path());
    }

    #[test]
    fn finds_registry_in_ancestor() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(REGISTRY_FILE), "scenarios: []\n").unwrap();
        let deep = dir.path().join("samples/minimal/src");
        std::fs::create_dir_all(&deep).unwrap();
        assert_eq!(find_upward(&deep).as_deref(), Some(dir.path()));
    }

    #[test]
    fn no_registry_anywhere() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("a/b");
        std::fs::create_dir_all(&deep).unwrap();
        // An ancestor of the tempdir could in principle hold one; only check
        // that nothing inside the tempdir was picked.
        if let Some(found) = find_upward(&deep) {
            assert!(!found.starts_with(dir.path()));
        }
    }
}
