use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const REGISTRY_FILE: &str = "benchmark.yaml";
pub const LOCAL_OVERRIDE_FILE: &str = "benchmark.local.yaml";
pub const ORCHESTRATOR_FILE: &str = "orchestrator.yaml";
pub const LOGS_DIR: &str = "logs";

pub const RESULTS_PREFIX: &str = "benchmark-results-";
pub const REPORT_PREFIX: &str = "analysis-report-";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn registry_path(root: &Path) -> PathBuf {
    root.join(REGISTRY_FILE)
}

/// The local override lives next to whichever registry file is in use.
pub fn local_override_path(registry: &Path) -> PathBuf {
    registry
        .parent()
        .unwrap_or(Path::new("."))
        .join(LOCAL_OVERRIDE_FILE)
}

pub fn orchestrator_config_path(root: &Path) -> PathBuf {
    root.join(ORCHESTRATOR_FILE)
}

pub fn sample_dir(samples_root: &Path, scenario_id: &str) -> PathBuf {
    samples_root.join(scenario_id)
}

pub fn logs_dir(results_root: &Path) -> PathBuf {
    results_root.join(LOGS_DIR)
}

/// Resolve `p` against `root` unless it is already absolute.
pub fn resolve(root: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

/// Compact UTC timestamp used in artifact names, millisecond resolution.
pub fn file_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_keeps_absolute_paths() {
        let root = Path::new("/work");
        assert_eq!(resolve(root, Path::new("/etc/x")), PathBuf::from("/etc/x"));
        assert_eq!(resolve(root, Path::new("samples")), PathBuf::from("/work/samples"));
    }

    #[test]
    fn local_override_sits_beside_registry() {
        let p = local_override_path(Path::new("/work/bench/benchmark.yaml"));
        assert_eq!(p, PathBuf::from("/work/bench/benchmark.local.yaml"));
    }

    #[test]
    fn file_timestamp_is_sortable() {
        use chrono::TimeZone;
        let a = chrono::Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(file_timestamp(a), "20260102T030405000Z");
    }
}
