use crate::error::{BenchError, Result};
use crate::paths;
use crate::scenario::Scenario;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A scenario's private copy of the template project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDirectory {
    pub scenario_id: String,
    pub path: PathBuf,
}

/// Where the materializer reads from and writes to.
#[derive(Debug, Clone)]
pub struct MaterializeOptions<'a> {
    pub template_root: &'a Path,
    pub configs_dir: &'a Path,
    pub dest_root: &'a Path,
    pub overlay_target: &'a str,
    pub exclude: &'a [String],
}

/// Copy the template into `dest_root/<id>` and overlay the scenario's
/// configuration document at `overlay_target`.
///
/// An existing destination is removed first. Inputs are checked before the
/// destination is touched, so a bad registry entry never destroys a sample.
pub fn materialize(scenario: &Scenario, opts: &MaterializeOptions<'_>) -> Result<SampleDirectory> {
    if !opts.template_root.is_dir() {
        return Err(BenchError::TemplateMissing(opts.template_root.to_path_buf()));
    }
    let document = paths::resolve(opts.configs_dir, &scenario.config_document);
    if !document.is_file() {
        return Err(BenchError::ConfigDocumentMissing {
            scenario: scenario.id.clone(),
            path: document,
        });
    }

    let dest = paths::sample_dir(opts.dest_root, &scenario.id);
    clear(&dest)?;

    copy_tree(opts.template_root, &dest, opts.exclude)?;
    std::fs::copy(&document, dest.join(opts.overlay_target))?;

    tracing::info!(
        scenario = %scenario.id,
        dest = %dest.display(),
        document = %document.display(),
        "materialized sample"
    );

    Ok(SampleDirectory {
        scenario_id: scenario.id.clone(),
        path: dest,
    })
}

/// Materialize every scenario, in order. Stops at the first failure.
pub fn materialize_all(
    scenarios: &[&Scenario],
    opts: &MaterializeOptions<'_>,
) -> Result<Vec<SampleDirectory>> {
    scenarios.iter().map(|s| materialize(s, opts)).collect()
}

/// The sample directory a scenario would use, if it has been materialized.
pub fn existing(dest_root: &Path, scenario_id: &str) -> Option<SampleDirectory> {
    let path = paths::sample_dir(dest_root, scenario_id);
    path.is_dir().then(|| SampleDirectory {
        scenario_id: scenario_id.to_string(),
        path,
    })
}

/// Remove the sample directories for `ids`. Missing directories are ignored.
pub fn cleanup<'a>(dest_root: &Path, ids: impl IntoIterator<Item = &'a str>) -> Result<usize> {
    let mut removed = 0;
    for id in ids {
        let path = paths::sample_dir(dest_root, id);
        if path.exists() {
            clear(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn clear(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    std::fs::remove_dir_all(path).map_err(|source| BenchError::DestinationNotClearable {
        path: path.to_path_buf(),
        source,
    })
}

fn copy_tree(src: &Path, dst: &Path, exclude: &[String]) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|x| name.to_string_lossy() == x.as_str()) {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        let ft = entry.file_type()?;
        if ft.is_dir() {
            copy_tree(&from, &to, exclude)?;
        } else if ft.is_file() {
            std::fs::copy(&from, &to)?;
        } else if ft.is_symlink() {
            // Follow links so samples stay self-contained.
            let target = std::fs::metadata(&from)?;
            if target.is_dir() {
                copy_tree(&from, &to, exclude)?;
            } else {
                std::fs::copy(&from, &to)?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        template: PathBuf,
        configs: PathBuf,
        samples: PathBuf,
        exclude: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let template = dir.path().join("template");
            let configs = dir.path().join("configs");
            let samples = dir.path().join("samples");
            std::fs::create_dir_all(template.join("src/components")).unwrap();
            std::fs::create_dir_all(template.join("node_modules/react")).unwrap();
            std::fs::create_dir_all(&configs).unwrap();
            std::fs::write(template.join("package.json"), "{\"name\":\"counter\"}").unwrap();
            std::fs::write(template.join("src/components/Counter.jsx"), "export {}\n").unwrap();
            std::fs::write(template.join("node_modules/react/index.js"), "//").unwrap();
            std::fs::write(configs.join("CLAUDE_EMPTY.md"), "").unwrap();
            std::fs::write(configs.join("CLAUDE_TDD.md"), "# Always write tests first\n").unwrap();
            Self {
                _dir: dir,
                template,
                configs,
                samples,
                exclude: vec!["node_modules".to_string()],
            }
        }

        fn opts(&self) -> MaterializeOptions<'_> {
            MaterializeOptions {
                template_root: &self.template,
                configs_dir: &self.configs,
                dest_root: &self.samples,
                overlay_target: "CLAUDE.md",
                exclude: &self.exclude,
            }
        }
    }

    fn scenario(id: &str, doc: &str) -> Scenario {
        Scenario {
            id: id.to_string(),
            name: id.to_string(),
            config_document: PathBuf::from(doc),
            description: String::new(),
        }
    }

    #[test]
    fn minimal_scenario_gets_overlay() {
        let f = Fixture::new();
        let s = scenario("minimal", "CLAUDE_EMPTY.md");
        let sample = materialize(&s, &f.opts()).unwrap();
        assert_eq!(sample.path, f.samples.join("minimal"));
        let overlay = sample.path.join("CLAUDE.md");
        assert!(overlay.exists());
        assert_eq!(
            std::fs::read(&overlay).unwrap(),
            std::fs::read(f.configs.join("CLAUDE_EMPTY.md")).unwrap()
        );
        assert!(sample.path.join("src/components/Counter.jsx").exists());
        assert!(!sample.path.join("node_modules").exists());
    }

    #[test]
    fn one_sample_per_scenario() {
        let f = Fixture::new();
        let a = scenario("minimal", "CLAUDE_EMPTY.md");
        let b = scenario("tdd", "CLAUDE_TDD.md");
        let samples = materialize_all(&[&a, &b], &f.opts()).unwrap();
        assert_eq!(samples.len(), 2);
        let tdd = std::fs::read_to_string(samples[1].path.join("CLAUDE.md")).unwrap();
        assert!(tdd.contains("tests first"));
        let dirs = std::fs::read_dir(&f.samples).unwrap().count();
        assert_eq!(dirs, 2);
    }

    #[test]
    fn rematerialize_replaces_previous_contents() {
        let f = Fixture::new();
        let s = scenario("tdd", "CLAUDE_TDD.md");
        let sample = materialize(&s, &f.opts()).unwrap();
        std::fs::write(sample.path.join("leftover.txt"), "agent output").unwrap();
        let again = materialize(&s, &f.opts()).unwrap();
        assert!(!again.path.join("leftover.txt").exists());
        assert!(again.path.join("CLAUDE.md").exists());
    }

    #[test]
    fn missing_document_leaves_existing_sample() {
        let f = Fixture::new();
        let good = scenario("tdd", "CLAUDE_TDD.md");
        materialize(&good, &f.opts()).unwrap();
        let bad = scenario("tdd", "CLAUDE_MISSING.md");
        let err = materialize(&bad, &f.opts()).unwrap_err();
        assert!(matches!(err, BenchError::ConfigDocumentMissing { .. }));
        assert!(f.samples.join("tdd/CLAUDE.md").exists());
    }

    #[test]
    fn missing_template_is_config_error() {
        let f = Fixture::new();
        let missing = f.template.join("nope");
        let opts = MaterializeOptions {
            template_root: &missing,
            ..f.opts()
        };
        let err = materialize(&scenario("a", "CLAUDE_EMPTY.md"), &opts).unwrap_err();
        assert!(matches!(err, BenchError::TemplateMissing(_)));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_sources_count_the_same_in_template_and_sample() {
        let f = Fixture::new();
        let outside = f._dir.path().join("shared.js");
        std::fs::write(&outside, "one\ntwo\nthree\n").unwrap();
        std::os::unix::fs::symlink(&outside, f.template.join("src/shared.js")).unwrap();

        let sample = materialize(&scenario("tdd", "CLAUDE_TDD.md"), &f.opts()).unwrap();
        let before = crate::io::count_lines(&f.template.join("src"), &f.exclude).unwrap();
        let after = crate::io::count_lines(&sample.path.join("src"), &f.exclude).unwrap();
        assert_eq!(before, 4);
        assert_eq!(before, after);
    }

    #[test]
    fn cleanup_removes_only_named_samples() {
        let f = Fixture::new();
        let a = scenario("minimal", "CLAUDE_EMPTY.md");
        let b = scenario("tdd", "CLAUDE_TDD.md");
        materialize_all(&[&a, &b], &f.opts()).unwrap();
        let removed = cleanup(&f.samples, ["minimal", "ghost"]).unwrap();
        assert_eq!(removed, 1);
        assert!(existing(&f.samples, "minimal").is_none());
        assert!(existing(&f.samples, "tdd").is_some());
    }
}
