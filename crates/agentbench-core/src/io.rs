use crate::error::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting state files.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Create `dir/<stem>.<ext>` exclusively, falling back to `<stem>-1.<ext>`,
/// `<stem>-2.<ext>`, ... when the name is taken. Returns the path written.
///
/// `create_new` makes the claim atomic, so two writers racing on the same
/// timestamp never share a file.
pub fn write_unique(dir: &Path, stem: &str, ext: &str, data: &[u8]) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let mut n = 0u32;
    loop {
        let name = if n == 0 {
            format!("{stem}.{ext}")
        } else {
            format!("{stem}-{n}.{ext}")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                f.write_all(data)?;
                f.sync_all()?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Count newline-terminated lines in every UTF-8 file under `dir`.
/// Non-UTF-8 files are skipped; a missing directory counts as zero.
pub fn count_lines(dir: &Path, exclude: &[String]) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut total = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|x| name.to_string_lossy() == x.as_str()) {
            continue;
        }
        let path = entry.path();
        // Symlinks are followed, matching how samples are copied.
        let meta = std::fs::metadata(&path)?;
        if meta.is_dir() {
            total += count_lines(&path, exclude)?;
        } else if meta.is_file() {
            if let Ok(content) = std::fs::read_to_string(&path) {
                total += content.lines().count();
            }
        }
    }
    Ok(total)
}
