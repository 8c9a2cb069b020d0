//! Filesystem helpers shared by the output writers.

use std::path::Path;

use crate::error::{GradeError, Result};

/// Write `content` to `path` via a sibling temp file and a rename, creating
/// parent directories as needed. Readers never observe a half-written file.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| GradeError::io(parent, e))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| GradeError::validation(format!("{} is not a file path", path.display())))?;
    let temp = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

    std::fs::write(&temp, content).map_err(|e| GradeError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| GradeError::io(path, e))?;
    Ok(())
}
