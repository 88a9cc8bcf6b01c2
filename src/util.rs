//! Small shared helpers used across the resource and header-generation
//! pipelines.

use std::path::Path;

use crate::error::{BuildError, Result};

/// Writes `content` to `path` only if it differs from the file's current
/// content, so unrelated downstream rebuilds aren't triggered by a header
/// that was regenerated byte-for-byte identical. Writes through a temp file
/// in the same directory and renames over the target, so a crash mid-write
/// never leaves a partial file in place of a good one.
pub fn replace_if_changed(path: &Path, content: &[u8]) -> Result<bool> {
    if let Ok(existing) = std::fs::read(path) {
        if existing == content {
            return Ok(false);
        }
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| BuildError::CreateError {
        path: path.to_path_buf(),
        source,
    })?;
    use std::io::Write;
    tmp.write_all(content).map_err(|source| BuildError::CreateError {
        path: path.to_path_buf(),
        source,
    })?;
    tmp.persist(path).map_err(|e| BuildError::CreateError {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn identical_content_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.hpp");
        std::fs::write(&path, b"same").unwrap();
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let changed = replace_if_changed(&path, b"same").unwrap();
        assert!(!changed);
        let after = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn differing_content_replaces_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.hpp");
        std::fs::write(&path, b"old").unwrap();
        let changed = replace_if_changed(&path, b"new").unwrap();
        assert!(changed);
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }
}
