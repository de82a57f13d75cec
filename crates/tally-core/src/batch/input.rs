//! Input enumeration for batch processing.
//!
//! Runs once, before any dispatch. It is the only place a batch can fail as a
//! whole: if a directory cannot be listed, nothing is processed.

use crate::error::TallyError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Expand the given paths into an ordered file list.
///
/// Directories are listed (sorted by file name, regular files only,
/// recursively when `recursive` is set). Anything else is passed through
/// unchanged, so a missing file still gets its own `FileNotFound` result.
pub fn collect_inputs(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>, TallyError> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            files.extend(list_directory(path, recursive)?);
        } else {
            files.push(path.clone());
        }
    }

    Ok(files)
}

fn list_directory(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, TallyError> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| TallyError::Input {
            path: e.path().unwrap_or(dir).to_path_buf(),
            message: e.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
