use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8Path;

use crate::error::HarvestError;

pub fn ensure_dir(path: &Utf8Path) -> Result<(), HarvestError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("create {path}: {err}")))
}

/// Writes through a sibling temp file and renames it over `path`, so readers never
/// observe a half-written file.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HarvestError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    ensure_dir(parent)?;
    let temp = tempfile::Builder::new()
        .prefix(".warc-harvest")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), content).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn remove_dir_if_exists(path: &Utf8Path) -> Result<bool, HarvestError> {
    if !path.as_std_path().is_dir() {
        return Ok(false);
    }
    fs::remove_dir_all(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("remove {path}: {err}")))?;
    Ok(true)
}

pub fn remove_file_if_exists(path: &Path) -> Result<bool, HarvestError> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path)
        .map_err(|err| HarvestError::Filesystem(format!("remove {}: {err}", path.display())))?;
    Ok(true)
}

/// Immediate children of `root` that are files, sorted by name.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>, HarvestError> {
    list_entries(root, |path| path.is_file())
}

/// Immediate children of `root` that are directories, sorted by name.
pub fn list_dirs(root: &Path) -> Result<Vec<PathBuf>, HarvestError> {
    list_entries(root, |path| path.is_dir())
}

fn list_entries(root: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, HarvestError> {
    let entries = fs::read_dir(root)
        .map_err(|err| HarvestError::Filesystem(format!("read {}: {err}", root.display())))?;
    let mut items = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if keep(&path) {
            items.push(path);
        }
    }
    items.sort();
    Ok(items)
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}
