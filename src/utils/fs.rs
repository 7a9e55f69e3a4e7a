//! File system helpers: atomic writes and upward config discovery.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::GsyncError;

/// Ensure a directory exists, creating it and its parents if needed.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Write a file atomically by writing a sibling temp file and renaming it.
///
/// Parent directories are created automatically; the content is synced to
/// disk before the rename so readers never observe a partial file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = path.with_extension("tmp");

    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Find the directory holding `file_name`, searching `start` and its parents.
pub fn find_config_root(start: &Path, file_name: &str) -> Result<PathBuf> {
    let mut current = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());

    loop {
        if current.join(file_name).is_file() {
            return Ok(current);
        }

        if !current.pop() {
            return Err(GsyncError::ConfigNotFound {
                searched_from: start.display().to_string(),
            }
            .into());
        }
    }
}
