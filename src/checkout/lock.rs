//! File locks guarding shared git mirrors.
//!
//! Several checkouts (or several gsync processes) may share one cache
//! directory. Each mirror is updated under an exclusive lock on
//! `<cache>/.locks/<name>.lock`; the lock is released when the guard drops.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;

/// Exclusive lock on one mirror in the cache.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Block (off the runtime threads) until the lock for `name` is held.
    pub async fn acquire(cache_dir: &Path, name: &str) -> Result<Self> {
        let locks_dir = cache_dir.join(".locks");
        tokio::fs::create_dir_all(&locks_dir)
            .await
            .with_context(|| format!("Failed to create {}", locks_dir.display()))?;

        let path = locks_dir.join(format!("{name}.lock"));
        let lock_path = path.clone();
        let name = name.to_string();

        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&lock_path)
                .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
            file.lock_exclusive()
                .with_context(|| format!("Failed to acquire lock for: {name}"))?;
            Ok(file)
        })
        .await
        .context("Failed to spawn blocking task for lock acquisition")??;

        tracing::trace!(target: "git", "Acquired cache lock {}", path.display());
        Ok(Self { file, path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to unlock {}: {e}", self.path.display());
        }
    }
}
