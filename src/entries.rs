//! The `.gsync_entries` file.
//!
//! After every successful sync the checkout records which dependency lived
//! where. The next sync compares against it to find dependencies that were
//! dropped from the manifests, and can delete their directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::ENTRIES_FILE_NAME;
use crate::tree::DependencyTree;
use crate::utils::{atomic_write, paths};

/// Contents of the entries file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntriesFile {
    /// When the file was last written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,

    /// Dependency name to url
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

impl EntriesFile {
    /// Snapshot of the processed nodes of `tree`.
    pub fn from_tree(tree: &DependencyTree) -> Self {
        Self {
            updated: Some(Utc::now()),
            entries: tree.entries(),
        }
    }

    /// Read `<root>/.gsync_entries`; a missing file is empty.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(ENTRIES_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Write `<root>/.gsync_entries` atomically.
    pub fn save(&self, root: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).context("Failed to serialize entries")?;
        atomic_write(&root.join(ENTRIES_FILE_NAME), text.as_bytes())
    }

    /// Names present in `previous` but not in `self`.
    pub fn removed_since(&self, previous: &Self) -> Vec<String> {
        previous
            .entries
            .keys()
            .filter(|name| !self.entries.contains_key(*name))
            .cloned()
            .collect()
    }
}

/// Delete the directories of dependencies that are no longer declared.
///
/// A directory still containing a current entry is kept, as are CIPD
/// entries, which do not own a directory of their own.
pub fn delete_unversioned_trees(
    root: &Path,
    removed: &[String],
    current: &EntriesFile,
) -> Result<Vec<PathBuf>> {
    let mut deleted = Vec::new();
    for name in removed {
        if name.contains(':') {
            continue;
        }
        if current.entries.keys().any(|kept| paths::is_ancestor(name, kept)) {
            warn!("Not deleting {name}: it contains other dependencies");
            continue;
        }
        let dir = root.join(name);
        if !dir.is_dir() {
            continue;
        }
        info!("Deleting unversioned tree {name}");
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to delete {}", dir.display()))?;
        deleted.push(dir);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(names: &[&str]) -> EntriesFile {
        EntriesFile {
            updated: None,
            entries: names
                .iter()
                .map(|n| ((*n).to_string(), format!("https://example/{n}.git")))
                .collect(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        assert_eq!(EntriesFile::load(temp.path()).unwrap(), EntriesFile::default());

        let mut file = entries(&["src", "src/a"]);
        file.updated = Some(Utc::now());
        file.save(temp.path()).unwrap();
        let loaded = EntriesFile::load(temp.path()).unwrap();
        assert_eq!(loaded.entries, file.entries);
        assert!(loaded.updated.is_some());
    }

    #[test]
    fn test_removed_since() {
        let previous = entries(&["src", "src/a", "src/b"]);
        let current = entries(&["src", "src/a"]);
        assert_eq!(current.removed_since(&previous), ["src/b"]);
        assert!(previous.removed_since(&current).is_empty());
    }

    #[test]
    fn test_delete_unversioned_trees() {
        let temp = TempDir::new().unwrap();
        for dir in ["src/old", "legacy/keep", "src/tools"] {
            std::fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        let current = entries(&["src", "legacy/keep"]);
        let removed = vec![
            "src/old".to_string(),
            "legacy".to_string(),
            "src/tools:infra/tool".to_string(),
            "src/missing".to_string(),
        ];
        let deleted = delete_unversioned_trees(temp.path(), &removed, &current).unwrap();
        assert_eq!(deleted, [temp.path().join("src/old")]);
        assert!(temp.path().join("legacy/keep").exists());
        assert!(temp.path().join("src/tools").exists());
    }
}
