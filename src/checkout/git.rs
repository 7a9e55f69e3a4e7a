//! Git checkouts.
//!
//! A checkout is cloned with `--no-checkout`, borrowing objects from a bare
//! mirror in the shared cache when one is configured, then moved to the
//! requested revision with a detached checkout. Existing checkouts are
//! fetched in place. Touched files are reported relative to the checkout.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::checkout::SyncResult;
use crate::checkout::command_builder::GitCommand;
use crate::checkout::lock::CacheLock;
use crate::constants::{GIT_CLONE_TIMEOUT, GIT_FETCH_TIMEOUT};
use crate::core::GsyncError;

/// Git operations for one dependency.
pub struct GitCheckout<'a> {
    name: &'a str,
    url: &'a str,
    dest: PathBuf,
    cache_dir: Option<&'a Path>,
}

/// Whether `revision` is a full commit hash.
pub fn is_full_hash(revision: &str) -> bool {
    revision.len() == 40 && revision.chars().all(|c| c.is_ascii_hexdigit())
}

/// Directory-safe name of a repository url inside the cache.
pub fn mirror_name(url: &str) -> String {
    let trimmed = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .trim_end_matches('/')
        .trim_end_matches(".git");
    trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '-' })
        .collect()
}

/// Revision as git should see it after a fetch of `origin`.
fn checkout_target(revision: Option<&str>) -> String {
    match revision {
        None => "origin/HEAD".to_string(),
        Some(rev) => match rev.strip_prefix("refs/heads/") {
            Some(branch) => format!("origin/{branch}"),
            None => rev.to_string(),
        },
    }
}

impl<'a> GitCheckout<'a> {
    pub fn new(root: &Path, name: &'a str, url: &'a str, cache_dir: Option<&'a Path>) -> Self {
        Self {
            name,
            url,
            dest: root.join(name),
            cache_dir,
        }
    }

    fn git(&self) -> GitCommand {
        GitCommand::new().current_dir(&self.dest).for_node(self.name)
    }

    /// Whether a git checkout exists at the destination.
    pub fn exists(&self) -> bool {
        self.dest.join(".git").exists()
    }

    async fn head(&self) -> Result<String, GsyncError> {
        self.git().args(["rev-parse", "HEAD"]).execute_stdout().await
    }

    /// Create or refresh the bare mirror and return its path.
    async fn update_mirror(&self, cache_dir: &Path) -> Result<PathBuf, GsyncError> {
        let name = mirror_name(self.url);
        let mirror = cache_dir.join(&name);
        let _lock = CacheLock::acquire(cache_dir, &name).await.map_err(|e| GsyncError::Checkout {
            node: self.name.to_string(),
            operation: "lock".to_string(),
            reason: format!("{e:#}"),
        })?;

        if mirror.join("HEAD").exists() {
            debug!(target: "git", "Updating mirror {}", mirror.display());
            GitCommand::new()
                .current_dir(&mirror)
                .args(["fetch", "--prune", "--quiet", "origin"])
                .with_timeout(Some(GIT_FETCH_TIMEOUT))
                .for_node(self.name)
                .execute_success()
                .await?;
        } else {
            info!(target: "git", "Populating cache mirror for {}", self.url);
            GitCommand::new()
                .args(["clone", "--mirror", "--quiet", self.url])
                .arg(mirror.display().to_string())
                .with_timeout(Some(GIT_CLONE_TIMEOUT))
                .for_node(self.name)
                .execute_success()
                .await?;
        }
        Ok(mirror)
    }

    async fn clone(&self) -> Result<(), GsyncError> {
        if let Some(parent) = self.dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| GsyncError::Checkout {
                node: self.name.to_string(),
                operation: "clone".to_string(),
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }

        let mut command = GitCommand::new()
            .args(["clone", "--no-checkout", "--quiet"])
            .with_timeout(Some(GIT_CLONE_TIMEOUT))
            .for_node(self.name);
        if let Some(cache_dir) = self.cache_dir {
            let mirror = self.update_mirror(cache_dir).await?;
            command = command.arg("--reference").arg(mirror.display().to_string());
        }
        info!(target: "git", "Cloning {} into {}", self.url, self.name);
        command.arg(self.url).arg(self.dest.display().to_string()).execute_success().await
    }

    async fn fetch(&self, revision: Option<&str>) -> Result<(), GsyncError> {
        self.git()
            .args(["fetch", "--quiet", "--prune", "origin"])
            .with_timeout(Some(GIT_FETCH_TIMEOUT))
            .execute_success()
            .await?;

        // Pinned commits unreachable from any branch need an explicit fetch.
        if let Some(rev) = revision.filter(|r| is_full_hash(r)) {
            let known = self
                .git()
                .args(["cat-file", "-e"])
                .arg(format!("{rev}^{{commit}}"))
                .execute_success()
                .await
                .is_ok();
            if !known {
                self.git()
                    .args(["fetch", "--quiet", "origin", rev])
                    .with_timeout(Some(GIT_FETCH_TIMEOUT))
                    .execute_success()
                    .await?;
            }
        }
        Ok(())
    }

    /// Bring the checkout to `revision` (the remote's default branch when
    /// `None`) and list the files that changed.
    pub async fn sync(&self, revision: Option<&str>) -> Result<SyncResult, GsyncError> {
        let before = if self.exists() { Some(self.head().await?) } else { None };
        if before.is_none() {
            self.clone().await?;
        }
        self.fetch(revision).await?;

        let target = checkout_target(revision);
        debug!(target: "git", "Checking out {target} in {}", self.name);
        self.git()
            .args(["checkout", "--quiet", "--force", "--detach"])
            .arg(target)
            .execute_success()
            .await?;

        let after = self.head().await?;
        let touched = match &before {
            Some(old) if *old == after => Vec::new(),
            Some(old) => {
                self.git()
                    .args(["diff", "--name-only", old.as_str(), after.as_str()])
                    .execute()
                    .await?
                    .stdout
                    .lines()
                    .map(str::to_string)
                    .collect()
            }
            None => self
                .git()
                .arg("ls-files")
                .execute()
                .await?
                .stdout
                .lines()
                .map(str::to_string)
                .collect(),
        };

        Ok(SyncResult {
            revision: after,
            touched,
        })
    }

    /// Discard local modifications and untracked files.
    pub async fn revert(&self) -> Result<(), GsyncError> {
        if !self.exists() {
            return Ok(());
        }
        self.git().args(["reset", "--hard", "--quiet"]).execute_success().await?;
        self.git().args(["clean", "-fdq"]).execute_success().await
    }

    /// `git status --porcelain` lines.
    pub async fn status(&self) -> Result<Vec<String>, GsyncError> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let output = self.git().args(["status", "--porcelain"]).execute().await?;
        Ok(output.stdout.lines().map(str::to_string).collect())
    }

    /// The url `origin` actually points at.
    pub async fn remote_url(&self) -> Result<Option<String>, GsyncError> {
        if !self.exists() {
            return Ok(None);
        }
        let url = self.git().args(["config", "--get", "remote.origin.url"]).execute_stdout().await?;
        Ok(Some(url).filter(|u| !u.is_empty()))
    }

    /// Commit hash of the checkout, or of `revision` on the remote when not
    /// checked out.
    pub async fn revision_info(&self, revision: Option<&str>) -> Result<String, GsyncError> {
        if self.exists() {
            return self.head().await;
        }
        if let Some(rev) = revision.filter(|r| is_full_hash(r)) {
            return Ok(rev.to_string());
        }
        let reference = revision.unwrap_or("HEAD");
        let output = GitCommand::new()
            .args(["ls-remote", self.url, reference])
            .with_timeout(Some(GIT_FETCH_TIMEOUT))
            .for_node(self.name)
            .execute_stdout()
            .await?;
        output
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().next())
            .map(str::to_string)
            .ok_or_else(|| GsyncError::Checkout {
                node: self.name.to_string(),
                operation: "ls-remote".to_string(),
                reason: format!("{reference} not found in {}", self.url),
            })
    }
}
