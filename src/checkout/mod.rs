//! Checkout providers and manifest sources.
//!
//! The scheduler never runs git or cipd directly. It talks to a
//! [`CheckoutProvider`], which brings one node's files to disk and answers
//! questions about them, and to a [`ManifestSource`], which reads the node's
//! manifest text afterwards. [`ScmCheckout`] and [`FileManifestSource`] are
//! the production implementations; tests substitute in-memory fakes.

pub mod cipd;
pub mod command_builder;
pub mod git;
pub mod lock;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::constants::DEFAULT_DEPS_FILE;
use crate::core::GsyncError;
use crate::tree::{NodeKind, NodeView};

pub use command_builder::{GitCommand, GitCommandOutput};
pub use git::GitCheckout;
pub use lock::CacheLock;

/// Outcome of syncing one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    /// Revision the node ended up at
    pub revision: String,
    /// Files that changed, relative to the node's directory
    pub touched: Vec<String>,
}

/// Brings dependencies to disk and inspects them.
pub trait CheckoutProvider: Send + Sync {
    /// Sync `node` to `revision`, or to the revision pinned in its url.
    fn sync(
        &self,
        node: &NodeView,
        revision: Option<&str>,
    ) -> impl Future<Output = Result<SyncResult, GsyncError>> + Send;

    /// Throw away local modifications.
    fn revert(&self, node: &NodeView) -> impl Future<Output = Result<(), GsyncError>> + Send;

    /// Local modifications, one line per file.
    fn status(&self, node: &NodeView)
    -> impl Future<Output = Result<Vec<String>, GsyncError>> + Send;

    /// Where the checkout actually points, if it exists.
    fn actual_remote_url(
        &self,
        node: &NodeView,
    ) -> impl Future<Output = Result<Option<String>, GsyncError>> + Send;

    /// Revision the node is (or would be) at.
    fn revision_info(&self, node: &NodeView)
    -> impl Future<Output = Result<String, GsyncError>> + Send;
}

/// Reads manifests of synced nodes.
pub trait ManifestSource: Send + Sync {
    /// Manifest text of `node`, or `None` when it has none.
    fn read_manifest(&self, node: &NodeView) -> Result<Option<String>, GsyncError>;
}

fn missing_url(node: &NodeView, operation: &str) -> GsyncError {
    GsyncError::Checkout {
        node: node.name.clone(),
        operation: operation.to_string(),
        reason: "dependency has no url".to_string(),
    }
}

/// Git and CIPD checkouts under the client root.
#[derive(Debug, Clone)]
pub struct ScmCheckout {
    global: Arc<GlobalConfig>,
}

impl ScmCheckout {
    pub fn new(global: Arc<GlobalConfig>) -> Self {
        Self { global }
    }

    fn git<'a>(
        &'a self,
        node: &'a NodeView,
        operation: &str,
    ) -> Result<(GitCheckout<'a>, Option<&'a str>), GsyncError> {
        let (url, revision) = node.split_url().ok_or_else(|| missing_url(node, operation))?;
        Ok((
            GitCheckout::new(
                &self.global.root_dir,
                &node.name,
                url,
                self.global.cache_dir.as_deref(),
            ),
            revision,
        ))
    }
}

impl CheckoutProvider for ScmCheckout {
    async fn sync(
        &self,
        node: &NodeView,
        revision: Option<&str>,
    ) -> Result<SyncResult, GsyncError> {
        match &node.kind {
            NodeKind::Git => {
                let (checkout, pinned) = self.git(node, "sync")?;
                checkout.sync(revision.or(pinned)).await
            }
            NodeKind::Cipd {
                package,
                version,
                root,
            } => {
                cipd::install(&self.global.root_dir, &node.name, package, version, root).await?;
                Ok(SyncResult {
                    revision: version.clone(),
                    touched: Vec::new(),
                })
            }
        }
    }

    async fn revert(&self, node: &NodeView) -> Result<(), GsyncError> {
        match &node.kind {
            NodeKind::Git => self.git(node, "revert")?.0.revert().await,
            NodeKind::Cipd { .. } => Ok(()),
        }
    }

    async fn status(&self, node: &NodeView) -> Result<Vec<String>, GsyncError> {
        match &node.kind {
            NodeKind::Git => self.git(node, "status")?.0.status().await,
            NodeKind::Cipd { .. } => Ok(Vec::new()),
        }
    }

    async fn actual_remote_url(&self, node: &NodeView) -> Result<Option<String>, GsyncError> {
        match &node.kind {
            NodeKind::Git => self.git(node, "remote")?.0.remote_url().await,
            NodeKind::Cipd { .. } => Ok(None),
        }
    }

    async fn revision_info(&self, node: &NodeView) -> Result<String, GsyncError> {
        match &node.kind {
            NodeKind::Git => {
                let (checkout, pinned) = self.git(node, "revinfo")?;
                checkout.revision_info(pinned).await
            }
            NodeKind::Cipd { version, .. } => Ok(version.clone()),
        }
    }
}

/// Reads `<root>/<name>/<deps_file>`, falling back to `DEPS`.
#[derive(Debug, Clone)]
pub struct FileManifestSource {
    root_dir: PathBuf,
}

impl FileManifestSource {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }
}

impl ManifestSource for FileManifestSource {
    fn read_manifest(&self, node: &NodeView) -> Result<Option<String>, GsyncError> {
        let dir = self.root_dir.join(&node.name);
        let mut candidates = vec![node.deps_file.clone()];
        if node.deps_file != DEFAULT_DEPS_FILE {
            candidates.push(DEFAULT_DEPS_FILE.to_string());
        }

        for candidate in &candidates {
            let path = dir.join(candidate);
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    tracing::debug!("Read manifest {}", path.display());
                    return Ok(Some(text));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(GsyncError::Io {
                        message: format!("failed to read {}: {e}", path.display()),
                    });
                }
            }
        }

        if node.explicit_deps_file {
            return Err(GsyncError::ManifestNotFound {
                node: node.name.clone(),
                candidates: candidates.join(", "),
            });
        }
        Ok(None)
    }
}
