//! In-memory checkout provider and manifest source.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::checkout::{CheckoutProvider, ManifestSource, SyncResult};
use crate::core::GsyncError;
use crate::tree::NodeView;

/// One call to [`FakeCheckout::sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub name: String,
    pub revision: Option<String>,
    /// Logical clock value when the sync started
    pub started: u64,
    /// Logical clock value when the sync finished
    pub finished: u64,
    /// Whether the marker file existed when the sync started
    pub marker_present: bool,
}

/// Checkout provider that records calls instead of touching disk.
#[derive(Debug, Default)]
pub struct FakeCheckout {
    clock: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    events: Mutex<Vec<SyncEvent>>,
    reverted: Mutex<Vec<String>>,
    delay: Option<Duration>,
    node_delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    touched: HashMap<String, Vec<String>>,
    statuses: HashMap<String, Vec<String>>,
    marker: Option<PathBuf>,
}

impl FakeCheckout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every sync.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep this long inside the sync of `name`, overriding any global delay.
    #[must_use]
    pub fn with_node_delay(mut self, name: &str, delay: Duration) -> Self {
        self.node_delays.insert(name.to_string(), delay);
        self
    }

    /// Make syncing `name` fail with a checkout error.
    #[must_use]
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Report `files` as touched when `name` syncs.
    #[must_use]
    pub fn touching(mut self, name: &str, files: &[&str]) -> Self {
        self.touched.insert(name.to_string(), files.iter().map(|f| (*f).to_string()).collect());
        self
    }

    /// Report `lines` as local modifications of `name`.
    #[must_use]
    pub fn with_status(mut self, name: &str, lines: &[&str]) -> Self {
        self.statuses.insert(name.to_string(), lines.iter().map(|l| (*l).to_string()).collect());
        self
    }

    /// Record whether `path` exists at the start of every sync.
    #[must_use]
    pub fn with_marker(mut self, path: impl Into<PathBuf>) -> Self {
        self.marker = Some(path.into());
        self
    }

    /// Every sync so far, in completion order.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Sync events keyed by node name.
    pub fn events_by_name(&self) -> BTreeMap<String, SyncEvent> {
        self.events().into_iter().map(|e| (e.name.clone(), e)).collect()
    }

    /// Names of reverted nodes.
    pub fn reverted(&self) -> Vec<String> {
        self.reverted.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Highest number of syncs running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Deterministic 40-hex revision for a node name.
    pub fn revision_for(name: &str) -> String {
        let hash = name
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3)
            });
        format!("{hash:016x}{hash:016x}{:08x}", hash as u32)
    }
}

impl CheckoutProvider for FakeCheckout {
    async fn sync(
        &self,
        node: &NodeView,
        revision: Option<&str>,
    ) -> Result<SyncResult, GsyncError> {
        let started = self.clock.fetch_add(1, Ordering::SeqCst);
        let marker_present = self.marker.as_ref().is_some_and(|m| m.exists());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        match self.node_delays.get(&node.name).copied().or(self.delay) {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let finished = self.clock.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(&node.name) {
            return Err(GsyncError::Checkout {
                node: node.name.clone(),
                operation: "sync".to_string(),
                reason: "simulated failure".to_string(),
            });
        }

        let pinned = node.split_url().and_then(|(_, rev)| rev);
        let revision = revision.or(pinned).map(str::to_string);
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(SyncEvent {
            name: node.name.clone(),
            revision: revision.clone(),
            started,
            finished,
            marker_present,
        });

        Ok(SyncResult {
            revision: revision.unwrap_or_else(|| Self::revision_for(&node.name)),
            touched: self.touched.get(&node.name).cloned().unwrap_or_default(),
        })
    }

    async fn revert(&self, node: &NodeView) -> Result<(), GsyncError> {
        self.reverted.lock().unwrap_or_else(PoisonError::into_inner).push(node.name.clone());
        Ok(())
    }

    async fn status(&self, node: &NodeView) -> Result<Vec<String>, GsyncError> {
        Ok(self.statuses.get(&node.name).cloned().unwrap_or_default())
    }

    async fn actual_remote_url(&self, node: &NodeView) -> Result<Option<String>, GsyncError> {
        Ok(node.split_url().map(|(url, _)| url.to_string()))
    }

    async fn revision_info(&self, node: &NodeView) -> Result<String, GsyncError> {
        Ok(Self::revision_for(&node.name))
    }
}

/// Manifest texts keyed by node name.
#[derive(Debug, Default)]
pub struct MemoryManifestSource {
    manifests: Mutex<HashMap<String, String>>,
}

impl MemoryManifestSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a manifest for `name`.
    #[must_use]
    pub fn with(self, name: &str, text: &str) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&self, name: &str, text: &str) {
        self.manifests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), text.to_string());
    }
}

impl ManifestSource for MemoryManifestSource {
    fn read_manifest(&self, node: &NodeView) -> Result<Option<String>, GsyncError> {
        let manifests = self.manifests.lock().unwrap_or_else(PoisonError::into_inner);
        match manifests.get(&node.name) {
            Some(text) => Ok(Some(text.clone())),
            None if node.explicit_deps_file => Err(GsyncError::ManifestNotFound {
                node: node.name.clone(),
                candidates: node.deps_file.clone(),
            }),
            None => Ok(None),
        }
    }
}
