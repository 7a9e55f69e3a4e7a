//! Dependency nodes stored in the tree arena.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::hooks::HookSpec;
use crate::manifest::GnArgsSettings;
use crate::vars::VarMap;

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a node's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Git repository
    Git,
    /// One CIPD package installed under `root`
    Cipd {
        /// Package name
        package: String,
        /// Version, tag or ref
        version: String,
        /// Directory the package is installed into
        root: String,
    },
}

impl NodeKind {
    /// Short name used in reports.
    #[must_use]
    pub const fn scm_name(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Cipd { .. } => "cipd",
        }
    }
}

/// Scheduling state. `Ready` is derived from the requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting for requirements
    Pending,
    /// A worker owns the node
    Running,
    /// Synced and parsed, or skipped
    Done,
}

/// One checkout location.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub id: NodeId,
    /// Posix path relative to the checkout root
    pub name: String,
    pub raw_url: Option<String>,
    /// Expanded url; `None` when disabled
    pub url: Option<String>,
    pub deps_file: String,
    /// `deps_file` was named explicitly in the parent's `recursedeps`
    pub explicit_deps_file: bool,
    pub kind: NodeKind,
    pub managed: bool,

    pub custom_deps: BTreeMap<String, String>,
    pub custom_vars: VarMap,
    pub custom_hooks: Vec<HookSpec>,

    /// Condition combined with every ancestor's
    pub condition: Option<String>,
    pub should_process: bool,

    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Top-level solution this node belongs to
    pub solution: Option<NodeId>,

    pub recursion_override: Option<usize>,
    /// Children allowed to recurse, with optional explicit manifest names
    pub recursedeps: Option<BTreeMap<String, Option<String>>>,

    pub target_os: BTreeSet<String>,
    pub target_cpu: BTreeSet<String>,
    pub use_relative_paths: bool,
    /// The declaring manifest used relative paths
    pub relative: bool,
    pub allowed_hosts: BTreeSet<String>,

    pub hooks: Vec<HookSpec>,
    pub pre_deps_hooks: Vec<HookSpec>,

    /// Resolved variables, replaced once when the manifest is parsed
    pub vars: Arc<VarMap>,
    pub manifest_vars: VarMap,
    /// Variable names declared at or above this node
    pub declared_vars: BTreeSet<String>,
    pub gn_args: GnArgsSettings,

    /// Files touched by the last sync, relative to the root
    pub touched: Vec<String>,
    pub revision: Option<String>,
    /// Checkout failed and was ignored
    pub failed: bool,

    pub parsed: bool,
    pub processed: bool,
    pub pre_hooks_ran: bool,
    pub hooks_ran: bool,
    pub state: NodeState,
}

impl DependencyNode {
    pub(crate) fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            raw_url: None,
            url: None,
            deps_file: crate::constants::DEFAULT_DEPS_FILE.to_string(),
            explicit_deps_file: false,
            kind: NodeKind::Git,
            managed: true,
            custom_deps: BTreeMap::new(),
            custom_vars: VarMap::new(),
            custom_hooks: Vec::new(),
            condition: None,
            should_process: false,
            parent: None,
            children: Vec::new(),
            solution: None,
            recursion_override: None,
            recursedeps: None,
            target_os: BTreeSet::new(),
            target_cpu: BTreeSet::new(),
            use_relative_paths: false,
            relative: false,
            allowed_hosts: BTreeSet::new(),
            hooks: Vec::new(),
            pre_deps_hooks: Vec::new(),
            vars: Arc::new(VarMap::new()),
            manifest_vars: VarMap::new(),
            declared_vars: BTreeSet::new(),
            gn_args: GnArgsSettings::default(),
            touched: Vec::new(),
            revision: None,
            failed: false,
            parsed: false,
            processed: false,
            pre_hooks_ran: false,
            hooks_ran: false,
            state: NodeState::Pending,
        }
    }

    /// Snapshot handed to checkout providers and manifest sources.
    #[must_use]
    pub fn view(&self) -> NodeView {
        NodeView {
            name: self.name.clone(),
            url: self.url.clone(),
            kind: self.kind.clone(),
            deps_file: self.deps_file.clone(),
            explicit_deps_file: self.explicit_deps_file,
            managed: self.managed,
        }
    }
}

/// Owned, lock-free copy of what external collaborators need about a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub name: String,
    pub url: Option<String>,
    pub kind: NodeKind,
    pub deps_file: String,
    pub explicit_deps_file: bool,
    pub managed: bool,
}

impl NodeView {
    /// Split the url into repository and pinned revision (`url@rev`).
    ///
    /// Only an `@` inside the path part counts, so user names in
    /// `https://user@host/...` and `git@host:...` are left alone.
    #[must_use]
    pub fn split_url(&self) -> Option<(&str, Option<&str>)> {
        let url = self.url.as_deref()?;
        let path_start = match url.find("://") {
            Some(i) => url[i + 3..].find('/').map_or(url.len(), |j| i + 3 + j),
            None => match (url.find(':'), url.find('/')) {
                (Some(colon), Some(slash)) if colon < slash => colon,
                (Some(colon), None) => colon,
                _ => 0,
            },
        };
        Some(match url.rfind('@') {
            Some(at) if at > path_start => (&url[..at], Some(&url[at + 1..])),
            _ => (url, None),
        })
    }
}
