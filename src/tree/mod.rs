//! The dependency tree.
//!
//! [`DependencyTree`] owns every node of a checkout in an arena addressed by
//! [`NodeId`]. A synthetic root owns the top-level solutions; manifests add
//! children as they are parsed. The tree enforces name uniqueness, decides
//! how deep manifests are parsed, computes what each node must wait for, and
//! collects hooks once the walk is over.
//!
//! The tree itself is not synchronized. The scheduler keeps it behind one
//! mutex, so the duplicate check and the insertion in [`DependencyTree::add_child`]
//! happen in the same critical section.

pub mod graph;
pub mod node;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::condition::combine;
use crate::config::{GlobalConfig, SolutionSpec};
use crate::constants::{RECURSEDEPS_LIMIT, ROOT_RECURSION_LIMIT};
use crate::core::GsyncError;
use crate::hooks::{CollectedHook, HookSpec};
use crate::manifest::{ChildSpec, ParseContext, ParseResult};
use crate::utils::paths;
use crate::vars::{VarMap, VariableResolver};

pub use graph::RequirementsGraph;
pub use node::{DependencyNode, NodeId, NodeKind, NodeState, NodeView};

/// A dependency url pointing at a host its parent manifest does not allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostViolation {
    /// Offending dependency
    pub name: String,
    /// Its url
    pub url: String,
    /// Host parsed from the url
    pub host: String,
    /// Node whose manifest declared `allowed_hosts`
    pub declared_by: String,
}

/// What adding a declared child does to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Insert,
    Skip,
    Replace(NodeId),
}

/// Arena of dependency nodes rooted at a synthetic node.
#[derive(Debug, Clone)]
pub struct DependencyTree {
    nodes: Vec<DependencyNode>,
    index: HashMap<String, NodeId>,
}

impl DependencyTree {
    /// Id of the synthetic root.
    pub const ROOT: NodeId = NodeId(0);

    /// Create a tree whose root carries the global target sets.
    pub fn new(global: &GlobalConfig) -> Self {
        let mut root = DependencyNode::new(Self::ROOT, "");
        root.target_os = global.target_os.clone();
        root.target_cpu = global.target_cpu.clone();
        root.should_process = true;
        root.parsed = true;
        root.processed = true;
        root.state = NodeState::Done;
        root.vars = Arc::new(
            VariableResolver {
                target_os: &root.target_os,
                target_cpu: &root.target_cpu,
                manifest_vars: &VarMap::new(),
                inherited: &VarMap::new(),
                custom_vars: &VarMap::new(),
            }
            .resolve(),
        );
        Self {
            nodes: vec![root],
            index: HashMap::new(),
        }
    }

    /// Build a tree with every configured solution added.
    pub fn with_solutions(
        global: &GlobalConfig,
        solutions: &[SolutionSpec],
    ) -> Result<Self, GsyncError> {
        let mut tree = Self::new(global);
        for solution in solutions {
            tree.add_solution(solution)?;
        }
        Ok(tree)
    }

    /// Number of dependency nodes, excluding the synthetic root.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the tree has no solutions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> &DependencyNode {
        &self.nodes[id.0]
    }

    /// Mutably borrow a node.
    pub fn node_mut(&mut self, id: NodeId) -> &mut DependencyNode {
        &mut self.nodes[id.0]
    }

    /// Look a node up by name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    /// Top-level solutions in declaration order.
    pub fn solutions(&self) -> &[NodeId] {
        &self.nodes[Self::ROOT.0].children
    }

    /// Whether `id` is a top-level solution.
    pub fn is_solution(&self, id: NodeId) -> bool {
        self.node(id).parent == Some(Self::ROOT)
    }

    /// All nodes in tree order: parents before children, children in
    /// declaration order.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.len());
        let mut stack: Vec<NodeId> = self.solutions().iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        order
    }

    /// `solution -> ... -> node` chain of names.
    pub fn hierarchy(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == Self::ROOT {
                break;
            }
            let node = self.node(node_id);
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.reverse();
        names.join(" -> ")
    }

    /// Add a top-level solution.
    pub fn add_solution(&mut self, spec: &SolutionSpec) -> Result<NodeId, GsyncError> {
        let name = paths::normalize(&spec.name);
        if self.index.contains_key(&name) {
            return Err(GsyncError::configuration(format!(
                "solution '{name}' is declared more than once"
            )));
        }

        let id = NodeId(self.nodes.len());
        let root = self.node(Self::ROOT);
        let mut node = DependencyNode::new(id, name.clone());
        node.raw_url = spec.url.clone();
        node.url = spec.url.clone();
        node.deps_file = spec.deps_file.clone();
        node.managed = spec.managed;
        node.should_process = true;
        node.custom_deps = spec
            .custom_deps
            .iter()
            .map(|(k, v)| (paths::normalize(k), v.clone()))
            .collect();
        node.custom_vars = spec.custom_vars.clone();
        node.custom_hooks = spec.custom_hooks.clone();
        node.parent = Some(Self::ROOT);
        node.solution = Some(id);
        node.target_os = root.target_os.clone();
        node.target_cpu = root.target_cpu.clone();
        node.declared_vars = spec.custom_vars.keys().cloned().collect();
        node.vars = Arc::new(
            VariableResolver {
                target_os: &node.target_os,
                target_cpu: &node.target_cpu,
                manifest_vars: &VarMap::new(),
                inherited: &VarMap::new(),
                custom_vars: &node.custom_vars,
            }
            .resolve(),
        );

        debug!("Adding solution {name}");
        self.insert(node);
        Ok(id)
    }

    /// Add a child declared by `parent`'s manifest.
    ///
    /// Returns `Ok(None)` without adding when a processed node of the same
    /// name exists and either the new one would not be processed or both
    /// urls match. A disabled node of the same name gives way to a processed
    /// declaration. Two processed declarations with different urls are an
    /// error.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        spec: ChildSpec,
    ) -> Result<Option<NodeId>, GsyncError> {
        match self.placement(parent, &spec)? {
            Placement::Skip => {
                debug!(
                    "Dropping duplicate dependency {} from {}",
                    spec.name,
                    self.node(parent).name
                );
                return Ok(None);
            }
            Placement::Replace(disabled) => {
                debug!(
                    "Dependency {} from {} replaces the disabled declaration of {}",
                    spec.name,
                    self.hierarchy(parent),
                    self.hierarchy(disabled)
                );
                self.detach(disabled);
            }
            Placement::Insert => {}
        }

        let should_process = spec.should_process && self.node(parent).should_process;
        let id = NodeId(self.nodes.len());
        let parent_node = self.node(parent);
        let inherited = self.inherited_vars(parent);

        let mut node = DependencyNode::new(id, spec.name);
        node.raw_url = spec.raw_url;
        node.url = spec.url;
        node.kind = spec.kind;
        node.deps_file = spec.deps_file;
        node.explicit_deps_file = spec.explicit_deps_file;
        node.condition = spec.condition;
        node.should_process = should_process;
        node.relative = spec.relative;
        node.parent = Some(parent);
        node.solution = parent_node.solution;
        node.target_os = parent_node.target_os.clone();
        node.target_cpu = parent_node.target_cpu.clone();
        node.declared_vars = parent_node.declared_vars.clone();
        node.vars = Arc::new(
            VariableResolver {
                target_os: &node.target_os,
                target_cpu: &node.target_cpu,
                manifest_vars: &VarMap::new(),
                inherited: &inherited,
                custom_vars: &VarMap::new(),
            }
            .resolve(),
        );

        self.insert(node);
        Ok(Some(id))
    }

    fn insert(&mut self, node: DependencyNode) {
        let id = node.id;
        if let Some(parent) = node.parent {
            self.nodes[parent.0].children.push(id);
        }
        self.index.insert(node.name.clone(), id);
        self.nodes.push(node);
    }

    /// Decide what adding `spec` under `parent` does, without changing the tree.
    fn placement(&self, parent: NodeId, spec: &ChildSpec) -> Result<Placement, GsyncError> {
        let should_process = spec.should_process && self.node(parent).should_process;
        let Some(existing_id) = self.find(&spec.name) else {
            return Ok(Placement::Insert);
        };
        let existing = self.node(existing_id);
        if !existing.should_process {
            return Ok(if should_process {
                Placement::Replace(existing_id)
            } else {
                Placement::Skip
            });
        }
        if !should_process || existing.url == spec.url {
            return Ok(Placement::Skip);
        }
        Err(GsyncError::DuplicateDependency {
            name: spec.name.clone(),
            first_url: existing.url.clone().unwrap_or_default(),
            first_path: self.hierarchy(existing_id),
            second_url: spec.url.clone().unwrap_or_default(),
            second_path: format!("{} -> {}", self.hierarchy(parent), spec.name),
        })
    }

    /// Unlink a disabled node from its parent. Its arena slot stays so a job
    /// still running for it can finish, but walks no longer reach it.
    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            self.nodes[parent.0].children.retain(|&child| child != id);
        }
        if self.find(&self.node(id).name) == Some(id) {
            let name = self.node(id).name.clone();
            self.index.remove(&name);
        }
    }

    /// Check every child of a parse result against the tree and against its
    /// siblings, so a conflict is reported before anything is inserted.
    fn check_children(&self, parent: NodeId, children: &[ChildSpec]) -> Result<(), GsyncError> {
        let parent_enabled = self.node(parent).should_process;
        let mut declared: HashMap<&str, Option<&str>> = HashMap::new();
        for child in children {
            self.placement(parent, child)?;
            if !(child.should_process && parent_enabled) {
                continue;
            }
            match declared.get(child.name.as_str()) {
                Some(&first) if first != child.url.as_deref() => {
                    let path = format!("{} -> {}", self.hierarchy(parent), child.name);
                    return Err(GsyncError::DuplicateDependency {
                        name: child.name.clone(),
                        first_url: first.unwrap_or_default().to_string(),
                        first_path: path.clone(),
                        second_url: child.url.clone().unwrap_or_default(),
                        second_path: path,
                    });
                }
                Some(_) => {}
                None => {
                    declared.insert(&child.name, child.url.as_deref());
                }
            }
        }
        Ok(())
    }

    /// Variables a child of `parent` inherits: names declared at or above
    /// `parent`, with `parent`'s resolved values.
    fn inherited_vars(&self, parent: NodeId) -> VarMap {
        let node = self.node(parent);
        node.declared_vars
            .iter()
            .filter_map(|name| node.vars.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }

    /// How many manifest levels may still be parsed at this node; 0 means
    /// its manifest is not read.
    pub fn recursion_limit(&self, id: NodeId) -> usize {
        if id == Self::ROOT {
            return ROOT_RECURSION_LIMIT;
        }
        let node = self.node(id);
        if let Some(limit) = node.recursion_override {
            return limit;
        }
        let Some(parent) = node.parent else {
            return 0;
        };
        match &self.node(parent).recursedeps {
            Some(allowed) if allowed.contains_key(&node.name) => RECURSEDEPS_LIMIT,
            Some(_) => 0,
            None => self.recursion_limit(parent).saturating_sub(1),
        }
    }

    /// Names that must be `Done` before `id` may start.
    ///
    /// The parent; every other solution for nodes directly under a
    /// solution; and every node whose name is a path prefix of this one, so
    /// nested checkouts wait for the checkout containing them.
    pub fn requirements(&self, id: NodeId) -> BTreeSet<String> {
        let mut requirements = BTreeSet::new();
        let node = self.node(id);
        let Some(parent) = node.parent else {
            return requirements;
        };
        if parent == Self::ROOT {
            return requirements;
        }

        requirements.insert(self.node(parent).name.clone());
        if self.is_solution(parent) {
            for &solution in self.solutions() {
                if solution != parent {
                    requirements.insert(self.node(solution).name.clone());
                }
            }
        }

        let mut current = node.name.as_str();
        while let Some(slash) = current.rfind('/') {
            current = &current[..slash];
            if self.index.contains_key(current) {
                requirements.insert(current.to_string());
            }
        }
        requirements
    }

    /// Pending nodes whose requirements are all `Done`.
    pub fn ready_nodes(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|&id| self.node(id).state == NodeState::Pending)
            .filter(|&id| {
                self.requirements(id).iter().all(|name| {
                    self.find(name).is_none_or(|req| self.node(req).state == NodeState::Done)
                })
            })
            .collect()
    }

    /// Nodes still `Pending`.
    pub fn pending_nodes(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|&id| self.node(id).state == NodeState::Pending)
            .collect()
    }

    /// Requirements of every node as a graph.
    pub fn requirements_graph(&self) -> RequirementsGraph {
        let mut graph = RequirementsGraph::new();
        for id in self.walk() {
            let name = &self.node(id).name;
            graph.add_node(name);
            for required in self.requirements(id) {
                graph.add_requirement(name, &required);
            }
        }
        graph
    }

    /// Everything the manifest parser needs about `id`.
    pub fn parse_context(&self, id: NodeId) -> ParseContext {
        let node = self.node(id);
        let parent = node.parent.unwrap_or(Self::ROOT);
        let is_solution = parent == Self::ROOT;
        let custom_deps = node
            .solution
            .map(|s| self.node(s).custom_deps.clone())
            .unwrap_or_default();

        ParseContext {
            name: node.name.clone(),
            deps_file: node.deps_file.clone(),
            is_solution,
            relative: node.relative,
            condition: node.condition.clone(),
            target_os: node.target_os.clone(),
            target_cpu: node.target_cpu.clone(),
            inherited: if is_solution { VarMap::new() } else { self.inherited_vars(parent) },
            custom_vars: node.custom_vars.clone(),
            custom_deps,
            custom_hooks: if is_solution { node.custom_hooks.clone() } else { Vec::new() },
        }
    }

    /// Store a parse result on `id` and add its children.
    ///
    /// Returns the ids of the children actually added. A conflicting child
    /// leaves the node untouched and unparsed.
    pub fn apply_parse(
        &mut self,
        id: NodeId,
        result: ParseResult,
    ) -> Result<Vec<NodeId>, GsyncError> {
        self.check_children(id, &result.children)?;
        {
            let node = self.node_mut(id);
            node.hooks = result.hooks;
            node.pre_deps_hooks = result.pre_deps_hooks;
            node.allowed_hosts = result.allowed_hosts;
            node.vars = result.vars;
            node.manifest_vars = result.manifest_vars;
            node.declared_vars = result.declared_vars;
            node.recursedeps = result.recursedeps;
            node.recursion_override = result.recursion;
            node.target_os = result.target_os;
            node.target_cpu = result.target_cpu;
            node.use_relative_paths = result.use_relative_paths;
            node.gn_args = result.gn_args;
        }

        let mut added = Vec::new();
        for child in result.children {
            if let Some(child_id) = self.add_child(id, child)? {
                added.push(child_id);
            }
        }
        self.node_mut(id).parsed = true;
        Ok(added)
    }

    /// Record the outcome of a sync. `touched` is relative to the node.
    pub fn record_sync(&mut self, id: NodeId, revision: String, touched: Vec<String>) {
        let node = self.node_mut(id);
        let prefix = node.name.clone();
        node.touched = touched.iter().map(|f| paths::join(&prefix, f)).collect();
        node.revision = Some(revision);
    }

    /// Working directory of a hook declared by `id`, relative to the root.
    pub fn hook_cwd(&self, id: NodeId, hook: &HookSpec) -> String {
        let node = self.node(id);
        let base = if node.use_relative_paths {
            node.name.clone()
        } else if node.relative {
            paths::dirname(&node.name).unwrap_or_else(|| ".".to_string())
        } else {
            ".".to_string()
        };
        match &hook.cwd {
            Some(cwd) => paths::join(&base, cwd),
            None => paths::normalize(&base),
        }
    }

    fn collected(&self, id: NodeId, spec: &HookSpec) -> CollectedHook {
        let node = self.node(id);
        CollectedHook {
            owner: node.name.clone(),
            spec: spec.clone(),
            cwd: self.hook_cwd(id, spec),
            condition: combine(node.condition.as_deref(), spec.condition.as_deref()),
            vars: Arc::clone(&node.vars),
        }
    }

    /// Pre-deps hooks of one node, ready to run.
    pub fn pre_deps_hooks(&self, id: NodeId) -> Vec<CollectedHook> {
        self.node(id)
            .pre_deps_hooks
            .iter()
            .map(|spec| self.collected(id, spec))
            .collect()
    }

    /// Files touched in the subtree rooted at `id`.
    fn subtree_touched(&self, id: NodeId) -> Vec<&str> {
        let mut files = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node(current);
            files.extend(node.touched.iter().map(String::as_str));
            stack.extend(node.children.iter().copied());
        }
        files
    }

    /// Collect post-sync hooks in tree order.
    ///
    /// A hook with a `pattern` is kept only if a file touched in its node's
    /// subtree matches, unless `force` is set.
    pub fn collect_hooks(&self, force: bool) -> Result<Vec<CollectedHook>, GsyncError> {
        let mut hooks = Vec::new();
        for id in self.walk() {
            let node = self.node(id);
            if !node.should_process || !node.parsed {
                continue;
            }
            for spec in &node.hooks {
                if !force {
                    if let Some(pattern) = &spec.pattern {
                        let regex = Regex::new(pattern).map_err(|e| {
                            GsyncError::semantic(&node.name, format!("invalid hook pattern: {e}"))
                        })?;
                        if !self.subtree_touched(id).iter().any(|f| regex.is_match(f)) {
                            debug!(
                                target: "hooks",
                                "Skipping hook '{}': no touched file matches {pattern}",
                                spec.display_name()
                            );
                            continue;
                        }
                    }
                }
                hooks.push(self.collected(id, spec));
            }
        }
        Ok(hooks)
    }

    /// Mark every parsed node's hooks as run.
    pub fn mark_hooks_ran(&mut self) {
        for node in self.nodes.iter_mut().skip(1) {
            if node.parsed && node.should_process {
                node.hooks_ran = true;
            }
        }
    }

    /// Dependency urls outside their declaring manifest's `allowed_hosts`.
    pub fn verify_allowed_hosts(&self) -> Vec<HostViolation> {
        let mut violations = Vec::new();
        for id in self.walk() {
            let node = self.node(id);
            let (Some(parent), Some(url)) = (node.parent, node.url.as_deref()) else {
                continue;
            };
            let declaring = self.node(parent);
            if declaring.allowed_hosts.is_empty() || node.kind != NodeKind::Git {
                continue;
            }
            let host = url_host(url).unwrap_or_default();
            if !declaring.allowed_hosts.contains(host) {
                violations.push(HostViolation {
                    name: node.name.clone(),
                    url: url.to_string(),
                    host: host.to_string(),
                    declared_by: declaring.name.clone(),
                });
            }
        }
        violations
    }

    /// `name -> url` of every processed node, for the entries file.
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.walk()
            .into_iter()
            .map(|id| self.node(id))
            .filter(|node| node.should_process)
            .filter_map(|node| node.url.clone().map(|url| (node.name.clone(), url)))
            .collect()
    }

    /// Names of nodes whose checkout failed and was ignored.
    pub fn failed_nodes(&self) -> Vec<String> {
        self.walk()
            .into_iter()
            .map(|id| self.node(id))
            .filter(|node| node.failed)
            .map(|node| node.name.clone())
            .collect()
    }
}

/// Host part of a git url (`https://host/...` or `user@host:path`).
fn url_host(url: &str) -> Option<&str> {
    if let Some(i) = url.find("://") {
        let authority = url[i + 3..].split('/').next()?;
        let host = authority.rsplit('@').next()?;
        return host.split(':').next();
    }
    let (before_colon, _) = url.split_once(':')?;
    if before_colon.contains('/') {
        return None;
    }
    before_colon.rsplit('@').next()
}
