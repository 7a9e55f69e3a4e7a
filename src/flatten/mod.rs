//! Flattening a dependency tree into one manifest.
//!
//! The flattened manifest declares every dependency of the tree at the top
//! level with its expanded url and effective condition, every variable any
//! parsed manifest declared, and every hook with its working directory
//! resolved relative to the checkout root. It sets `recursedeps = []` so a
//! checkout driven by it never recurses. Feeding the result back in and
//! flattening again gives the same variables and hooks.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::checkout::CheckoutProvider;
use crate::checkout::git::is_full_hash;
use crate::core::GsyncError;
use crate::gn_args::settings_source;
use crate::hooks::{CollectedHook, HookSpec};
use crate::manifest::{CipdPackageDecl, DepDetail, DepEntry, DepType, DepsManifest};
use crate::tree::{DependencyTree, NodeId, NodeKind};
use crate::vars::VarMap;

/// A manifest file that took part in the flattening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepsFileEntry {
    /// Node owning the manifest
    pub name: String,
    /// Manifest file name inside the node
    pub deps_file: String,
    /// Url of the node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Result of flattening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedManifest {
    pub manifest: DepsManifest,
    /// Variables whose value came from a solution's `custom_vars`
    pub overridden_vars: BTreeSet<String>,
    /// Manifests reached through an explicit `recursedeps` chain
    pub deps_files: Vec<DepsFileEntry>,
}

impl FlattenedManifest {
    /// Render as manifest text with an explanatory header.
    pub fn render(&self) -> Result<String, GsyncError> {
        let mut text = String::from("# Flattened by gsync. Do not edit.\n");
        if !self.overridden_vars.is_empty() {
            let names: Vec<&str> = self.overridden_vars.iter().map(String::as_str).collect();
            text.push_str(&format!("# Overridden by custom_vars: {}\n", names.join(", ")));
        }
        text.push('\n');
        text.push_str(&self.manifest.to_toml()?);
        Ok(text)
    }

    /// The deps files list as JSON.
    pub fn deps_files_json(&self) -> Result<String, GsyncError> {
        serde_json::to_string_pretty(&self.deps_files).map_err(|e| GsyncError::Other {
            message: format!("Failed to serialize deps files: {e}"),
        })
    }
}

/// Flattens a walked tree.
pub struct Flattener<'a, P> {
    tree: &'a DependencyTree,
    provider: &'a P,
    pin_all_deps: bool,
}

impl<'a, P: CheckoutProvider> Flattener<'a, P> {
    pub fn new(tree: &'a DependencyTree, provider: &'a P, pin_all_deps: bool) -> Self {
        Self {
            tree,
            provider,
            pin_all_deps,
        }
    }

    /// Build the flattened manifest.
    pub async fn flatten(&self) -> Result<FlattenedManifest, GsyncError> {
        let (vars, overridden_vars) = self.vars()?;
        let hooks = self.tree.collect_hooks(true)?.into_iter().map(flat_hook).collect();
        let pre_deps_hooks = self
            .parsed_nodes()
            .flat_map(|id| self.tree.pre_deps_hooks(id))
            .map(flat_hook)
            .collect();

        let allowed_hosts: BTreeSet<String> = self
            .parsed_nodes()
            .flat_map(|id| self.tree.node(id).allowed_hosts.iter().cloned())
            .collect();

        let mut manifest = DepsManifest {
            allowed_hosts: (!allowed_hosts.is_empty()).then(|| allowed_hosts.into_iter().collect()),
            recursedeps: Some(Vec::new()),
            vars,
            deps: self.deps().await?,
            hooks,
            pre_deps_hooks,
            ..DepsManifest::default()
        };

        if let Some(&solution) = self.tree.solutions().first() {
            let source = self.tree.node(settings_source(self.tree, solution)?);
            if source.gn_args.file.is_some() {
                manifest.gclient_gn_args_file.clone_from(&source.gn_args.file);
                manifest.gclient_gn_args.clone_from(&source.gn_args.args);
            }
        }

        Ok(FlattenedManifest {
            manifest,
            overridden_vars,
            deps_files: self.deps_files(),
        })
    }

    fn parsed_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.tree.walk().into_iter().filter(|&id| {
            let node = self.tree.node(id);
            node.parsed && node.should_process
        })
    }

    /// Global variable table. Two manifests disagreeing on a value is an
    /// error unless a solution's `custom_vars` settles it.
    fn vars(&self) -> Result<(VarMap, BTreeSet<String>), GsyncError> {
        let mut overrides = VarMap::new();
        for &solution in self.tree.solutions() {
            overrides.extend(self.tree.node(solution).custom_vars.clone());
        }

        let mut vars = VarMap::new();
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        let mut overridden = BTreeSet::new();
        for id in self.parsed_nodes() {
            let node = self.tree.node(id);
            for name in &node.declared_vars {
                if overrides.contains_key(name) {
                    overridden.insert(name.clone());
                    continue;
                }
                let Some(value) = node.vars.get(name) else {
                    continue;
                };
                match vars.get(name) {
                    Some(existing) if existing != value => {
                        return Err(GsyncError::configuration(format!(
                            "variable '{name}' is {existing} in {} but {value} in {}",
                            owners.get(name).map_or("?", String::as_str),
                            node.name
                        )));
                    }
                    Some(_) => {}
                    None => {
                        vars.insert(name.clone(), value.clone());
                        owners.insert(name.clone(), node.name.clone());
                    }
                }
            }
        }

        for name in &overridden {
            if let Some(value) = overrides.get(name) {
                vars.insert(name.clone(), value.clone());
            }
        }
        Ok((vars, overridden))
    }

    async fn deps(&self) -> Result<BTreeMap<String, DepEntry>, GsyncError> {
        let mut deps = BTreeMap::new();
        let mut cipd: BTreeMap<String, DepDetail> = BTreeMap::new();

        for id in self.tree.walk() {
            if self.tree.is_solution(id) {
                continue;
            }
            let node = self.tree.node(id);
            let Some(url) = &node.url else {
                continue;
            };

            match &node.kind {
                NodeKind::Git => {
                    let url = if self.pin_all_deps { self.pinned(id).await? } else { url.clone() };
                    let entry = match &node.condition {
                        None => DepEntry::Url(url),
                        Some(condition) => DepEntry::Detailed(DepDetail {
                            url: Some(url),
                            condition: Some(condition.clone()),
                            ..DepDetail::default()
                        }),
                    };
                    deps.insert(node.name.clone(), entry);
                }
                NodeKind::Cipd {
                    package,
                    version,
                    root,
                } => {
                    let group = cipd.entry(root.clone()).or_insert_with(|| DepDetail {
                        condition: node.condition.clone(),
                        dep_type: DepType::Cipd,
                        ..DepDetail::default()
                    });
                    group.packages.push(CipdPackageDecl {
                        package: package.clone(),
                        version: version.clone(),
                    });
                }
            }
        }

        deps.extend(cipd.into_iter().map(|(root, detail)| (root, DepEntry::Detailed(detail))));
        Ok(deps)
    }

    async fn pinned(&self, id: NodeId) -> Result<String, GsyncError> {
        let view = self.tree.node(id).view();
        let Some((repo, revision)) = view.split_url() else {
            return Ok(String::new());
        };
        if revision.is_some_and(is_full_hash) {
            return Ok(view.url.clone().unwrap_or_default());
        }
        let pinned = self.provider.revision_info(&view).await?;
        debug!("Pinned {} to {pinned}", view.name);
        Ok(format!("{repo}@{pinned}"))
    }

    /// Solutions, plus nodes reached by an unbroken chain of explicit
    /// `recursedeps` entries.
    fn deps_files(&self) -> Vec<DepsFileEntry> {
        self.parsed_nodes()
            .filter(|&id| self.reached_by_recursedeps(id))
            .map(|id| {
                let node = self.tree.node(id);
                DepsFileEntry {
                    name: node.name.clone(),
                    deps_file: node.deps_file.clone(),
                    url: node.url.clone(),
                }
            })
            .collect()
    }

    fn reached_by_recursedeps(&self, id: NodeId) -> bool {
        if self.tree.is_solution(id) {
            return true;
        }
        let node = self.tree.node(id);
        let Some(parent) = node.parent else {
            return false;
        };
        let listed = self
            .tree
            .node(parent)
            .recursedeps
            .as_ref()
            .is_some_and(|r| r.contains_key(&node.name));
        listed && self.reached_by_recursedeps(parent)
    }
}

fn flat_hook(hook: CollectedHook) -> HookSpec {
    HookSpec {
        cwd: Some(hook.cwd),
        condition: hook.condition,
        ..hook.spec
    }
}
