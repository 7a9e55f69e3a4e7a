//! Dependency manifest (`DEPS`) format.
//!
//! Every checked-out node may carry a TOML manifest declaring its own
//! dependencies, variables, hooks and recursion settings. This module holds
//! the serde data model; [`parser`] turns a parsed manifest into child
//! specifications for the dependency tree.
//!
//! # Format
//!
//! ```toml
//! use_relative_paths = false
//! recursion = 2
//! allowed_hosts = ["chromium.googlesource.com"]
//! target_os = ["android"]
//! recursedeps = ["src/a", { name = "src/b", deps_file = "DEPS.alt" }]
//! gclient_gn_args_file = "src/build/config/gclient_args.gni"
//! gclient_gn_args = ["checkout_android"]
//!
//! [vars]
//! a_revision = "deadbeef"
//!
//! [deps]
//! "src/a" = "https://example.com/a.git@{a_revision}"
//! "src/b" = { url = "https://example.com/b.git", condition = "checkout_linux" }
//! "src/tools" = { dep_type = "cipd", packages = [{ package = "infra/tool", version = "latest" }] }
//!
//! [[hooks]]
//! name = "lint"
//! pattern = "\\.py$"
//! action = ["python3", "src/tools/lint.py"]
//! ```
//!
//! A dependency whose table has no `url` is kept in the tree but never
//! checked out.

pub mod parser;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::GsyncError;
use crate::hooks::HookSpec;
use crate::vars::VarMap;

pub use parser::{ChildSpec, GnArgsSettings, ManifestParser, ParseContext, ParseResult};

/// A parsed dependency manifest.
///
/// Field order matters for serialization: plain values come before tables so
/// the flattened manifest renders as valid TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepsManifest {
    /// Child names and `recursedeps` entries are relative to this node
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub use_relative_paths: bool,

    /// Explicit recursion limit for this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursion: Option<usize>,

    /// Hosts child urls may point at; absent means unrestricted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_hosts: Option<Vec<String>>,

    /// Extra target operating systems for this subtree
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_os: Vec<String>,

    /// Extra target CPUs for this subtree
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_cpu: Vec<String>,

    /// Children whose manifests should be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursedeps: Option<Vec<RecurseDep>>,

    /// File the GN args are written to after sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gclient_gn_args_file: Option<String>,

    /// Variables written to the GN args file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gclient_gn_args: Vec<String>,

    /// Take the GN args settings from this dependency instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gclient_gn_args_from: Option<String>,

    /// Declared variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: VarMap,

    /// Child dependencies keyed by checkout path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deps: BTreeMap<String, DepEntry>,

    /// Hooks run after the whole tree is synced
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<HookSpec>,

    /// Hooks run after this node is synced and before its children
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_deps_hooks: Vec<HookSpec>,
}

impl DepsManifest {
    /// Parse manifest text; empty text is an empty manifest.
    pub fn from_toml(node: &str, file: &str, text: &str) -> Result<Self, GsyncError> {
        toml::from_str(text).map_err(|e| GsyncError::ManifestSyntax {
            node: node.to_string(),
            file: file.to_string(),
            reason: e.to_string(),
        })
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, GsyncError> {
        toml::to_string_pretty(self).map_err(|e| GsyncError::Other {
            message: format!("Failed to serialize manifest: {e}"),
        })
    }
}

/// One `[deps]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DepEntry {
    /// Plain url, optionally suffixed with `@revision`
    Url(String),
    /// Table form
    Detailed(DepDetail),
}

impl DepEntry {
    /// Normalize into the table form.
    #[must_use]
    pub fn into_detail(self) -> DepDetail {
        match self {
            Self::Url(url) => DepDetail {
                url: Some(url),
                ..DepDetail::default()
            },
            Self::Detailed(detail) => detail,
        }
    }
}

/// Table form of a dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepDetail {
    /// Url template; absent means the entry is never checked out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Condition gating the checkout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Kind of dependency
    #[serde(default, skip_serializing_if = "DepType::is_git")]
    pub dep_type: DepType,

    /// Packages installed under this path (`cipd` only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<CipdPackageDecl>,
}

/// Source a dependency is fetched from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepType {
    /// Git repository
    #[default]
    Git,
    /// CIPD packages
    Cipd,
}

impl DepType {
    #[allow(clippy::trivially_copy_pass_by_ref)]
    const fn is_git(&self) -> bool {
        matches!(self, Self::Git)
    }
}

/// A CIPD package pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CipdPackageDecl {
    /// Package name, may contain `{var}` placeholders
    pub package: String,
    /// Version, tag or ref
    pub version: String,
}

/// A `recursedeps` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecurseDep {
    /// Recurse using the child's default manifest
    Name(String),
    /// Recurse using an explicit manifest file
    Detailed {
        /// Dependency name
        name: String,
        /// Manifest file name inside the dependency
        deps_file: String,
    },
}
