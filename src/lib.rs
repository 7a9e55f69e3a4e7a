//! gsync - recursive checkout of git repositories described by DEPS manifests
//!
//! A checkout is configured by a `.gsync` file naming one or more top-level
//! *solutions*. Each solution, and every dependency reached from it, may carry
//! a TOML manifest (`DEPS`) declaring further dependencies, variables, hooks
//! and recursion settings. gsync grows a dependency tree from those manifests
//! while syncing it in parallel, then runs the declared hooks.
//!
//! # Architecture Overview
//!
//! - The tree is an arena of [`tree::DependencyNode`]s addressed by
//!   [`tree::NodeId`]; node names are posix paths relative to the checkout
//!   root and are unique across the tree.
//! - [`manifest::ManifestParser`] turns a manifest into child specifications,
//!   resolving variables ([`vars`]) and conditions ([`condition`]) in the
//!   context of the declaring node.
//! - [`scheduler::WorkQueue`] runs a bounded pool of tokio tasks. A node is
//!   admitted once the nodes it requires are done, so parents always finish
//!   before their children start.
//! - [`checkout::CheckoutProvider`] abstracts the version control work; the
//!   real implementation drives `git` (with a shared mirror cache) and `cipd`.
//! - [`hooks::HookRunner`] runs post-sync and pre-deps hooks sequentially.
//! - [`flatten::Flattener`] folds the tree into a single manifest.
//!
//! # Core Modules
//!
//! - [`cli`] - Command-line interface
//! - [`config`] - `.gsync` client configuration and [`config::GlobalConfig`]
//! - [`core`] - Error types and user-facing error rendering
//! - [`constants`] - Limits, timeouts and file names
//!
//! ## Manifests
//! - [`manifest`] - Manifest data model and parser
//! - [`vars`] - Variable values, builtins and `{var}` substitution
//! - [`condition`] - Condition expression evaluator
//!
//! ## Checkout
//! - [`tree`] - Dependency tree arena and requirement tracking
//! - [`scheduler`] - Parallel walk over the tree
//! - [`checkout`] - Git and CIPD providers, manifest sources
//! - [`hooks`] - Hook collection and execution
//!
//! ## Outputs
//! - [`entries`] - The `.gsync_entries` record of the last sync
//! - [`gn_args`] - GN args files
//! - [`flatten`] - Flattened manifests
//!
//! ## Supporting Modules
//! - [`utils`] - Paths, atomic writes, platform helpers and progress display
//!
//! # Example
//!
//! ```bash
//! gsync config https://example.com/src.git
//! gsync sync --jobs 16
//! gsync flatten --pin-all-deps --output-deps DEPS.flat
//! ```

pub mod checkout;
pub mod cli;
pub mod condition;
pub mod config;
pub mod constants;
pub mod core;
pub mod entries;
pub mod flatten;
pub mod gn_args;
pub mod hooks;
pub mod manifest;
pub mod scheduler;
pub mod tree;
pub mod utils;
pub mod vars;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
