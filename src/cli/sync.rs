//! `gsync sync`: check out the whole tree.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};

use super::CliConfig;
use super::common::{CommandContext, parse_revisions};
use crate::entries::{EntriesFile, delete_unversioned_trees};
use crate::scheduler::{RunReport, SyncOptions, WalkMode};
use crate::tree::DependencyTree;
use crate::utils::atomic_write;

#[derive(Args)]
pub struct SyncCommand {
    /// Number of dependencies processed in parallel
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Do not run hooks
    #[arg(long)]
    nohooks: bool,

    /// Pin a dependency: `name@rev`, or `rev` for the first solution
    #[arg(long = "revision", value_name = "REV")]
    revisions: Vec<String>,

    /// Keep going when a checkout fails
    #[arg(long)]
    ignore_errors: bool,

    /// Run hooks even when no touched file matches their pattern
    #[arg(short, long)]
    force: bool,

    /// Delete directories of dependencies no longer declared
    #[arg(long)]
    delete_unversioned_trees: bool,

    /// Write a JSON report of the checkout to this path
    #[arg(long, value_name = "PATH")]
    output_json: Option<PathBuf>,
}

/// One entry of the `--output-json` report.
#[derive(Debug, Serialize)]
struct NodeReport {
    url: Option<String>,
    scm: &'static str,
    revision: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    failed: bool,
}

#[derive(Debug, Serialize)]
struct JsonReport {
    solutions: Vec<String>,
    dependencies: BTreeMap<String, NodeReport>,
    hooks_run: usize,
    gn_args_files: Vec<String>,
    removed_entries: Vec<String>,
}

impl JsonReport {
    fn new(tree: &DependencyTree, report: &RunReport, removed: Vec<String>) -> Self {
        let dependencies = tree
            .walk()
            .into_iter()
            .map(|id| tree.node(id))
            .filter(|node| node.processed && node.should_process)
            .map(|node| {
                (
                    node.name.clone(),
                    NodeReport {
                        url: node.url.clone(),
                        scm: node.kind.scm_name(),
                        revision: node.revision.clone(),
                        failed: node.failed,
                    },
                )
            })
            .collect();
        Self {
            solutions: tree.solutions().iter().map(|&id| tree.node(id).name.clone()).collect(),
            dependencies,
            hooks_run: report.hooks_run,
            gn_args_files: report.gn_args_files.clone(),
            removed_entries: removed,
        }
    }
}

impl SyncCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let ctx = CommandContext::load(cli, self.jobs).await?;
        let first_solution = ctx.client.solutions.first().map(|s| s.name.as_str());

        let options = SyncOptions {
            nohooks: self.nohooks,
            force: self.force,
            ignore_errors: self.ignore_errors,
            revisions: parse_revisions(&self.revisions, first_solution)?,
            ..SyncOptions::for_mode(WalkMode::Sync)
        };
        let queue = ctx.queue(options, cli.progress)?;
        let report = queue.run().await?;
        let tree = queue.into_tree();

        let root = &ctx.global.root_dir;
        let previous = EntriesFile::load(root)?;
        let current = EntriesFile::from_tree(&tree);
        let removed = current.removed_since(&previous);
        if !removed.is_empty() {
            if self.delete_unversioned_trees {
                for dir in delete_unversioned_trees(root, &removed, &current)? {
                    println!("{} {}", "Deleted".yellow(), dir.display());
                }
            } else {
                for name in &removed {
                    warn!(
                        "{name} is no longer part of the checkout; \
                         pass --delete-unversioned-trees to remove it"
                    );
                }
            }
        }
        current.save(root)?;

        if let Some(path) = &self.output_json {
            let json = serde_json::to_string_pretty(&JsonReport::new(&tree, &report, removed))
                .context("Failed to serialize sync report")?;
            atomic_write(path, json.as_bytes())?;
            info!("Wrote {}", path.display());
        }

        for name in &report.failed {
            eprintln!("{} {name} failed to sync", "warning:".yellow().bold());
        }
        println!(
            "{} {} dependencies, ran {} hooks",
            "Synced".green().bold(),
            report.processed,
            report.hooks_run
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalConfig, SolutionSpec};
    use crate::hooks::HookRunner;
    use crate::scheduler::WorkQueue;
    use crate::test_utils::{FakeCheckout, MemoryManifestSource};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_json_report_lists_processed_nodes() {
        let temp = tempfile::TempDir::new().unwrap();
        let tree = DependencyTree::with_solutions(
            &GlobalConfig::for_root(temp.path()),
            &[SolutionSpec::new("src", "https://example/src.git")],
        )
        .unwrap();
        let source = MemoryManifestSource::new().with(
            "src",
            "[deps]\n\"src/a\" = \"https://example/a.git\"\n\"src/off\" = { url = \"https://example/off.git\", condition = \"False\" }\n",
        );
        let queue = WorkQueue::new(
            tree,
            Arc::new(FakeCheckout::new().failing("src/a")),
            Arc::new(source),
            HookRunner::new(temp.path()),
            SyncOptions {
                ignore_errors: true,
                ..SyncOptions::default()
            },
        );
        let report = queue.run().await.unwrap();
        let tree = queue.into_tree();

        let json = JsonReport::new(&tree, &report, vec!["src/old".to_string()]);
        assert_eq!(json.solutions, ["src"]);
        assert_eq!(json.dependencies.len(), 2);
        assert!(json.dependencies["src/a"].failed);
        assert_eq!(
            json.dependencies["src"].revision.as_deref(),
            Some(FakeCheckout::revision_for("src").as_str())
        );

        let value = serde_json::to_value(&json).unwrap();
        assert_eq!(value["dependencies"]["src"]["scm"], "git");
        assert!(value["dependencies"]["src"].get("failed").is_none());
        assert_eq!(value["removed_entries"][0], "src/old");
    }
}
