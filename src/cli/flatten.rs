//! `gsync flatten`: write one manifest declaring the whole tree.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::CliConfig;
use super::common::CommandContext;
use crate::checkout::ScmCheckout;
use crate::flatten::Flattener;
use crate::scheduler::{SyncOptions, WalkMode};
use crate::utils::atomic_write;

#[derive(Args)]
pub struct FlattenCommand {
    /// Pin every git dependency to its current revision
    #[arg(long)]
    pin_all_deps: bool,

    /// Write the manifest here instead of stdout
    #[arg(long, value_name = "PATH")]
    output_deps: Option<PathBuf>,

    /// Write the list of manifests that were flattened, as JSON
    #[arg(long, value_name = "PATH")]
    output_deps_files: Option<PathBuf>,

    /// Number of manifests parsed in parallel
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,
}

impl FlattenCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let ctx = CommandContext::load(cli, self.jobs).await?;
        let queue = ctx.queue(SyncOptions::for_mode(WalkMode::Flatten), false)?;
        queue.run().await?;
        let tree = queue.into_tree();

        let provider = ScmCheckout::new(Arc::clone(&ctx.global));
        let flat = Flattener::new(&tree, &provider, self.pin_all_deps).flatten().await?;
        let text = flat.render()?;

        match &self.output_deps {
            Some(path) => {
                atomic_write(path, text.as_bytes())?;
                info!("Wrote {}", path.display());
            }
            None => print!("{text}"),
        }
        if let Some(path) = &self.output_deps_files {
            atomic_write(path, flat.deps_files_json()?.as_bytes())?;
            info!("Wrote {}", path.display());
        }
        Ok(())
    }
}
