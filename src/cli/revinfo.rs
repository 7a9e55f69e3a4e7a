//! `gsync revinfo`: print where every dependency comes from.

use anyhow::Result;
use clap::Args;

use super::CliConfig;
use super::common::CommandContext;
use crate::scheduler::{SyncOptions, WalkMode};

#[derive(Args)]
pub struct RevinfoCommand {
    /// Print the checked-out revision instead of the declared url
    #[arg(short, long)]
    actual: bool,

    /// Number of dependencies queried in parallel
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,
}

impl RevinfoCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let ctx = CommandContext::load(cli, self.jobs).await?;
        let options = SyncOptions {
            actual: self.actual,
            ..SyncOptions::for_mode(WalkMode::Revinfo)
        };
        let report = ctx.queue(options, false)?.run().await?;
        for (name, url) in &report.revisions {
            println!("{name}: {url}");
        }
        Ok(())
    }
}
