//! `gsync revert`: discard local modifications in every dependency.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use super::common::CommandContext;
use crate::scheduler::{SyncOptions, WalkMode};

#[derive(Args)]
pub struct RevertCommand {
    /// Number of dependencies reverted in parallel
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,
}

impl RevertCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let ctx = CommandContext::load(cli, self.jobs).await?;
        let report = ctx.queue(SyncOptions::for_mode(WalkMode::Revert), cli.progress)?.run().await?;
        println!("{} {} dependencies", "Reverted".green().bold(), report.processed);
        Ok(())
    }
}
