//! `gsync runhooks`: run every hook of the current checkout.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use super::common::CommandContext;
use crate::scheduler::{SyncOptions, WalkMode};

#[derive(Args)]
pub struct RunhooksCommand {
    /// Number of manifests parsed in parallel
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,
}

impl RunhooksCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let ctx = CommandContext::load(cli, self.jobs).await?;
        let report = ctx
            .queue(SyncOptions::for_mode(WalkMode::RunHooks), cli.progress)?
            .run()
            .await?;
        println!("{} {} hooks", "Ran".green().bold(), report.hooks_run);
        Ok(())
    }
}
