//! `gsync status`: show local modifications.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use super::common::CommandContext;
use crate::scheduler::{SyncOptions, WalkMode};

#[derive(Args)]
pub struct StatusCommand {
    /// Number of dependencies queried in parallel
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,
}

impl StatusCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let ctx = CommandContext::load(cli, self.jobs).await?;
        let report = ctx.queue(SyncOptions::for_mode(WalkMode::Status), false)?.run().await?;
        if report.statuses.is_empty() {
            println!("{}", "No local modifications".green());
            return Ok(());
        }
        for (name, lines) in &report.statuses {
            println!("{}", format!("{name}:").bold());
            for line in lines {
                println!("  {line}");
            }
        }
        Ok(())
    }
}
