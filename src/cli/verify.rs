//! `gsync verify`: check dependency urls against `allowed_hosts`.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use super::common::CommandContext;
use crate::core::GsyncError;
use crate::scheduler::{SyncOptions, WalkMode};

#[derive(Args)]
pub struct VerifyCommand {
    /// Number of manifests parsed in parallel
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,
}

impl VerifyCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let ctx = CommandContext::load(cli, self.jobs).await?;
        let queue = ctx.queue(SyncOptions::for_mode(WalkMode::Flatten), false)?;
        queue.run().await?;
        let violations = queue.into_tree().verify_allowed_hosts();

        if violations.is_empty() {
            println!("{}", "All dependency hosts are allowed".green());
            return Ok(());
        }
        for v in &violations {
            eprintln!(
                "{} {} ({}) uses host {}, not in allowed_hosts of {}",
                "error:".red().bold(),
                v.name,
                v.url,
                v.host.bold(),
                v.declared_by
            );
        }
        Err(GsyncError::configuration(format!(
            "{} dependencies use hosts outside allowed_hosts",
            violations.len()
        ))
        .into())
    }
}
