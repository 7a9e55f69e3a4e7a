//! Command-line interface for gsync.
//!
//! Each command lives in its own module with a clap `Args` struct and an
//! `execute` method. Commands other than `config` locate the `.gsync` file
//! by searching upwards from the current directory (or take `--config`),
//! build a [`GlobalConfig`](crate::config::GlobalConfig) from it and walk the
//! dependency tree with a [`WorkQueue`](crate::scheduler::WorkQueue).
//!
//! # Commands
//!
//! - `config` - Write a `.gsync` file naming one solution
//! - `sync` - Check out every dependency and run hooks
//! - `runhooks` - Run every hook without syncing
//! - `revinfo` - Print the url (or actual revision) of every dependency
//! - `status` - Show local modifications
//! - `revert` - Discard local modifications
//! - `flatten` - Write one manifest declaring the whole tree
//! - `verify` - Check dependency urls against `allowed_hosts`
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug output
//! - `--quiet` - Suppress all output except errors
//! - `--no-progress` - Disable the progress bar
//! - `--config` - Path to the `.gsync` file
//!
//! `RUST_LOG` takes precedence over `--verbose` and `--quiet`.

mod common;
mod config;
mod flatten;
mod revert;
mod revinfo;
mod runhooks;
mod status;
mod sync;
mod verify;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

pub use common::CommandContext;

/// Settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log filter; `RUST_LOG` overrides it
    pub log_level: String,
    /// Draw progress bars
    pub progress: bool,
    /// Explicit `.gsync` path
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Install the tracing subscriber. Only the first call has an effect.
    pub fn init_logging(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[derive(Parser)]
#[command(
    name = "gsync",
    about = "Check out a tree of git repositories described by DEPS manifests",
    version,
    long_about = "gsync reads the solutions listed in a .gsync file, checks each one out, \
                  follows the dependencies their DEPS manifests declare and runs the hooks \
                  they define."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable the progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    /// Path to the .gsync file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a .gsync file in the current directory
    Config(config::ConfigCommand),

    /// Check out every dependency and run hooks
    Sync(sync::SyncCommand),

    /// Run every hook without syncing
    Runhooks(runhooks::RunhooksCommand),

    /// Print the url of every dependency
    Revinfo(revinfo::RevinfoCommand),

    /// Show local modifications of every dependency
    Status(status::StatusCommand),

    /// Discard local modifications of every dependency
    Revert(revert::RevertCommand),

    /// Write a single manifest declaring the whole tree
    Flatten(flatten::FlattenCommand),

    /// Check dependency urls against allowed_hosts
    Verify(verify::VerifyCommand),
}

impl Cli {
    /// Run the selected command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging();
        self.execute_with_config(config).await
    }

    /// Translate global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        };
        CliConfig {
            log_level: log_level.to_string(),
            progress: !self.no_progress && !self.quiet,
            config_path: self.config.clone(),
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Config(cmd) => cmd.execute(&config).await,
            Commands::Sync(cmd) => cmd.execute(&config).await,
            Commands::Runhooks(cmd) => cmd.execute(&config).await,
            Commands::Revinfo(cmd) => cmd.execute(&config).await,
            Commands::Status(cmd) => cmd.execute(&config).await,
            Commands::Revert(cmd) => cmd.execute(&config).await,
            Commands::Flatten(cmd) => cmd.execute(&config).await,
            Commands::Verify(cmd) => cmd.execute(&config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["gsync", "--quiet", "status"]);
        let config = cli.build_config();
        assert_eq!(config.log_level, "error");
        assert!(!config.progress);

        let cli = Cli::parse_from(["gsync", "sync", "-v", "--config", "/tmp/.gsync"]);
        let config = cli.build_config();
        assert_eq!(config.log_level, "debug");
        assert!(config.progress);
        assert_eq!(config.config_path, Some(PathBuf::from("/tmp/.gsync")));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["gsync", "-v", "-q", "status"]).is_err());
    }

    #[test]
    fn test_command_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
