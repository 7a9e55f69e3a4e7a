//! gsync CLI entry point.
//!
//! Parses arguments, runs the command and renders failures through
//! [`user_friendly_error`]. Hook failures exit with their own status code so
//! scripts can tell them apart from checkout errors.

use clap::Parser;
use gsync_cli::cli;
use gsync_cli::core::{exit_code_for, user_friendly_error};

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    if let Err(e) = cli.execute().await {
        let code = exit_code_for(&e);
        user_friendly_error(e).display();
        std::process::exit(code);
    }
}
