//! `gsync config`: write a `.gsync` file.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::warn;

use super::CliConfig;
use super::common::parse_custom_var;
use crate::config::{ClientConfig, SolutionSpec, default_cache_dir};
use crate::constants::{CONFIG_FILE_NAME, DEFAULT_DEPS_FILE};
use crate::vars::Value;

#[derive(Args)]
pub struct ConfigCommand {
    /// Url of the solution repository
    url: String,

    /// Checkout directory of the solution; defaults to the repository name
    #[arg(long)]
    name: Option<String>,

    /// Manifest file name inside the solution
    #[arg(long, default_value = DEFAULT_DEPS_FILE)]
    deps_file: String,

    /// Never sync the solution itself
    #[arg(long)]
    unmanaged: bool,

    /// Git mirror cache directory
    #[arg(long, value_name = "DIR", conflicts_with = "default_cache_dir")]
    cache_dir: Option<String>,

    /// Use the platform cache directory for git mirrors
    #[arg(long)]
    default_cache_dir: bool,

    /// Override a manifest variable, e.g. `checkout_nacl=false`
    #[arg(long = "custom-var", value_name = "KEY=VALUE", value_parser = parse_custom_var)]
    custom_vars: Vec<(String, Value)>,

    /// Extra target operating systems
    #[arg(long = "target-os", value_name = "OS")]
    target_os: Vec<String>,
}

impl ConfigCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let path = match &cli.config_path {
            Some(path) => path.clone(),
            None => std::env::current_dir()
                .context("Failed to determine current directory")?
                .join(CONFIG_FILE_NAME),
        };
        let config = self.build()?;
        if path.exists() {
            warn!("Overwriting {}", path.display());
        }
        config.save_to(&path)?;
        println!(
            "{} {} with solution {}",
            "Wrote".green(),
            path.display(),
            config.solutions[0].name.bold()
        );
        Ok(())
    }

    fn build(&self) -> Result<ClientConfig> {
        let name = match &self.name {
            Some(name) => name.clone(),
            None => solution_name(&self.url)?,
        };
        let mut solution = SolutionSpec::new(name, self.url.clone());
        solution.managed = !self.unmanaged;
        solution.deps_file.clone_from(&self.deps_file);
        solution.custom_vars = self.custom_vars.iter().cloned().collect();

        let cache_dir = if self.default_cache_dir {
            Some(default_cache_dir()?.display().to_string())
        } else {
            self.cache_dir.clone()
        };

        let config = ClientConfig {
            cache_dir,
            target_os: self.target_os.clone(),
            solutions: vec![solution],
            ..ClientConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

/// Repository name of `url`: the last path component without `.git`.
fn solution_name(url: &str) -> Result<String> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .map(|s| s.trim_end_matches(".git"))
        .filter(|s| !s.is_empty())
        .with_context(|| format!("Cannot derive a solution name from {url}; pass --name"))?;
    Ok(last.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(url: &str) -> ConfigCommand {
        ConfigCommand {
            url: url.to_string(),
            name: None,
            deps_file: DEFAULT_DEPS_FILE.to_string(),
            unmanaged: false,
            cache_dir: None,
            default_cache_dir: false,
            custom_vars: Vec::new(),
            target_os: Vec::new(),
        }
    }

    #[test]
    fn test_solution_name() {
        assert_eq!(solution_name("https://example.com/chromium/src.git").unwrap(), "src");
        assert_eq!(solution_name("https://example.com/tools/").unwrap(), "tools");
        assert_eq!(solution_name("git@example.com:infra.git").unwrap(), "infra");
        assert!(solution_name("/").is_err());
    }

    #[test]
    fn test_build() {
        let mut cmd = command("https://example.com/src.git");
        cmd.unmanaged = true;
        cmd.custom_vars.push(("checkout_nacl".to_string(), Value::Bool(false)));
        cmd.target_os.push("android".to_string());
        let config = cmd.build().unwrap();
        assert_eq!(config.solutions[0].name, "src");
        assert!(!config.solutions[0].managed);
        assert_eq!(config.solutions[0].custom_vars["checkout_nacl"], Value::Bool(false));
        assert_eq!(config.target_os, ["android"]);
    }

    #[test]
    fn test_written_file_loads_back() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        let mut cmd = command("https://example.com/src.git");
        cmd.cache_dir = Some("/tmp/cache".to_string());
        cmd.build().unwrap().save_to(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let loaded = ClientConfig::from_toml(&text).unwrap();
        assert_eq!(loaded.cache_dir.as_deref(), Some("/tmp/cache"));
        assert_eq!(loaded.solutions[0].url.as_deref(), Some("https://example.com/src.git"));
    }
}
