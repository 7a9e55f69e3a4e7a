//! Shared setup for commands that walk an existing checkout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use super::CliConfig;
use crate::checkout::{FileManifestSource, ScmCheckout};
use crate::config::{ClientConfig, GlobalConfig, find_config};
use crate::core::GsyncError;
use crate::hooks::HookRunner;
use crate::scheduler::{SyncOptions, WorkQueue};
use crate::tree::DependencyTree;
use crate::vars::Value;

/// Loaded configuration of the checkout the command runs in.
#[derive(Debug)]
pub struct CommandContext {
    pub client: ClientConfig,
    pub global: Arc<GlobalConfig>,
    pub config_path: PathBuf,
}

impl CommandContext {
    /// Find and load `.gsync` starting from the current directory.
    pub async fn load(cli: &CliConfig, jobs: Option<usize>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        let (root, config_path) = find_config(&cwd, cli.config_path.as_deref())?;
        let client = ClientConfig::load_from(&config_path).await?;
        let global = GlobalConfig::new(root, &client, jobs)?;
        debug!(
            "Checkout root {} with {} solutions, {} jobs",
            global.root_dir.display(),
            client.solutions.len(),
            global.jobs
        );
        Ok(Self {
            client,
            global: Arc::new(global),
            config_path,
        })
    }

    /// Fresh tree holding the configured solutions.
    pub fn tree(&self) -> Result<DependencyTree, GsyncError> {
        DependencyTree::with_solutions(&self.global, &self.client.solutions)
    }

    /// Work queue over the real checkout.
    pub fn queue(
        &self,
        mut options: SyncOptions,
        progress: bool,
    ) -> Result<WorkQueue<ScmCheckout>> {
        options.jobs = self.global.jobs;
        options.progress = progress;
        Ok(WorkQueue::new(
            self.tree()?,
            Arc::new(ScmCheckout::new(Arc::clone(&self.global))),
            Arc::new(FileManifestSource::new(&self.global.root_dir)),
            HookRunner::new(&self.global.root_dir),
            options,
        ))
    }
}

/// Parse `--revision` values.
///
/// `name@rev` pins dependency `name`; a bare `rev` pins the first solution.
pub fn parse_revisions(
    values: &[String],
    first_solution: Option<&str>,
) -> Result<HashMap<String, String>> {
    let mut revisions = HashMap::new();
    for value in values {
        let (name, revision) = match value.split_once('@') {
            Some((name, revision)) => (name.to_string(), revision),
            None => {
                let name = first_solution.ok_or_else(|| {
                    GsyncError::configuration(format!(
                        "--revision {value} needs a solution to apply to"
                    ))
                })?;
                (name.to_string(), value.as_str())
            }
        };
        if name.is_empty() || revision.is_empty() {
            return Err(GsyncError::configuration(format!(
                "invalid --revision '{value}', expected name@revision"
            ))
            .into());
        }
        revisions.insert(name, revision.to_string());
    }
    Ok(revisions)
}

/// Parse a `key=value` custom variable.
pub fn parse_custom_var(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    let value = match value.trim() {
        "true" | "True" => Value::Bool(true),
        "false" | "False" => Value::Bool(false),
        other => other
            .parse::<i64>()
            .map_or_else(|_| Value::from(other), Value::Int),
    };
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_revisions() {
        let values = vec!["src/a@v1".to_string(), "deadbeef".to_string()];
        let revisions = parse_revisions(&values, Some("src")).unwrap();
        assert_eq!(revisions["src/a"], "v1");
        assert_eq!(revisions["src"], "deadbeef");

        assert!(parse_revisions(&["@v1".to_string()], Some("src")).is_err());
        assert!(parse_revisions(&["v1".to_string()], None).is_err());
    }

    #[test]
    fn test_parse_custom_var() {
        assert_eq!(parse_custom_var("a=true").unwrap(), ("a".to_string(), Value::Bool(true)));
        assert_eq!(parse_custom_var("n = 3").unwrap(), ("n".to_string(), Value::Int(3)));
        assert_eq!(parse_custom_var("s=x y").unwrap(), ("s".to_string(), Value::from("x y")));
        assert!(parse_custom_var("novalue").is_err());
        assert!(parse_custom_var("=1").is_err());
    }
}
