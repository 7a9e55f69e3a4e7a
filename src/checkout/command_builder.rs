//! Builder for git subprocesses.
//!
//! Every git invocation goes through [`GitCommand`] so that timeouts,
//! working-directory handling, logging and error mapping stay uniform. The
//! child is spawned with `kill_on_drop`, so aborting the owning task (for
//! example on Ctrl-C) terminates the process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::GIT_QUERY_TIMEOUT;
use crate::core::GsyncError;
use crate::utils::platform::git_command;

/// Fluent builder for a single git command.
///
/// ```rust,ignore
/// let head = GitCommand::new()
///     .current_dir(&checkout)
///     .args(["rev-parse", "HEAD"])
///     .for_node("src/v8")
///     .execute_stdout()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct GitCommand {
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    timeout_duration: Option<Duration>,
    node: String,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            // Non-interactive: never wait for credentials on a terminal.
            env_vars: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
            timeout_duration: Some(GIT_QUERY_TIMEOUT),
            node: String::new(),
        }
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl GitCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run inside `dir` (passed to git as `-C dir`).
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Override the timeout; `None` waits forever.
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Name of the dependency the command works on, used in errors.
    pub fn for_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "git".to_string())
    }

    fn error(&self, reason: impl Into<String>) -> GsyncError {
        GsyncError::Checkout {
            node: self.node.clone(),
            operation: self.operation(),
            reason: reason.into(),
        }
    }

    /// Run the command and capture its output.
    ///
    /// A non-zero exit status, a spawn failure and a timeout are all
    /// reported as [`GsyncError::Checkout`].
    pub async fn execute(self) -> Result<GitCommandOutput, GsyncError> {
        let start = Instant::now();
        let mut full_args = Vec::with_capacity(self.args.len() + 2);
        if let Some(dir) = &self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());
        let command_line = full_args.join(" ");

        tracing::debug!(target: "git", "({}) Executing command: git {command_line}", self.node);

        let mut cmd = Command::new(git_command());
        cmd.args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        let output_future = cmd.output();
        let output = match self.timeout_duration {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "git",
                        "Command timed out after {} seconds: git {command_line}",
                        duration.as_secs()
                    );
                    return Err(self.error(format!(
                        "git {command_line} timed out after {} seconds",
                        duration.as_secs()
                    )));
                }
            },
            None => output_future.await,
        }
        .map_err(|e| self.error(format!("failed to run git: {e}")))?;

        let elapsed = start.elapsed();
        tracing::debug!(
            target: "git::perf",
            "git {} took {:.2}s",
            self.operation(),
            elapsed.as_secs_f64()
        );

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            tracing::debug!(
                target: "git",
                "Command failed with exit code: {:?}",
                output.status.code()
            );
            let reason = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(self.error(reason.trim().to_string()));
        }

        if !stderr.trim().is_empty() {
            tracing::trace!(target: "git", "{}", stderr.trim());
        }
        Ok(GitCommandOutput { stdout, stderr })
    }

    /// Run and return trimmed stdout.
    pub async fn execute_stdout(self) -> Result<String, GsyncError> {
        Ok(self.execute().await?.stdout.trim().to_string())
    }

    /// Run for side effects only.
    pub async fn execute_success(self) -> Result<(), GsyncError> {
        self.execute().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_failure_maps_to_checkout_error() {
        let temp = TempDir::new().unwrap();
        let err = GitCommand::new()
            .current_dir(temp.path())
            .args(["rev-parse", "HEAD"])
            .for_node("src")
            .execute()
            .await
            .unwrap_err();
        match err {
            GsyncError::Checkout { node, operation, .. } => {
                assert_eq!(node, "src");
                assert_eq!(operation, "rev-parse");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_version_succeeds() {
        let version = GitCommand::new().arg("--version").execute_stdout().await.unwrap();
        assert!(version.starts_with("git version"));
    }
}
