//! Hook declaration and execution.
//!
//! Manifests declare hooks as argv lists with an optional file pattern and
//! condition. After the checkout walk, the tree collects every applicable
//! hook in tree order and [`HookRunner`] runs them one at a time. Pre-deps
//! hooks go through the same runner, scoped to a single node, before that
//! node's children are synced.
//!
//! A failing hook stops the sequence; the resulting
//! [`GsyncError::HookExecution`] maps to a distinct process exit code.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::condition::evaluate;
use crate::constants::HOOK_WARNING_THRESHOLD;
use crate::core::GsyncError;
use crate::vars::{VarMap, substitute};

/// Interpreter names replaced with the host's Python.
const PYTHON_ALIASES: &[&str] = &["python", "python3", "vpython", "vpython3"];

/// A hook as declared in a manifest or in a solution's `custom_hooks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookSpec {
    /// Name used for `custom_hooks` matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Regex over touched files; absent means always run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Command and arguments, `{var}` placeholders allowed
    #[serde(default)]
    pub action: Vec<String>,

    /// Working directory relative to the node's hook directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Condition gating the hook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl HookSpec {
    /// Name for messages: the declared name or the command line.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.action.join(" "))
    }
}

/// A hook ready to run, bound to the node that declared it.
#[derive(Debug, Clone)]
pub struct CollectedHook {
    /// Name of the declaring node
    pub owner: String,
    /// The hook declaration
    pub spec: HookSpec,
    /// Working directory relative to the checkout root
    pub cwd: String,
    /// Hook condition combined with the owner's condition
    pub condition: Option<String>,
    /// Resolved variables of the owner
    pub vars: Arc<VarMap>,
}

/// Runs hooks sequentially from the checkout root.
#[derive(Debug, Clone)]
pub struct HookRunner {
    root_dir: PathBuf,
}

impl HookRunner {
    /// Create a runner rooted at `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Checkout root hooks run relative to.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Run hooks in order, stopping at the first failure.
    ///
    /// Returns how many hooks actually ran (conditions may skip some).
    pub async fn run_all(&self, hooks: &[CollectedHook]) -> Result<usize, GsyncError> {
        let mut ran = 0;
        for hook in hooks {
            if self.run(hook).await? {
                ran += 1;
            }
        }
        Ok(ran)
    }

    /// Run a single hook. Returns `false` when its condition skipped it.
    pub async fn run(&self, hook: &CollectedHook) -> Result<bool, GsyncError> {
        if let Some(condition) = &hook.condition {
            if !evaluate(condition, &hook.vars)? {
                debug!(
                    target: "hooks",
                    "Skipping hook '{}' from {}: {condition} is false",
                    hook.spec.display_name(),
                    hook.owner
                );
                return Ok(false);
            }
        }

        let argv = resolve_argv(&hook.spec.action, &hook.vars)?;
        let command_line = argv.join(" ");
        let Some((program, args)) = argv.split_first() else {
            return Err(GsyncError::HookExecution {
                hook: hook.spec.display_name(),
                command: String::new(),
                status: "empty action".to_string(),
                output: String::new(),
            });
        };

        let cwd = self.root_dir.join(&hook.cwd);
        info!(
            target: "hooks",
            "Running hook '{}' in {}: {command_line}",
            hook.spec.display_name(),
            hook.cwd
        );

        let start = Instant::now();
        let result = Command::new(program)
            .args(args)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;
        let elapsed = start.elapsed();

        if elapsed > HOOK_WARNING_THRESHOLD {
            warn!(target: "hooks", "Hook '{command_line}' took {:.2} secs", elapsed.as_secs_f64());
        }

        let output = result.map_err(|e| GsyncError::HookExecution {
            hook: hook.spec.display_name(),
            command: command_line.clone(),
            status: format!("failed to start: {e}"),
            output: String::new(),
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(GsyncError::HookExecution {
                hook: hook.spec.display_name(),
                command: command_line,
                status: output.status.to_string(),
                output: combined,
            });
        }

        for line in combined.lines() {
            info!(target: "hooks", "{line}");
        }
        Ok(true)
    }
}

/// Substitute variables into every argument and map interpreter aliases.
pub fn resolve_argv(action: &[String], vars: &VarMap) -> Result<Vec<String>, GsyncError> {
    let mut argv = action
        .iter()
        .map(|arg| substitute(arg, vars))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(first) = argv.first_mut() {
        if PYTHON_ALIASES.contains(&first.as_str()) {
            *first = python_interpreter();
        }
    }
    Ok(argv)
}

/// The host's Python interpreter, falling back to the bare name.
fn python_interpreter() -> String {
    which::which("python3")
        .or_else(|_| which::which("python"))
        .map_or_else(|_| "python3".to_string(), |path| path.display().to_string())
}
