//! Client configuration (`.gsync`)
//!
//! The client configuration names the top-level solutions of a checkout and
//! the platforms it targets. It lives at the checkout root; commands find it
//! by searching upwards from the current directory.
//!
//! ```toml
//! cache_dir = "~/.cache/gsync"
//! target_os = ["android"]
//! target_os_only = false
//!
//! [[solutions]]
//! name = "src"
//! url = "https://chromium.googlesource.com/chromium/src.git"
//! managed = false
//! custom_deps = { "src/third_party/webgl" = "" }
//! custom_vars = { checkout_nacl = false }
//! custom_hooks = [{ name = "lastchange" }]
//! ```
//!
//! From the loaded file and the checkout root the CLI builds one immutable
//! [`GlobalConfig`] and threads it through the tree and checkout provider.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{CONFIG_FILE_NAME, DEFAULT_DEPS_FILE, default_jobs};
use crate::core::GsyncError;
use crate::hooks::HookSpec;
use crate::utils::{atomic_write, find_config_root};
use crate::vars::{VarMap, host_cpu, host_os};

/// Environment variable overriding the git cache directory.
pub const CACHE_DIR_ENV: &str = "GSYNC_CACHE_DIR";

fn default_true() -> bool {
    true
}

fn default_deps_file() -> String {
    DEFAULT_DEPS_FILE.to_string()
}

/// Contents of the `.gsync` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Shared git mirror cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,

    /// Extra target operating systems
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_os: Vec<String>,

    /// Do not add the host OS to the target set
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub target_os_only: bool,

    /// Extra target CPUs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_cpu: Vec<String>,

    /// Do not add the host CPU to the target set
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub target_cpu_only: bool,

    /// Top-level solutions, in declaration order
    #[serde(default)]
    pub solutions: Vec<SolutionSpec>,
}

/// One top-level solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolutionSpec {
    /// Checkout directory relative to the root
    pub name: String,

    /// Repository url, optionally with `@revision`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Whether gsync syncs this solution itself
    #[serde(default = "default_true")]
    pub managed: bool,

    /// Manifest file name inside the solution
    #[serde(default = "default_deps_file")]
    pub deps_file: String,

    /// Dependency url overrides; an empty string disables the dependency
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_deps: BTreeMap<String, String>,

    /// Variable overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_vars: VarMap,

    /// Hook overrides; entries without an action only suppress
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_hooks: Vec<HookSpec>,

    /// Extra target operating systems requested by this solution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_os: Vec<String>,
}

impl SolutionSpec {
    /// A managed solution with default settings.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            managed: true,
            deps_file: default_deps_file(),
            custom_deps: BTreeMap::new(),
            custom_vars: VarMap::new(),
            custom_hooks: Vec::new(),
            target_os: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Parse configuration text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse client configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Write the configuration atomically.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize client configuration")?;
        atomic_write(path, content.as_bytes())
    }

    /// Check for contradictions that make the configuration unusable.
    pub fn validate(&self) -> Result<(), GsyncError> {
        if self.solutions.is_empty() {
            return Err(GsyncError::configuration("no solutions are configured"));
        }
        let mut seen = BTreeSet::new();
        for solution in &self.solutions {
            if solution.name.trim().is_empty() {
                return Err(GsyncError::configuration("solution with an empty name"));
            }
            if !seen.insert(solution.name.as_str()) {
                return Err(GsyncError::configuration(format!(
                    "solution '{}' is declared more than once",
                    solution.name
                )));
            }
            if solution.managed && solution.url.is_none() {
                return Err(GsyncError::configuration(format!(
                    "managed solution '{}' has no url",
                    solution.name
                )));
            }
            if solution.deps_file.trim().is_empty() {
                return Err(GsyncError::configuration(format!(
                    "solution '{}' has an empty deps_file",
                    solution.name
                )));
            }
        }
        Ok(())
    }

    /// Target OS set for the whole checkout.
    ///
    /// The host OS, the configured list and every solution's own list,
    /// without the host when `target_os_only` is set.
    pub fn target_os_set(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = self.target_os.iter().cloned().collect();
        for solution in &self.solutions {
            set.extend(solution.target_os.iter().cloned());
        }
        if !self.target_os_only {
            set.insert(host_os().to_string());
        }
        set
    }

    /// Target CPU set for the whole checkout.
    pub fn target_cpu_set(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = self.target_cpu.iter().cloned().collect();
        if !self.target_cpu_only {
            set.insert(host_cpu().to_string());
        }
        set
    }
}

/// Immutable settings shared by the tree and the checkout provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Checkout root containing `.gsync`
    pub root_dir: PathBuf,
    /// Git mirror cache
    pub cache_dir: Option<PathBuf>,
    /// Worker pool size
    pub jobs: usize,
    /// Target OS set of the root
    pub target_os: BTreeSet<String>,
    /// Target CPU set of the root
    pub target_cpu: BTreeSet<String>,
}

impl GlobalConfig {
    /// Build from a loaded client configuration.
    pub fn new(
        root_dir: impl Into<PathBuf>,
        client: &ClientConfig,
        jobs: Option<usize>,
    ) -> Result<Self> {
        let cache_dir = match std::env::var(CACHE_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
            _ => client.cache_dir.as_deref().map(expand_path).transpose()?,
        };
        Ok(Self {
            root_dir: root_dir.into(),
            cache_dir,
            jobs: jobs.filter(|j| *j > 0).unwrap_or_else(default_jobs),
            target_os: client.target_os_set(),
            target_cpu: client.target_cpu_set(),
        })
    }

    /// Configuration for tests and embedders: no cache, explicit targets.
    pub fn for_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            cache_dir: None,
            jobs: default_jobs(),
            target_os: [host_os().to_string()].into(),
            target_cpu: [host_cpu().to_string()].into(),
        }
    }
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .with_context(|| format!("Failed to expand path: {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Platform cache location used by `gsync config --default-cache-dir`.
pub fn default_cache_dir() -> Result<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
        .ok_or_else(|| anyhow::anyhow!("Unable to determine a cache directory"))?;
    Ok(base.join("gsync"))
}

/// Locate the configuration: an explicit file, or `.gsync` in `start` or
/// one of its parents. Returns `(root_dir, config_file)`.
pub fn find_config(start: &Path, explicit: Option<&Path>) -> Result<(PathBuf, PathBuf)> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(GsyncError::ConfigNotFound {
                searched_from: path.display().to_string(),
            }
            .into());
        }
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| start.to_path_buf(), Path::to_path_buf);
        return Ok((root, path.to_path_buf()));
    }
    let root = find_config_root(start, CONFIG_FILE_NAME)?;
    let file = root.join(CONFIG_FILE_NAME);
    Ok((root, file))
}
