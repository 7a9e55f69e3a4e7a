//! Progress display for the checkout walk.
//!
//! The number of nodes is unknown up front: manifests keep adding children
//! while the walk runs. [`SyncProgress`] therefore grows its length as nodes
//! are discovered. When progress is disabled (`--no-progress`, `--quiet`, or
//! `GSYNC_NO_PROGRESS` in the environment) the bar is hidden and every call
//! is a no-op.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};

/// Environment variable that disables progress output.
pub const NO_PROGRESS_ENV: &str = "GSYNC_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some()
}

fn bar_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
        .map(|style| style.progress_chars("━╸━"))
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
}

/// Progress bar counting finished nodes.
#[derive(Clone)]
pub struct SyncProgress {
    inner: IndicatifBar,
}

impl SyncProgress {
    /// Create a bar; `enabled = false` yields a hidden one.
    pub fn new(enabled: bool, prefix: &str) -> Self {
        let inner = if enabled && !is_progress_disabled() {
            let bar = IndicatifBar::new(0);
            bar.set_style(bar_style());
            bar.set_prefix(prefix.to_string());
            bar
        } else {
            IndicatifBar::hidden()
        };
        Self { inner }
    }

    /// A bar that never draws.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    /// Account for newly discovered nodes.
    pub fn add_total(&self, count: usize) {
        self.inner.inc_length(count as u64);
    }

    /// Mark one node finished.
    pub fn node_done(&self, name: &str) {
        self.inner.set_message(name.to_string());
        self.inner.inc(1);
    }

    /// Finished nodes so far.
    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    /// Remove the bar from the terminal.
    pub fn finish(&self) {
        self.inner.finish_and_clear();
    }
}
