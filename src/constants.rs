//! Global constants used throughout the gsync codebase.
//!
//! This module contains file names, recursion ceilings, timeouts and
//! parallelism parameters that are shared by several modules. Defining
//! them centrally keeps the magic numbers discoverable.

use std::time::Duration;

/// Name of the client configuration file searched for in the working
/// directory and its parents.
pub const CONFIG_FILE_NAME: &str = ".gsync";

/// Name of the persisted entries snapshot written after a successful sync.
pub const ENTRIES_FILE_NAME: &str = ".gsync_entries";

/// Conventional manifest file name, also the fallback when a node's
/// configured manifest name does not exist on disk.
pub const DEFAULT_DEPS_FILE: &str = "DEPS";

/// Recursion limit of the synthetic root.
///
/// Solutions sit one level below the root and therefore start with a limit
/// of 2: their own manifest is parsed, their children's manifests are parsed,
/// and nothing deeper unless `recursedeps` says so.
pub const ROOT_RECURSION_LIMIT: usize = 3;

/// Recursion limit given to a child named in its parent's `recursedeps`.
///
/// The named child and one level below it are parsed.
pub const RECURSEDEPS_LIMIT: usize = 2;

/// Exit code used when a hook script fails, distinct from generic failures.
pub const HOOK_FAILURE_EXIT_CODE: i32 = 2;

/// Exit code for every other failure.
pub const GENERIC_FAILURE_EXIT_CODE: i32 = 1;

/// Hooks running longer than this log a warning.
pub const HOOK_WARNING_THRESHOLD: Duration = Duration::from_secs(10);

/// Timeout for Git fetch operations (10 minutes).
///
/// Large repositories can legitimately take a long time to fetch; this only
/// guards against hung connections.
pub const GIT_FETCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for Git clone operations (30 minutes).
pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(1800);

/// Timeout for short local Git queries (rev-parse, status, config).
pub const GIT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound for a single `cipd install`.
pub const CIPD_INSTALL_TIMEOUT: Duration = Duration::from_secs(1800);

/// Minimum number of parallel checkout jobs regardless of CPU count.
pub const MIN_PARALLELISM: usize = 8;

/// Multiplier applied to CPU core count for default parallelism.
pub const PARALLELISM_CORE_MULTIPLIER: usize = 2;

/// Default CPU core count when detection fails.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Default number of checkout jobs: `max(cores × 2, MIN_PARALLELISM)`.
pub fn default_jobs() -> usize {
    let cores = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(FALLBACK_CORE_COUNT);
    (cores * PARALLELISM_CORE_MULTIPLIER).max(MIN_PARALLELISM)
}
