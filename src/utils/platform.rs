//! Locating external tools.

use std::path::PathBuf;

/// Name of the git executable for this platform.
#[must_use]
pub const fn git_command() -> &'static str {
    if cfg!(windows) { "git.exe" } else { "git" }
}

/// Full path of the `cipd` client, if installed.
#[must_use]
pub fn cipd_command() -> Option<PathBuf> {
    which::which("cipd").ok()
}

/// Whether `cmd` resolves on `PATH`.
#[must_use]
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_command_name() {
        assert!(git_command().starts_with("git"));
    }

    #[test]
    fn test_missing_command() {
        assert!(!command_exists("gsync-no-such-tool-on-path"));
    }
}
