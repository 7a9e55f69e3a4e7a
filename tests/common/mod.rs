//! Shared fixtures for gsync integration tests.

// Not every test file uses every helper
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::Command as CliCommand;
use tempfile::TempDir;

/// A checkout root with a `.gsync` file.
pub struct TestCheckout {
    pub temp: TempDir,
}

impl TestCheckout {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Write `.gsync` with the given contents.
    pub fn config(&self, contents: &str) -> &Self {
        fs::write(self.root().join(".gsync"), contents).expect("write .gsync");
        self
    }

    /// Write a file below the root, creating directories.
    pub fn file(&self, rel: &str, contents: &str) -> &Self {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, contents).expect("write file");
        self
    }

    /// `gsync` running in the checkout root with progress disabled.
    pub fn gsync(&self) -> CliCommand {
        let mut cmd = CliCommand::cargo_bin("gsync").expect("gsync binary");
        cmd.current_dir(self.root()).arg("--no-progress").env_remove("RUST_LOG");
        cmd
    }
}

/// Local git repository used as a remote.
pub struct TestRepo {
    pub path: PathBuf,
}

impl TestRepo {
    /// Create a repository under `parent` with one commit holding `files`.
    pub fn create(parent: &Path, name: &str, files: &[(&str, &str)]) -> Self {
        let path = parent.join(name);
        fs::create_dir_all(&path).expect("create repo dir");
        let repo = Self { path };
        repo.git(&["init", "--quiet"]);
        repo.commit(files, "initial");
        repo
    }

    /// Commit `files` on top of the current branch.
    pub fn commit(&self, files: &[(&str, &str)], message: &str) {
        for (rel, contents) in files {
            let file = self.path.join(rel);
            fs::create_dir_all(file.parent().expect("parent")).expect("create dirs");
            fs::write(file, contents).expect("write file");
        }
        self.git(&["add", "."]);
        self.git(&["commit", "--quiet", "-m", message]);
    }

    pub fn url(&self) -> String {
        self.path.display().to_string()
    }

    fn git(&self, args: &[&str]) {
        let status = Command::new("git")
            .args(["-c", "user.name=gsync", "-c", "user.email=gsync@example.com"])
            .args(["-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(&self.path)
            .status()
            .expect("run git");
        assert!(status.success(), "git {args:?} failed");
    }
}
