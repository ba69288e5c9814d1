//! Common test fixtures and helpers
//!
//! Usage in test files:
//! ```ignore
//! mod common;
//! use common::TestRepo;
//! ```

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

use ciscope::changes::{ChangeKind, ChangedFile};
use tempfile::TempDir;

/// Temporary project directory, optionally a git repository
pub struct TestRepo {
    pub dir: TempDir,
}

impl TestRepo {
    /// Plain directory, no git
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Initialized git repository, or `None` when git is not installed
    pub fn git() -> Option<Self> {
        if !git_available() {
            eprintln!("git not available, skipping");
            return None;
        }
        let repo = Self::new();
        repo.run_git(&["init", "-q"]);
        Some(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file, creating parent directories
    pub fn write(&self, rel: &str, content: &str) -> &Self {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        self
    }

    /// Stage everything and commit
    pub fn commit(&self, message: &str) {
        self.run_git(&["add", "-A"]);
        self.run_git(&["commit", "-q", "-m", message]);
    }

    pub fn run_git(&self, args: &[&str]) {
        let output = Command::new("git")
            .args([
                "-c",
                "user.name=ciscope",
                "-c",
                "user.email=ciscope@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Modified-file records for the given paths
pub fn modified(paths: &[&str]) -> Vec<ChangedFile> {
    paths
        .iter()
        .map(|p| ChangedFile::new(*p, ChangeKind::Modified))
        .collect()
}

/// Small Python project: `app.api` imports `app.core`, one test covers the api
pub fn python_project(repo: &TestRepo) {
    repo.write("app/__init__.py", "")
        .write("app/core.py", "def compute():\n    return 1\n")
        .write(
            "app/api.py",
            "from app.core import compute\n\ndef handler():\n    return compute()\n",
        )
        .write("app/orphan.py", "VALUE = 2\n")
        .write(
            "tests/test_api.py",
            "from app.api import handler\n\ndef test_handler():\n    assert handler() == 1\n",
        )
        .write("README.md", "# demo\n");
}
