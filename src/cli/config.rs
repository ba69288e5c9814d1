//! Configuration and project root detection
//!
//! Provides project root detection and config file application.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use ciscope::config::Config;

/// Find project root by walking up to the git work tree root.
///
/// Falls back to the nearest directory holding a build manifest, then to the
/// current directory.
pub(crate) fn find_project_root() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_project_root_from(&cwd)
}

fn find_project_root_from(start: &Path) -> PathBuf {
    // VCS root first: change sets are always relative to it
    if let Some(root) = start.ancestors().find(|d| d.join(".git").exists()) {
        return root.to_path_buf();
    }

    // Listed in priority order: if multiple exist, first match wins
    let markers = [
        "Cargo.toml",     // Rust
        "package.json",   // Node.js
        "pyproject.toml", // Python (modern)
        "setup.py",       // Python (legacy)
        "go.mod",         // Go
    ];
    for dir in start.ancestors() {
        if markers.iter().any(|m| dir.join(m).exists()) {
            return dir.to_path_buf();
        }
    }

    tracing::warn!("No project root found, using current directory");
    start.to_path_buf()
}

/// Load layered config for `root`, then the explicit `--config` file if any
pub(crate) fn load_config(root: &Path, explicit: Option<&Path>) -> Result<Config> {
    let config = Config::load(root);
    match explicit {
        Some(path) => config
            .with_explicit(path)
            .with_context(|| format!("Invalid --config {}", path.display())),
        None => Ok(config),
    }
}
