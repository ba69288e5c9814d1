//! CLI command handlers
//!
//! Each submodule handles one CLI subcommand.

mod analyze;
mod classify;
mod graph;
mod packages;

pub(crate) use analyze::{cmd_analyze, AnalyzeArgs};
pub(crate) use classify::cmd_classify;
pub(crate) use graph::cmd_graph;
pub(crate) use packages::cmd_packages;

/// Read newline-separated paths from stdin
pub(crate) fn read_stdin_lines() -> anyhow::Result<Vec<String>> {
    use std::io::BufRead;
    let stdin = std::io::stdin();
    let mut lines = Vec::new();
    for line in stdin.lock().lines() {
        lines.push(line?);
    }
    Ok(lines)
}
