//! Graph command: build the import graph and report its shape

use std::path::Path;

use anyhow::Result;

use ciscope::controller::Deadline;
use ciscope::graph::{build_graph, Module};

use crate::cli::config::load_config;
use crate::cli::display::display_graph_stats;

pub(crate) fn cmd_graph(root: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(root, config_path)?;
    let graph = build_graph(root, &config.graph_options(), &Deadline::unbounded())?;
    let stats = graph.stats();

    if json {
        let modules: Vec<&Module> = graph.modules().collect();
        let output = serde_json::json!({
            "stats": stats,
            "modules": modules,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        display_graph_stats(&stats);
        for id in graph.unknown_modules() {
            println!("  ? {id}");
        }
    }
    Ok(())
}
