//! Terminal display for CLI results

use colored::Colorize;

use ciscope::classify::FileClassification;
use ciscope::controller::AnalysisOutcome;
use ciscope::graph::GraphStats;
use ciscope::packages::Package;

fn flag(skip: bool) -> colored::ColoredString {
    if skip {
        "skip".green()
    } else {
        "run".yellow()
    }
}

/// Colored summary of an analysis
pub(crate) fn display_outcome(outcome: &AnalysisOutcome) {
    let d = &outcome.decision;
    println!(
        "{} {} ({} files, {}ms)",
        "Change detection:".bold(),
        outcome.level,
        outcome.classifications.len(),
        outcome.elapsed.as_millis()
    );
    if let Some(reason) = &outcome.degraded_reason {
        println!("{} {}", "Degraded:".red().bold(), reason);
    }
    let categories = d.categories_joined();
    println!(
        "  categories: {}",
        if categories.is_empty() {
            "(none)".dimmed().to_string()
        } else {
            categories
        }
    );
    println!();

    for (stage, skip) in [
        ("tests", d.skip_tests),
        ("security", d.skip_security),
        ("docs", d.skip_docs),
        ("lint", d.skip_lint),
    ] {
        let reason = d.reasons.get(stage).map(String::as_str).unwrap_or("");
        println!("  {:<9} {:<5} {}", stage, flag(skip), reason.dimmed());
    }
    println!();

    if !d.affected_packages.is_empty() {
        println!("{} {}", "Packages:".cyan(), d.affected_packages.join(", "));
    }
    if !d.affected_tests.is_empty() {
        println!("{} ({})", "Tests:".cyan(), d.affected_tests.len());
        for t in &d.affected_tests {
            println!("  {}", t);
        }
    }
    if outcome.affected.test_mapping_incomplete {
        println!(
            "{} {} module(s) without tests",
            "Unmapped:".yellow(),
            outcome.affected.unmapped_modules.len()
        );
        for m in &outcome.affected.unmapped_modules {
            println!("  {}", m.dimmed());
        }
    }
    if let Some(stats) = &outcome.graph {
        display_graph_stats(stats);
    }
    println!(
        "{} {}% (~{}s saved)",
        "Score:".bold(),
        d.optimization_score,
        d.estimated_time_savings_seconds
    );
}

pub(crate) fn display_classifications(classified: &[FileClassification]) {
    for c in classified {
        let categories = c
            .categories
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        if c.defaulted {
            println!("{}  {} {}", c.path, categories.yellow(), "(default)".dimmed());
        } else {
            println!("{}  {}", c.path, categories.green());
        }
    }
}

pub(crate) fn display_packages(packages: &[Package]) {
    for p in packages {
        let root = if p.root_path.is_empty() {
            "."
        } else {
            p.root_path.as_str()
        };
        print!("{} {} {}", p.id.bold(), root.dimmed(), format!("[{}]", p.kind).cyan());
        if p.declared_dependencies.is_empty() {
            println!();
        } else {
            let deps: Vec<&str> = p.declared_dependencies.iter().map(String::as_str).collect();
            println!(" -> {}", deps.join(", "));
        }
    }
}

pub(crate) fn display_graph_stats(stats: &GraphStats) {
    println!(
        "{} {} modules ({} tests), {} static edges, {} with unknown edges",
        "Graph:".cyan(),
        stats.modules,
        stats.test_modules,
        stats.static_edges,
        stats.unknown_edges
    );
}
