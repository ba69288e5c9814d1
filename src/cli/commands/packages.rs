//! Packages command: list monorepo packages

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use ciscope::packages::{Package, PackageSet};

use crate::cli::config::load_config;
use crate::cli::display::display_packages;
use crate::cli::signal::ExitCode;
use crate::cli::PackagesFormat;

pub(crate) fn cmd_packages(
    root: &Path,
    config_path: Option<&Path>,
    format: PackagesFormat,
) -> Result<()> {
    let config = load_config(root, config_path)?;
    let set = PackageSet::discover(root, &config.discovery_options())?;

    if set.is_empty() {
        eprintln!("No packages found");
        std::process::exit(ExitCode::NoPackages as i32);
    }

    match format {
        PackagesFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&group_by_kind(set.packages()))?)
        }
        PackagesFormat::List => {
            for line in list_lines(set.packages()) {
                println!("{line}");
            }
        }
        PackagesFormat::Text => display_packages(set.packages()),
    }
    Ok(())
}

fn group_by_kind(packages: &[Package]) -> BTreeMap<String, Vec<&Package>> {
    let mut grouped: BTreeMap<String, Vec<&Package>> = BTreeMap::new();
    for p in packages {
        grouped.entry(p.kind.to_string()).or_default().push(p);
    }
    grouped
}

/// `kind:path:id` per package
fn list_lines(packages: &[Package]) -> Vec<String> {
    packages
        .iter()
        .map(|p| format!("{}:{}:{}", p.kind, p.root_path, p.id))
        .collect()
}
