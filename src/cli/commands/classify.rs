//! Classify command: show which categories paths fall into

use std::path::Path;

use anyhow::Result;

use ciscope::changes::changes_from_paths;
use ciscope::Classifier;

use crate::cli::config::load_config;
use crate::cli::display::display_classifications;

pub(crate) fn cmd_classify(
    root: &Path,
    config_path: Option<&Path>,
    paths: &[String],
    json: bool,
) -> Result<()> {
    let config = load_config(root, config_path)?;
    let classifier = Classifier::new(&config.rules()?)?;

    let lines = if paths.is_empty() {
        super::read_stdin_lines()?
    } else {
        paths.to_vec()
    };
    let changes = changes_from_paths(lines.iter().map(String::as_str));
    let classified = classifier.classify_all(&changes);

    if json {
        println!("{}", serde_json::to_string_pretty(&classified)?);
    } else {
        display_classifications(&classified);
    }
    Ok(())
}
