//! Analyze command: change set in, CI decision out

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use ciscope::controller::{AnalysisOutcome, AnalysisRequest, ChangeSource, Controller};
use ciscope::decision::{decide, DecisionInput, OptimizationDecision};
use ciscope::report::{append_github_output, format_pairs, Report, DEFAULT_REPORT_PATH};
use ciscope::{changes, DetectionLevel};

use crate::cli::config::load_config;
use crate::cli::display::display_outcome;
use crate::cli::signal::{self, ExitCode};
use crate::cli::OutputFormat;

pub(crate) struct AnalyzeArgs {
    pub base: String,
    pub head: String,
    pub files: Option<PathBuf>,
    pub level: Option<DetectionLevel>,
    pub format: OutputFormat,
    pub report: Option<PathBuf>,
    pub no_report: bool,
    pub github_output: Option<PathBuf>,
    pub monorepo: bool,
}

pub(crate) fn cmd_analyze(
    root: &Path,
    config_path: Option<&Path>,
    args: AnalyzeArgs,
) -> Result<()> {
    let _span = tracing::info_span!("cmd_analyze").entered();
    let config = load_config(root, config_path)?;
    let mut settings = config.settings()?;
    // CLI flags override config
    if args.monorepo {
        settings.monorepo = true;
    }
    let level = args.level.unwrap_or_else(|| config.detection_level_or_default());

    let changes = match &args.files {
        Some(path) => ChangeSource::Files(read_change_list(path)?),
        None => ChangeSource::Git {
            base: args.base.clone(),
            head: args.head.clone(),
        },
    };

    let controller = Controller::new(settings)?;
    signal::setup_signal_handler(controller.interrupt_flag());

    let outcome = controller.run(AnalysisRequest {
        root: root.to_path_buf(),
        changes,
        level,
    });

    match outcome {
        Ok(outcome) => {
            if signal::check_interrupted() {
                tracing::warn!("Analysis interrupted, decision is fail-safe");
            }
            // Outputs first; the report is best-effort
            emit(&args, &outcome.decision)?;
            match args.format {
                OutputFormat::Kv => print!("{}", format_pairs(&outcome.decision)),
                OutputFormat::Json => println!("{}", Report::from_outcome(&outcome).to_json()?),
                OutputFormat::Text => display_outcome(&outcome),
            }
            if !args.no_report {
                write_report(&report_path(root, args.report.as_deref()), &outcome);
            }
            Ok(())
        }
        Err(e) => {
            // No trustworthy change set: still tell CI to run everything
            tracing::error!(error = %e, "Failed to collect changes");
            eprintln!("Error: {e}");
            let decision = decide(
                &DecisionInput {
                    degraded: true,
                    ..Default::default()
                },
                &config.policy(),
            );
            emit(&args, &decision)?;
            if args.format != OutputFormat::Text {
                print!("{}", format_pairs(&decision));
            }
            std::process::exit(ExitCode::CollectionFailed as i32);
        }
    }
}

/// Append to the GitHub output file when one is configured
fn emit(args: &AnalyzeArgs, decision: &OptimizationDecision) -> Result<()> {
    if let Some(path) = &args.github_output {
        append_github_output(path, decision)?;
    }
    Ok(())
}

/// Write the JSON report. Failure is logged, never fatal.
fn write_report(path: &Path, outcome: &AnalysisOutcome) -> bool {
    match Report::from_outcome(outcome).write_to(path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write report");
            false
        }
    }
}

fn report_path(root: &Path, requested: Option<&Path>) -> PathBuf {
    let path = requested.unwrap_or_else(|| Path::new(DEFAULT_REPORT_PATH));
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn read_change_list(path: &Path) -> Result<Vec<ciscope::ChangedFile>> {
    let lines = if path.as_os_str() == "-" {
        super::read_stdin_lines()?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read change list {}", path.display()))?
            .lines()
            .map(str::to_string)
            .collect()
    };
    Ok(changes::changes_from_paths(lines.iter().map(String::as_str)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_path_relative_to_root() {
        let root = Path::new("/repo");
        assert_eq!(
            report_path(root, None),
            PathBuf::from("/repo/change-reports/change-detection-report.json")
        );
        assert_eq!(
            report_path(root, Some(Path::new("out/r.json"))),
            PathBuf::from("/repo/out/r.json")
        );
    }

    #[test]
    fn test_write_report_failure_is_not_fatal() {
        use ciscope::controller::AnalysisSettings;
        use ciscope::{ChangeKind, ChangedFile};

        let dir = tempfile::TempDir::new().unwrap();
        let controller = Controller::new(AnalysisSettings::default()).unwrap();
        let outcome = controller
            .run(AnalysisRequest {
                root: dir.path().to_path_buf(),
                changes: ChangeSource::Files(vec![ChangedFile::new(
                    "README.md",
                    ChangeKind::Modified,
                )]),
                level: DetectionLevel::Quick,
            })
            .unwrap();

        // A regular file where the report directory should be
        std::fs::write(dir.path().join("blocked"), "").unwrap();
        assert!(!write_report(&dir.path().join("blocked/report.json"), &outcome));
        assert!(write_report(&dir.path().join("ok/report.json"), &outcome));
        assert!(dir.path().join("ok/report.json").exists());
    }

    #[test]
    fn test_read_change_list_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let list = dir.path().join("changed.txt");
        std::fs::write(&list, "README.md\n\nsrc/a.py\nREADME.md\n").unwrap();
        let changes = read_change_list(&list).unwrap();
        let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/a.py"]);
    }
}
