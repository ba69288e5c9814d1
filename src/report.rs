//! Output artifacts
//!
//! Two shapes leave the process: a JSON report for humans and tooling, and
//! flat `key=value` lines for CI runners (stdout and `$GITHUB_OUTPUT`).

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::classify::FileClassification;
use crate::controller::{AnalysisOutcome, DetectionLevel};
use crate::decision::OptimizationDecision;
use crate::graph::GraphStats;
use crate::impact::AffectedSet;
use crate::packages::Package;

/// Default location of the JSON report, relative to the project root
pub const DEFAULT_REPORT_PATH: &str = "change-reports/change-detection-report.json";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    /// RFC 3339 generation time
    pub timestamp: String,
    pub version: &'static str,
    pub generator: &'static str,
}

impl ReportMetadata {
    pub fn now() -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
            generator: env!("CARGO_PKG_NAME"),
        }
    }
}

/// The JSON report artifact
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub decision: &'a OptimizationDecision,
    pub classifications: &'a [FileClassification],
    pub affected: &'a AffectedSet,
    pub packages: &'a [Package],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<&'a GraphStats>,
    pub level: DetectionLevel,
    pub degraded_reason: Option<&'a str>,
    pub elapsed_ms: u64,
    pub metadata: ReportMetadata,
}

impl<'a> Report<'a> {
    pub fn from_outcome(outcome: &'a AnalysisOutcome) -> Self {
        Self {
            decision: &outcome.decision,
            classifications: &outcome.classifications,
            affected: &outcome.affected,
            packages: &outcome.packages,
            graph: outcome.graph.as_ref(),
            level: outcome.level,
            degraded_reason: outcome.degraded_reason.as_deref(),
            elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            metadata: ReportMetadata::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report, creating parent directories as needed
    pub fn write_to(&self, path: &Path) -> Result<(), ReportError> {
        let io_err = |source| ReportError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_json()?).map_err(io_err)?;
        tracing::info!(path = %path.display(), "Wrote change detection report");
        Ok(())
    }
}

/// Ordered `key=value` pairs consumed by CI
pub fn output_pairs(decision: &OptimizationDecision) -> Vec<(&'static str, String)> {
    vec![
        ("skip-tests", decision.skip_tests.to_string()),
        ("skip-security", decision.skip_security.to_string()),
        ("skip-docs", decision.skip_docs.to_string()),
        ("skip-lint", decision.skip_lint.to_string()),
        ("degraded", decision.degraded.to_string()),
        ("change-categories", decision.categories_joined()),
        ("affected-tests", decision.affected_tests.join(" ")),
        ("affected-packages", decision.affected_packages.join(",")),
        ("optimization-score", decision.optimization_score.to_string()),
        (
            "time-savings",
            decision.estimated_time_savings_seconds.to_string(),
        ),
    ]
}

/// `key=value` lines, one per output
pub fn format_pairs(decision: &OptimizationDecision) -> String {
    output_pairs(decision)
        .into_iter()
        .map(|(k, v)| format!("{k}={v}\n"))
        .collect()
}

/// Append outputs to a GitHub Actions output file
pub fn append_github_output(path: &Path, decision: &OptimizationDecision) -> Result<(), ReportError> {
    let io_err = |source| ReportError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(format_pairs(decision).as_bytes())
        .map_err(io_err)?;
    tracing::debug!(path = %path.display(), "Appended GitHub outputs");
    Ok(())
}
