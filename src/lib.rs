//! # ciscope - Change Detection for CI
//!
//! Decides which CI stages a change can safely skip.
//!
//! ## Pipeline
//!
//! 1. **Collect** the change set from git (`base...head`) or an explicit list
//! 2. **Classify** every file into categories (docs, source, tests, ...)
//! 3. **Resolve packages** in monorepo mode
//! 4. **Build the import graph** (comprehensive level) with tree-sitter
//! 5. **Propagate impact** to affected modules and tests
//! 6. **Decide** skip flags, score, and time savings
//!
//! Stages 3-5 run under a per-level time budget. Anything that goes wrong
//! after collection degrades the decision to "run everything".
//!
//! ## Quick Start
//!
//! ```no_run
//! use ciscope::{AnalysisRequest, ChangeSource, Controller, DetectionLevel};
//! use ciscope::config::Config;
//!
//! # fn main() -> anyhow::Result<()> {
//! let root = std::path::PathBuf::from(".");
//! let settings = Config::load(&root).settings()?;
//! let controller = Controller::new(settings)?;
//! let outcome = controller.run(AnalysisRequest {
//!     root,
//!     changes: ChangeSource::Git {
//!         base: "origin/main".into(),
//!         head: "HEAD".into(),
//!     },
//!     level: DetectionLevel::Standard,
//! })?;
//! print!("{}", ciscope::report::format_pairs(&outcome.decision));
//! # Ok(())
//! # }
//! ```

pub mod changes;
pub mod classify;
pub mod config;
pub mod controller;
pub mod decision;
pub mod graph;
pub mod impact;
pub mod language;
pub mod packages;
pub mod report;

pub use changes::{ChangeKind, ChangedFile, CollectionError};
pub use classify::{Category, ClassificationRule, Classifier, FileClassification};
pub use controller::{
    AnalysisOutcome, AnalysisRequest, AnalysisSettings, ChangeSource, Controller, DetectionLevel,
};
pub use decision::{decide, DecisionInput, OptimizationDecision, Policy};
pub use graph::{build_graph, DependencyGraph, Edge};
pub use impact::{propagate, AffectedSet, TestMapper};
pub use packages::{Package, PackageSet};
