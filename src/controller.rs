//! Detection level controller
//!
//! Collects the change set on the calling thread, then runs the rest of the
//! pipeline on a worker thread under a wall-clock budget. Whatever goes wrong
//! after collection (timeout, interrupt, package or graph errors, a worker
//! panic) ends in a single fail-safe outcome: a degraded decision that skips
//! nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::changes::{collect_changes, ChangedFile, CollectionError};
use crate::classify::{
    category_set, default_rules, Category, ClassificationRule, Classifier, ClassifyError,
    FileClassification,
};
use crate::decision::{decide, DecisionInput, OptimizationDecision, Policy};
use crate::graph::{
    build_graph, find_test_files, DependencyGraph, GraphBuildError, GraphOptions, GraphStats,
};
use crate::impact::{
    mapper_for, propagate, propagate_by_name, propagate_quick, AffectedSet, TestMapper,
    TestMappingMode,
};
use crate::language::Language;
use crate::packages::{DiscoveryOptions, Package, PackageError, PackageSet};

/// How often the waiting thread looks at the interrupt flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How deep the analysis goes
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DetectionLevel {
    /// Classification and changed tests only
    Quick,
    /// Adds name-based test mapping
    #[default]
    Standard,
    /// Adds the import graph and transitive impact
    Comprehensive,
}

impl std::fmt::Display for DetectionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionLevel::Quick => write!(f, "quick"),
            DetectionLevel::Standard => write!(f, "standard"),
            DetectionLevel::Comprehensive => write!(f, "comprehensive"),
        }
    }
}

/// Error returned when parsing an invalid DetectionLevel string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDetectionLevelError {
    /// The invalid input string
    pub input: String,
}

impl std::fmt::Display for ParseDetectionLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unknown detection level: '{}'. Valid options: quick, standard, comprehensive",
            self.input
        )
    }
}

impl std::error::Error for ParseDetectionLevelError {}

impl std::str::FromStr for DetectionLevel {
    type Err = ParseDetectionLevelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(DetectionLevel::Quick),
            "standard" => Ok(DetectionLevel::Standard),
            "comprehensive" => Ok(DetectionLevel::Comprehensive),
            _ => Err(ParseDetectionLevelError {
                input: s.to_string(),
            }),
        }
    }
}

/// Wall-clock budget per level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    pub quick: Duration,
    pub standard: Duration,
    pub comprehensive: Duration,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            quick: Duration::from_secs(30),
            standard: Duration::from_secs(120),
            comprehensive: Duration::from_secs(300),
        }
    }
}

impl Budgets {
    pub fn for_level(&self, level: DetectionLevel) -> Duration {
        match level {
            DetectionLevel::Quick => self.quick,
            DetectionLevel::Standard => self.standard,
            DetectionLevel::Comprehensive => self.comprehensive,
        }
    }
}

/// The budget ran out before a stage finished
#[derive(Error, Debug)]
#[error("Budget of {budget:?} exceeded during {stage}")]
pub struct BudgetExceeded {
    pub stage: &'static str,
    pub budget: Duration,
}

/// Shared deadline with a cancellation flag
#[derive(Debug, Clone)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A deadline that only expires when cancelled
    pub fn unbounded() -> Self {
        Self::new(Duration::MAX)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn is_expired(&self) -> bool {
        self.is_cancelled() || self.start.elapsed() >= self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.start.elapsed())
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Fail with [`BudgetExceeded`] once expired
    pub fn check(&self, stage: &'static str) -> Result<(), BudgetExceeded> {
        if self.is_expired() {
            return Err(BudgetExceeded {
                stage,
                budget: self.budget,
            });
        }
        Ok(())
    }
}

/// Errors that stop the pipeline after collection. Each one degrades the
/// outcome instead of failing it.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Graph(#[from] GraphBuildError),
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),
}

/// Invalid settings detected before any analysis runs
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error("Invalid test_map pattern: {0}")]
    TestMap(#[from] globset::Error),
}

/// Everything configurable about one analysis
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub rules: Vec<ClassificationRule>,
    pub policy: Policy,
    pub override_categories: BTreeSet<Category>,
    pub monorepo: bool,
    pub discovery: DiscoveryOptions,
    pub graph: GraphOptions,
    pub test_mapping: TestMappingMode,
    pub test_roots: Vec<String>,
    pub test_map: BTreeMap<String, Vec<String>>,
    pub budgets: Budgets,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            policy: Policy::default(),
            override_categories: BTreeSet::new(),
            monorepo: false,
            discovery: DiscoveryOptions::default(),
            graph: GraphOptions::default(),
            test_mapping: TestMappingMode::default(),
            test_roots: Vec::new(),
            test_map: BTreeMap::new(),
            budgets: Budgets::default(),
        }
    }
}

/// Where the change set comes from
#[derive(Debug, Clone)]
pub enum ChangeSource {
    /// `git diff base...head`
    Git { base: String, head: String },
    /// Change set supplied by the caller
    Files(Vec<ChangedFile>),
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub root: PathBuf,
    pub changes: ChangeSource,
    pub level: DetectionLevel,
}

/// Result of one controlled analysis
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub decision: OptimizationDecision,
    pub classifications: Vec<FileClassification>,
    pub affected: AffectedSet,
    pub packages: Vec<Package>,
    pub graph: Option<GraphStats>,
    pub level: DetectionLevel,
    pub elapsed: Duration,
    /// Why the outcome is degraded; `None` for a complete analysis
    pub degraded_reason: Option<String>,
}

impl AnalysisOutcome {
    pub fn is_degraded(&self) -> bool {
        self.degraded_reason.is_some()
    }
}

/// Finished pipeline stages
struct PipelineResult {
    affected: AffectedSet,
    packages: Vec<Package>,
    graph: Option<GraphStats>,
}

/// Messages from the pipeline thread
enum Progress {
    Classified(Vec<FileClassification>),
    Done(Result<PipelineResult, AnalysisError>),
}

/// Runs analyses under per-level budgets
pub struct Controller {
    settings: Arc<AnalysisSettings>,
    classifier: Arc<Classifier>,
    mapper: Arc<dyn TestMapper>,
    interrupt: Arc<AtomicBool>,
}

impl Controller {
    /// Compile rules and test mappings. Fails on malformed patterns.
    pub fn new(settings: AnalysisSettings) -> Result<Self, SetupError> {
        let classifier = Classifier::new(&settings.rules)?;
        let mapper = mapper_for(settings.test_mapping, &settings.test_roots, &settings.test_map)?;
        Ok(Self {
            settings: Arc::new(settings),
            classifier: Arc::new(classifier),
            mapper: Arc::from(mapper),
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that, once set, degrades the running analysis (Ctrl+C)
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Run one analysis.
    ///
    /// Only a failure to collect the change set is an error; every other
    /// failure yields a degraded outcome.
    pub fn run(&self, request: AnalysisRequest) -> Result<AnalysisOutcome, CollectionError> {
        let AnalysisRequest {
            root,
            changes,
            level,
        } = request;
        let _span = tracing::info_span!("analyze", %level).entered();

        // Collection is outside the budget: its failure must stay an error
        let changes = match changes {
            ChangeSource::Git { base, head } => {
                collect_changes(&root, &base, &head).inspect_err(|e| {
                    tracing::error!(error = %e, "Change collection failed");
                })?
            }
            ChangeSource::Files(files) => files,
        };

        let budget = self.settings.budgets.for_level(level);
        let deadline = Deadline::new(budget);

        let (tx, rx) = unbounded();
        let worker = {
            let settings = Arc::clone(&self.settings);
            let classifier = Arc::clone(&self.classifier);
            let mapper = Arc::clone(&self.mapper);
            let deadline = deadline.clone();
            std::thread::Builder::new()
                .name("ciscope-pipeline".into())
                .spawn(move || {
                    let result = run_pipeline(
                        &root,
                        level,
                        &changes,
                        &settings,
                        &classifier,
                        mapper.as_ref(),
                        &deadline,
                        &tx,
                    );
                    let _ = tx.send(Progress::Done(result));
                })
        };
        if let Err(e) = worker {
            let reason = format!("failed to start pipeline: {}", e);
            return Ok(self.degraded(level, Vec::new(), &deadline, reason));
        }

        let mut classifications = Vec::new();
        loop {
            if self.interrupt.load(Ordering::Relaxed) {
                deadline.cancel();
                return Ok(self.degraded(level, classifications, &deadline, "interrupted".into()));
            }
            let wait = deadline.remaining().min(POLL_INTERVAL);
            match rx.recv_timeout(wait) {
                Ok(Progress::Classified(c)) => classifications = c,
                Ok(Progress::Done(Ok(result))) => {
                    return Ok(self.complete(level, classifications, result, &deadline));
                }
                Ok(Progress::Done(Err(e))) => {
                    return Ok(self.degraded(level, classifications, &deadline, e.to_string()));
                }
                Err(RecvTimeoutError::Timeout) => {
                    if deadline.is_expired() {
                        // Stragglers see the flag and stop; nobody waits for them
                        deadline.cancel();
                        let reason = format!("{} budget of {}s exceeded", level, budget.as_secs());
                        return Ok(self.degraded(level, classifications, &deadline, reason));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Ok(self.degraded(
                        level,
                        classifications,
                        &deadline,
                        "analysis worker panicked".into(),
                    ));
                }
            }
        }
    }

    fn complete(
        &self,
        level: DetectionLevel,
        classifications: Vec<FileClassification>,
        result: PipelineResult,
        deadline: &Deadline,
    ) -> AnalysisOutcome {
        let input = DecisionInput {
            categories: category_set(&classifications),
            affected: result.affected.clone(),
            degraded: false,
            override_categories: self.settings.override_categories.clone(),
        };
        let decision = decide(&input, &self.settings.policy);
        tracing::info!(
            score = decision.optimization_score,
            skip_tests = decision.skip_tests,
            skip_security = decision.skip_security,
            skip_docs = decision.skip_docs,
            skip_lint = decision.skip_lint,
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "Analysis complete"
        );
        AnalysisOutcome {
            decision,
            classifications,
            affected: result.affected,
            packages: result.packages,
            graph: result.graph,
            level,
            elapsed: deadline.elapsed(),
            degraded_reason: None,
        }
    }

    fn degraded(
        &self,
        level: DetectionLevel,
        classifications: Vec<FileClassification>,
        deadline: &Deadline,
        reason: String,
    ) -> AnalysisOutcome {
        tracing::warn!(%reason, %level, "Analysis degraded, nothing will be skipped");
        let input = DecisionInput {
            categories: category_set(&classifications),
            affected: AffectedSet::default(),
            degraded: true,
            override_categories: self.settings.override_categories.clone(),
        };
        AnalysisOutcome {
            decision: decide(&input, &self.settings.policy),
            classifications,
            affected: AffectedSet::default(),
            packages: Vec::new(),
            graph: None,
            level,
            elapsed: deadline.elapsed(),
            degraded_reason: Some(reason),
        }
    }
}

/// Whether any changed path could be a module of the import graph
fn touches_code(classified: &[FileClassification]) -> bool {
    classified
        .iter()
        .flat_map(|c| c.touched_paths())
        .any(|p| Language::from_path(p).is_some())
}

fn run_pipeline(
    root: &Path,
    level: DetectionLevel,
    changes: &[ChangedFile],
    settings: &AnalysisSettings,
    classifier: &Classifier,
    mapper: &dyn TestMapper,
    deadline: &Deadline,
    progress: &Sender<Progress>,
) -> Result<PipelineResult, AnalysisError> {
    let classified = classifier.classify_all(changes);
    let _ = progress.send(Progress::Classified(classified.clone()));
    deadline.check("classification")?;

    let (packages, affected_packages) = if settings.monorepo {
        let set = PackageSet::discover(root, &settings.discovery)?;
        let affected = set.affected(&classified);
        deadline.check("package resolution")?;
        (set.packages().to_vec(), affected)
    } else {
        (Vec::new(), BTreeSet::new())
    };

    let code_changed = touches_code(&classified);
    let mut graph_stats = None;
    let mut affected = match level {
        DetectionLevel::Quick => propagate_quick(&classified),
        DetectionLevel::Standard => {
            let tests = if code_changed {
                find_test_files(root, &settings.graph)?
            } else {
                BTreeSet::new()
            };
            propagate_by_name(&classified, &tests, mapper)
        }
        DetectionLevel::Comprehensive => {
            // No changed path can be a module, so no module can be reached
            let graph = if code_changed {
                build_graph(root, &settings.graph, deadline)?
            } else {
                DependencyGraph::default()
            };
            graph_stats = Some(graph.stats());
            propagate(&graph, &classified, mapper)
        }
    };
    affected.packages = affected_packages;
    deadline.check("impact propagation")?;

    Ok(PipelineResult {
        affected,
        packages,
        graph: graph_stats,
    })
}
