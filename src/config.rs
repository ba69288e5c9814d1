//! Configuration file support for ciscope
//!
//! Config files are loaded in order (later overrides earlier):
//! 1. `~/.config/ciscope/config.toml` (user defaults)
//! 2. `.ciscope.toml` in project root (project overrides)
//! 3. An explicit `--config <path>` (TOML, or JSON when the extension is `.json`)
//!
//! CLI flags override all config file values.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::classify::{build_rules, Category, ClassificationRule};
use crate::controller::{AnalysisSettings, Budgets, DetectionLevel};
use crate::decision::{Policy, Weights, DEFAULT_BASELINE_SECONDS};
use crate::graph::{GraphOptions, DEFAULT_MAX_FILE_SIZE};
use crate::impact::TestMappingMode;
use crate::packages::{DiscoveryOptions, ExplicitPackage};

/// Errors loading an explicitly requested config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {message}")]
    Parse { path: String, message: String },
    #[error("Invalid category '{0}' in config")]
    UnknownCategory(String),
}

/// Per-level budget overrides in seconds
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub quick: Option<u64>,
    pub standard: Option<u64>,
    pub comprehensive: Option<u64>,
}

/// Per-stage weight overrides
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    pub tests: Option<u32>,
    pub security: Option<u32>,
    pub docs: Option<u32>,
    pub lint: Option<u32>,
    pub always_run: Option<u32>,
}

/// Configuration options loaded from config files
///
/// # Example
///
/// ```toml
/// # ~/.config/ciscope/config.toml or .ciscope.toml
/// detection_level = "comprehensive"
/// monorepo_mode = true
/// override_categories = ["build"]
///
/// [budget_seconds]
/// comprehensive = 600
///
/// [patterns]
/// docs = ["docs/**", "*.md"]
///
/// [[rules]]
/// category = "config"
/// pattern = "deploy/**"
///
/// [test_map]
/// "src/billing/**" = ["tests/integration/test_billing.py"]
///
/// [[packages]]
/// root = "services/api"
/// depends_on = ["shared"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detection_level: Option<DetectionLevel>,
    pub monorepo_mode: Option<bool>,
    pub baseline_duration_seconds: Option<u64>,
    pub budget_seconds: BudgetConfig,
    /// Replacement pattern lists keyed by category name
    pub patterns: BTreeMap<String, Vec<String>>,
    /// Extra rules appended after the category patterns
    pub rules: Vec<ClassificationRule>,
    pub weights: WeightsConfig,
    pub override_categories: Option<Vec<Category>>,
    pub enable_test_optimization: Option<bool>,
    pub enable_job_skipping: Option<bool>,
    pub source_roots: Option<Vec<String>>,
    pub test_roots: Option<Vec<String>>,
    pub graph_workers: Option<usize>,
    pub max_file_size: Option<u64>,
    pub test_mapping: Option<TestMappingMode>,
    pub test_map: BTreeMap<String, Vec<String>>,
    pub packages: Vec<ExplicitPackage>,
    pub package_discovery_depth: Option<usize>,
}

impl Config {
    /// Load configuration from user and project config files
    pub fn load(project_root: &Path) -> Self {
        let user_config = dirs::config_dir()
            .map(|d| d.join("ciscope/config.toml"))
            .and_then(|p| Self::load_file(&p))
            .unwrap_or_default();

        let project_config =
            Self::load_file(&project_root.join(".ciscope.toml")).unwrap_or_default();

        // Project overrides user
        let merged = user_config.override_with(project_config);
        tracing::debug!(
            level = ?merged.detection_level,
            monorepo = ?merged.monorepo_mode,
            rules = merged.rules.len(),
            packages = merged.packages.len(),
            "Effective config after merge"
        );
        merged
    }

    /// Layer an explicitly named config file on top. Unlike the implicit
    /// files, a missing or malformed explicit file is an error.
    pub fn with_explicit(self, path: &Path) -> Result<Self, ConfigError> {
        let explicit = Self::read_explicit(path)?;
        Ok(self.override_with(explicit))
    }

    fn read_explicit(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(path, &content).map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    /// Parse TOML, or JSON for `.json` paths
    fn parse(path: &Path, content: &str) -> Result<Self, String> {
        let is_json = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str::<Self>(content).map_err(|e| e.to_string())
        } else {
            toml::from_str::<Self>(content).map_err(|e| e.to_string())
        }
    }

    /// Load configuration from a specific file
    fn load_file(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                return None;
            }
        };

        match Self::parse(path, &content) {
            Ok(config) => {
                tracing::debug!(
                    path = %path.display(),
                    level = ?config.detection_level,
                    rules = config.rules.len(),
                    "Loaded config"
                );
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Layer another config on top (other overrides self where present)
    fn override_with(self, other: Self) -> Self {
        // Pattern lists replace per category; rules and packages accumulate
        let mut patterns = self.patterns;
        patterns.extend(other.patterns);
        let mut rules = self.rules;
        rules.extend(other.rules);
        let mut test_map = self.test_map;
        test_map.extend(other.test_map);

        // Project packages replace user packages with the same root
        let mut packages = self.packages;
        for pkg in other.packages {
            if let Some(pos) = packages.iter().position(|p| p.root == pkg.root) {
                packages[pos] = pkg;
            } else {
                packages.push(pkg);
            }
        }

        Config {
            detection_level: other.detection_level.or(self.detection_level),
            monorepo_mode: other.monorepo_mode.or(self.monorepo_mode),
            baseline_duration_seconds: other
                .baseline_duration_seconds
                .or(self.baseline_duration_seconds),
            budget_seconds: BudgetConfig {
                quick: other.budget_seconds.quick.or(self.budget_seconds.quick),
                standard: other.budget_seconds.standard.or(self.budget_seconds.standard),
                comprehensive: other
                    .budget_seconds
                    .comprehensive
                    .or(self.budget_seconds.comprehensive),
            },
            patterns,
            rules,
            weights: WeightsConfig {
                tests: other.weights.tests.or(self.weights.tests),
                security: other.weights.security.or(self.weights.security),
                docs: other.weights.docs.or(self.weights.docs),
                lint: other.weights.lint.or(self.weights.lint),
                always_run: other.weights.always_run.or(self.weights.always_run),
            },
            override_categories: other.override_categories.or(self.override_categories),
            enable_test_optimization: other
                .enable_test_optimization
                .or(self.enable_test_optimization),
            enable_job_skipping: other.enable_job_skipping.or(self.enable_job_skipping),
            source_roots: other.source_roots.or(self.source_roots),
            test_roots: other.test_roots.or(self.test_roots),
            graph_workers: other.graph_workers.or(self.graph_workers),
            max_file_size: other.max_file_size.or(self.max_file_size),
            test_mapping: other.test_mapping.or(self.test_mapping),
            test_map,
            packages,
            package_discovery_depth: other.package_discovery_depth.or(self.package_discovery_depth),
        }
    }

    // ===== Accessors with defaults =====

    /// Default package discovery depth
    pub const DEFAULT_DISCOVERY_DEPTH: usize = 4;

    /// Get detection level with default fallback (standard)
    pub fn detection_level_or_default(&self) -> DetectionLevel {
        self.detection_level.unwrap_or_default()
    }

    /// Get monorepo mode with default fallback (false)
    pub fn monorepo_or_default(&self) -> bool {
        self.monorepo_mode.unwrap_or(false)
    }

    pub fn budgets_or_default(&self) -> Budgets {
        let defaults = Budgets::default();
        Budgets {
            quick: self
                .budget_seconds
                .quick
                .map(Duration::from_secs)
                .unwrap_or(defaults.quick),
            standard: self
                .budget_seconds
                .standard
                .map(Duration::from_secs)
                .unwrap_or(defaults.standard),
            comprehensive: self
                .budget_seconds
                .comprehensive
                .map(Duration::from_secs)
                .unwrap_or(defaults.comprehensive),
        }
    }

    pub fn weights_or_default(&self) -> Weights {
        let d = Weights::default();
        Weights {
            tests: self.weights.tests.unwrap_or(d.tests),
            security: self.weights.security.unwrap_or(d.security),
            docs: self.weights.docs.unwrap_or(d.docs),
            lint: self.weights.lint.unwrap_or(d.lint),
            always_run: self.weights.always_run.unwrap_or(d.always_run),
        }
    }

    pub fn policy(&self) -> Policy {
        Policy {
            weights: self.weights_or_default(),
            baseline_duration_seconds: self
                .baseline_duration_seconds
                .unwrap_or(DEFAULT_BASELINE_SECONDS),
            enable_test_optimization: self.enable_test_optimization.unwrap_or(true),
            enable_job_skipping: self.enable_job_skipping.unwrap_or(true),
        }
    }

    /// Classification rules: configured category replacements, then the
    /// remaining defaults, then extra rules
    pub fn rules(&self) -> Result<Vec<ClassificationRule>, ConfigError> {
        let mut replacements: BTreeMap<Category, Vec<String>> = BTreeMap::new();
        for (name, patterns) in &self.patterns {
            let category: Category = name
                .parse()
                .map_err(|_| ConfigError::UnknownCategory(name.clone()))?;
            replacements.insert(category, patterns.clone());
        }
        Ok(build_rules(&replacements, self.rules.clone()))
    }

    pub fn graph_options(&self) -> GraphOptions {
        GraphOptions {
            source_roots: self
                .source_roots
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| vec![".".to_string()]),
            test_roots: self.test_roots.clone().unwrap_or_default(),
            workers: self.graph_workers,
            max_file_size: self.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE),
        }
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            explicit: self.packages.clone(),
            max_depth: self
                .package_discovery_depth
                .unwrap_or(Self::DEFAULT_DISCOVERY_DEPTH),
        }
    }

    /// Everything the controller needs, with defaults filled in
    pub fn settings(&self) -> Result<AnalysisSettings, ConfigError> {
        Ok(AnalysisSettings {
            rules: self.rules()?,
            policy: self.policy(),
            override_categories: self
                .override_categories
                .iter()
                .flatten()
                .copied()
                .collect::<BTreeSet<_>>(),
            monorepo: self.monorepo_or_default(),
            discovery: self.discovery_options(),
            graph: self.graph_options(),
            test_mapping: self.test_mapping.unwrap_or_default(),
            test_roots: self.test_roots.clone().unwrap_or_default(),
            test_map: self.test_map.clone(),
            budgets: self.budgets_or_default(),
        })
    }
}
