//! Optimization decision
//!
//! A pure function from (categories, affected set, degraded flag) to the
//! skip flags CI consumes. Skipping is only ever granted, never assumed:
//! anything uncertain keeps every job running.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::classify::Category;
use crate::impact::AffectedSet;

/// Relative cost of each CI stage, used for the optimization score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub tests: u32,
    pub security: u32,
    pub docs: u32,
    pub lint: u32,
    /// Stages that never skip (build, packaging)
    pub always_run: u32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            tests: 40,
            security: 25,
            docs: 10,
            lint: 10,
            always_run: 15,
        }
    }
}

impl Weights {
    fn total(&self) -> u64 {
        [self.tests, self.security, self.docs, self.lint, self.always_run]
            .iter()
            .map(|w| u64::from(*w))
            .sum()
    }
}

/// Default full-pipeline duration used for time savings (8 minutes)
pub const DEFAULT_BASELINE_SECONDS: u64 = 480;

/// Policy knobs for [`decide`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub weights: Weights,
    pub baseline_duration_seconds: u64,
    pub enable_test_optimization: bool,
    pub enable_job_skipping: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            baseline_duration_seconds: DEFAULT_BASELINE_SECONDS,
            enable_test_optimization: true,
            enable_job_skipping: true,
        }
    }
}

/// Everything [`decide`] looks at
#[derive(Debug, Clone, Default)]
pub struct DecisionInput {
    pub categories: BTreeSet<Category>,
    pub affected: AffectedSet,
    pub degraded: bool,
    /// Categories that force a full run when present
    pub override_categories: BTreeSet<Category>,
}

/// What CI should skip and what it must run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizationDecision {
    pub categories: BTreeSet<Category>,
    pub skip_tests: bool,
    pub skip_security: bool,
    pub skip_docs: bool,
    pub skip_lint: bool,
    pub affected_tests: Vec<String>,
    pub affected_packages: Vec<String>,
    /// Share of weighted CI work skipped, 0..=100
    pub optimization_score: u8,
    pub estimated_time_savings_seconds: u64,
    pub degraded: bool,
    /// One explanatory line per stage
    pub reasons: BTreeMap<String, String>,
}

impl OptimizationDecision {
    /// Categories as a comma-separated list
    pub fn categories_joined(&self) -> String {
        self.categories
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn subset_of(set: &BTreeSet<Category>, allowed: &[Category]) -> bool {
    set.iter().all(|c| allowed.contains(c))
}

/// Apply the skip rules.
///
/// 1. degraded, a dependency or CI change, or an override category present:
///    nothing is skipped
/// 2. docs skip when no docs, source, or tests changed
/// 3. tests skip when only docs/config changed and test mapping is complete
/// 4. security skips when only docs/config changed
/// 5. lint skips when only docs changed
///
/// An empty change set skips nothing.
pub fn decide(input: &DecisionInput, policy: &Policy) -> OptimizationDecision {
    let cats = &input.categories;
    let mut reasons = BTreeMap::new();

    let forced = if input.degraded {
        Some("Analysis degraded; running everything".to_string())
    } else if cats.is_empty() {
        Some("No changes detected".to_string())
    } else if cats.contains(&Category::Dependencies) {
        Some("Dependency changes require a full run".to_string())
    } else if cats.contains(&Category::CI) {
        Some("CI configuration changes require a full run".to_string())
    } else {
        input
            .override_categories
            .iter()
            .find(|c| cats.contains(c))
            .map(|c| format!("Override category '{}' changed; running everything", c))
    };

    let (skip_tests, skip_security, skip_docs, skip_lint) = match &forced {
        Some(reason) => {
            for stage in ["tests", "security", "docs", "lint"] {
                reasons.insert(stage.to_string(), reason.clone());
            }
            (false, false, false, false)
        }
        None => {
            let docs_config_only = subset_of(cats, &[Category::Docs, Category::Config]);

            let skip_docs = ![Category::Docs, Category::Source, Category::Tests]
                .iter()
                .any(|c| cats.contains(c));
            reasons.insert(
                "docs".to_string(),
                if skip_docs {
                    "No documentation, source, or test changes".to_string()
                } else {
                    "Documentation-relevant changes detected".to_string()
                },
            );

            let skip_tests = docs_config_only
                && !input.affected.test_mapping_incomplete
                && policy.enable_test_optimization;
            let tests_reason = if skip_tests {
                "Only docs/config changes".to_string()
            } else if !docs_config_only {
                "Source/test changes detected".to_string()
            } else if input.affected.test_mapping_incomplete {
                "Test mapping incomplete".to_string()
            } else {
                "Test optimization disabled".to_string()
            };
            reasons.insert("tests".to_string(), tests_reason);

            let skip_security = docs_config_only && policy.enable_job_skipping;
            reasons.insert(
                "security".to_string(),
                match (skip_security, docs_config_only) {
                    (true, _) => "Only docs/config changes (no dependencies)",
                    (false, true) => "Job skipping disabled",
                    (false, false) => "Source changes require security scan",
                }
                .to_string(),
            );

            let docs_only = subset_of(cats, &[Category::Docs]);
            let skip_lint = docs_only && policy.enable_job_skipping;
            reasons.insert(
                "lint".to_string(),
                match (skip_lint, docs_only) {
                    (true, _) => "Only documentation changes",
                    (false, true) => "Job skipping disabled",
                    (false, false) => "Source/config changes require linting",
                }
                .to_string(),
            );

            (skip_tests, skip_security, skip_docs, skip_lint)
        }
    };

    let w = &policy.weights;
    let skipped: u64 = [
        (skip_tests, w.tests),
        (skip_security, w.security),
        (skip_docs, w.docs),
        (skip_lint, w.lint),
    ]
    .iter()
    .filter(|(skip, _)| *skip)
    .map(|(_, weight)| u64::from(*weight))
    .sum();
    let total = w.total();
    let optimization_score = if total == 0 {
        0
    } else {
        (100.0 * skipped as f64 / total as f64)
            .round()
            .clamp(0.0, 100.0) as u8
    };
    let estimated_time_savings_seconds = (f64::from(optimization_score) / 100.0
        * policy.baseline_duration_seconds as f64)
        .round() as u64;

    OptimizationDecision {
        categories: cats.clone(),
        skip_tests,
        skip_security,
        skip_docs,
        skip_lint,
        affected_tests: input.affected.tests.iter().cloned().collect(),
        affected_packages: input.affected.packages.iter().cloned().collect(),
        optimization_score,
        estimated_time_savings_seconds,
        degraded: input.degraded,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(cats: &[Category]) -> DecisionInput {
        DecisionInput {
            categories: cats.iter().copied().collect(),
            ..DecisionInput::default()
        }
    }

    fn any_skip(d: &OptimizationDecision) -> bool {
        d.skip_tests || d.skip_security || d.skip_docs || d.skip_lint
    }

    #[test]
    fn test_docs_only() {
        let d = decide(&input(&[Category::Docs]), &Policy::default());
        assert!(d.skip_tests);
        assert!(d.skip_security);
        assert!(d.skip_lint);
        assert!(!d.skip_docs);
        // tests 40 + security 25 + lint 10 of 100
        assert_eq!(d.optimization_score, 75);
        assert_eq!(d.estimated_time_savings_seconds, 360);
        assert!(!d.degraded);
    }

    #[test]
    fn test_dependencies_force_full_run() {
        let d = decide(
            &input(&[Category::Config, Category::Dependencies]),
            &Policy::default(),
        );
        assert!(!any_skip(&d));
        assert_eq!(d.optimization_score, 0);
        assert_eq!(d.estimated_time_savings_seconds, 0);
    }

    #[test]
    fn test_ci_forces_full_run() {
        let d = decide(&input(&[Category::Docs, Category::CI]), &Policy::default());
        assert!(!any_skip(&d));
    }

    #[test]
    fn test_override_category() {
        let mut i = input(&[Category::Docs, Category::Build]);
        let d = decide(&i, &Policy::default());
        assert!(!d.skip_docs && !d.skip_tests);
        assert!(!d.skip_lint);

        i.categories = [Category::Config].into();
        i.override_categories = [Category::Config].into();
        let d = decide(&i, &Policy::default());
        assert!(!any_skip(&d));
        assert!(d.reasons["tests"].contains("config"));
    }

    #[test]
    fn test_config_only() {
        let d = decide(&input(&[Category::Config]), &Policy::default());
        assert!(d.skip_tests);
        assert!(d.skip_security);
        assert!(d.skip_docs);
        assert!(!d.skip_lint);
        assert_eq!(d.optimization_score, 75);
    }

    #[test]
    fn test_source_change_skips_nothing_but_nothing_else() {
        let d = decide(&input(&[Category::Source]), &Policy::default());
        assert!(!any_skip(&d));
    }

    #[test]
    fn test_build_only_skips_docs() {
        let d = decide(&input(&[Category::Build]), &Policy::default());
        assert!(d.skip_docs);
        assert!(!d.skip_tests);
        assert_eq!(d.optimization_score, 10);
    }

    #[test]
    fn test_incomplete_mapping_keeps_tests() {
        let mut i = input(&[Category::Config]);
        i.affected.test_mapping_incomplete = true;
        let d = decide(&i, &Policy::default());
        assert!(!d.skip_tests);
        assert!(d.skip_security);
        assert_eq!(d.reasons["tests"], "Test mapping incomplete");
    }

    #[test]
    fn test_degraded_is_fail_safe() {
        let mut i = input(&[Category::Docs]);
        i.degraded = true;
        let d = decide(&i, &Policy::default());
        assert!(d.degraded);
        assert!(!any_skip(&d));
        assert_eq!(d.optimization_score, 0);
    }

    #[test]
    fn test_empty_change_set() {
        let d = decide(&input(&[]), &Policy::default());
        assert!(!any_skip(&d));
        assert_eq!(d.reasons["tests"], "No changes detected");
    }

    #[test]
    fn test_policy_switches() {
        let policy = Policy {
            enable_test_optimization: false,
            enable_job_skipping: false,
            ..Policy::default()
        };
        let d = decide(&input(&[Category::Docs]), &policy);
        assert!(!d.skip_tests);
        assert!(!d.skip_security);
        assert!(!d.skip_lint);
        // Docs skipping is not governed by the switches
        assert!(!d.skip_docs);
    }

    #[test]
    fn test_custom_weights_score() {
        let policy = Policy {
            weights: Weights {
                tests: 1,
                security: 1,
                docs: 1,
                lint: 0,
                always_run: 0,
            },
            baseline_duration_seconds: 100,
            ..Policy::default()
        };
        let d = decide(&input(&[Category::Config]), &policy);
        // tests + security + docs skipped
        assert_eq!(d.optimization_score, 100);
        assert_eq!(d.estimated_time_savings_seconds, 100);

        let zero = Policy {
            weights: Weights {
                tests: 0,
                security: 0,
                docs: 0,
                lint: 0,
                always_run: 0,
            },
            ..Policy::default()
        };
        assert_eq!(decide(&input(&[Category::Config]), &zero).optimization_score, 0);
    }

    #[test]
    fn test_lists_sorted() {
        let mut i = input(&[Category::Source]);
        i.affected.tests = ["tests/b.py", "tests/a.py"].into_iter().map(String::from).collect();
        i.affected.packages = ["z", "a"].into_iter().map(String::from).collect();
        let d = decide(&i, &Policy::default());
        assert_eq!(d.affected_tests, vec!["tests/a.py", "tests/b.py"]);
        assert_eq!(d.affected_packages, vec!["a", "z"]);
        assert_eq!(d.categories_joined(), "source");
    }
}
