//! Property tests for classification and the decision policy

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use proptest::prelude::*;

use ciscope::controller::{AnalysisRequest, AnalysisSettings, Budgets, ChangeSource, Controller};
use ciscope::decision::{decide, DecisionInput, OptimizationDecision, Policy};
use ciscope::impact::AffectedSet;
use ciscope::{Category, Classifier, DetectionLevel};
use common::{modified, TestRepo};

fn category_set() -> impl Strategy<Value = BTreeSet<Category>> {
    proptest::sample::subsequence(Category::ALL.to_vec(), 0..=Category::ALL.len())
        .prop_map(|v| v.into_iter().collect())
}

fn input(categories: BTreeSet<Category>, incomplete: bool, degraded: bool) -> DecisionInput {
    DecisionInput {
        categories,
        affected: AffectedSet {
            test_mapping_incomplete: incomplete,
            ..Default::default()
        },
        degraded,
        ..Default::default()
    }
}

fn flags(d: &OptimizationDecision) -> [bool; 4] {
    [d.skip_tests, d.skip_security, d.skip_docs, d.skip_lint]
}

fn nothing_skipped(d: &OptimizationDecision) -> bool {
    flags(d).iter().all(|f| !f)
}

proptest! {
    #[test]
    fn prop_classification_is_total(paths in prop::collection::vec("[a-zA-Z0-9_./-]{1,40}", 1..20)) {
        let classifier = Classifier::with_defaults().unwrap();
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        for c in classifier.classify_all(&modified(&refs)) {
            prop_assert!(!c.categories.is_empty(), "{} has no category", c.path);
        }
    }

    #[test]
    fn prop_classification_is_idempotent(paths in prop::collection::vec("[a-z/]{1,12}\\.(py|md|toml|yml|rs)", 1..20)) {
        let classifier = Classifier::with_defaults().unwrap();
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let changes = modified(&refs);
        let first = classifier.classify_all(&changes);
        let second = classifier.classify_all(&changes);
        prop_assert_eq!(&first, &second);

        let categories: BTreeSet<Category> =
            first.iter().flat_map(|c| c.categories.iter().copied()).collect();
        let a = decide(&input(categories.clone(), false, false), &Policy::default());
        let b = decide(&input(categories, false, false), &Policy::default());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_config_to_dependencies_never_adds_skips(
        mut set in category_set(),
        incomplete in any::<bool>(),
    ) {
        set.insert(Category::Config);
        let before = decide(&input(set.clone(), incomplete, false), &Policy::default());
        set.remove(&Category::Config);
        set.insert(Category::Dependencies);
        let after = decide(&input(set, incomplete, false), &Policy::default());
        for (b, a) in flags(&before).iter().zip(flags(&after)) {
            prop_assert!(*b || !a, "skip flag moved false -> true");
        }
    }

    #[test]
    fn prop_adding_a_category_never_adds_skips(
        set in category_set().prop_filter("an empty change set skips nothing", |s| !s.is_empty()),
        extra in proptest::sample::select(Category::ALL.to_vec()),
    ) {
        let before = decide(&input(set.clone(), false, false), &Policy::default());
        let mut bigger = set;
        bigger.insert(extra);
        let after = decide(&input(bigger, false, false), &Policy::default());
        for (b, a) in flags(&before).iter().zip(flags(&after)) {
            prop_assert!(*b || !a);
        }
    }

    #[test]
    fn prop_ci_or_dependencies_overrides_everything(
        mut set in category_set(),
        which in proptest::sample::select(vec![Category::CI, Category::Dependencies]),
    ) {
        set.insert(which);
        let d = decide(&input(set, false, false), &Policy::default());
        prop_assert!(nothing_skipped(&d));
        prop_assert_eq!(d.optimization_score, 0);
    }

    #[test]
    fn prop_degraded_skips_nothing(set in category_set(), incomplete in any::<bool>()) {
        let d = decide(&input(set, incomplete, true), &Policy::default());
        prop_assert!(d.degraded);
        prop_assert!(nothing_skipped(&d));
    }

    #[test]
    fn prop_score_bounds(set in category_set()) {
        let policy = Policy::default();
        let d = decide(&input(set, false, false), &policy);
        prop_assert!(d.optimization_score <= 100);
        prop_assert!(d.estimated_time_savings_seconds <= policy.baseline_duration_seconds);
        if nothing_skipped(&d) {
            prop_assert_eq!(d.optimization_score, 0);
        }
    }
}

#[test]
fn test_exhausted_budget_degrades_every_level() {
    let repo = TestRepo::new();
    repo.write("src/app.py", "import os\n");
    let settings = AnalysisSettings {
        budgets: Budgets {
            quick: Duration::ZERO,
            standard: Duration::ZERO,
            comprehensive: Duration::ZERO,
        },
        ..Default::default()
    };
    let controller = Controller::new(settings).unwrap();
    for level in [
        DetectionLevel::Quick,
        DetectionLevel::Standard,
        DetectionLevel::Comprehensive,
    ] {
        let outcome = controller
            .run(AnalysisRequest {
                root: repo.path().to_path_buf(),
                changes: ChangeSource::Files(modified(&["README.md", "src/app.py"])),
                level,
            })
            .unwrap();
        assert!(outcome.is_degraded(), "{level} should degrade");
        assert!(outcome.decision.degraded);
        assert!(nothing_skipped(&outcome.decision));
    }
}

#[test]
fn test_repeated_runs_on_same_refs_agree() {
    let Some(repo) = TestRepo::git() else {
        return;
    };
    common::python_project(&repo);
    repo.commit("initial");
    repo.write("app/core.py", "def compute():\n    return 2\n")
        .write("docs/notes.md", "# notes\n");
    repo.commit("change");

    let controller = Controller::new(AnalysisSettings::default()).unwrap();
    for level in [
        DetectionLevel::Quick,
        DetectionLevel::Standard,
        DetectionLevel::Comprehensive,
    ] {
        let run = || {
            controller
                .run(AnalysisRequest {
                    root: repo.path().to_path_buf(),
                    changes: ChangeSource::Git {
                        base: "HEAD~1".into(),
                        head: "HEAD".into(),
                    },
                    level,
                })
                .unwrap()
        };
        let first = run();
        let second = run();
        assert!(!first.is_degraded(), "{level}: {:?}", first.degraded_reason);
        assert_eq!(first.decision, second.decision, "{level}");
        assert_eq!(first.classifications, second.classifications, "{level}");
        assert_eq!(first.affected, second.affected, "{level}");
    }
}
