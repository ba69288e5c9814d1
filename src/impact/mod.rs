//! Impact propagation
//!
//! Turns a classified change set into the set of affected modules and the
//! tests that must run. Three depths are available, matching the detection
//! levels:
//! - [`propagate`] walks the full import graph
//! - [`propagate_by_name`] maps changed files to tests by name only
//! - [`propagate_quick`] runs only the tests that changed
//!
//! Every variant reports `test_mapping_incomplete` when some affected source
//! module has no test that reaches or maps to it.

pub(crate) mod bfs;
mod mapping;
mod types;

pub use mapping::{
    mapper_for, CompositeMapper, ManifestMapper, NamingConventionMapper, TestMapper,
};
pub use types::{AffectedSet, TestMappingMode};

use std::collections::BTreeSet;

use crate::changes::ChangeKind;
use crate::classify::{Category, FileClassification};
use crate::graph::DependencyGraph;
use crate::language::is_test_path;

/// Whether a changed file is a test rather than code under test
fn is_test_change(c: &FileClassification) -> bool {
    c.is(Category::Tests) || is_test_path(&c.path)
}

/// Changed test files that still exist at head
fn changed_tests(classified: &[FileClassification]) -> BTreeSet<String> {
    classified
        .iter()
        .filter(|c| c.kind != ChangeKind::Deleted && is_test_path(&c.path))
        .map(|c| c.path.clone())
        .collect()
}

/// Changed files classified as source that are not tests, all touched paths
fn changed_source(classified: &[FileClassification]) -> BTreeSet<String> {
    classified
        .iter()
        .filter(|c| c.is(Category::Source) && !is_test_change(c))
        .flat_map(|c| c.touched_paths().map(str::to_string))
        .collect()
}

/// Full propagation over the import graph.
///
/// Seeds are the changed paths present in the graph. When any source file
/// changed, every module with an unknown edge is seeded too, since it may
/// load the changed file at runtime. Affected modules are the seeds plus
/// everything that transitively imports one.
pub fn propagate(
    graph: &DependencyGraph,
    classified: &[FileClassification],
    mapper: &dyn TestMapper,
) -> AffectedSet {
    let _span = tracing::info_span!("propagate", changed = classified.len()).entered();

    let touched: BTreeSet<&str> = classified.iter().flat_map(|c| c.touched_paths()).collect();
    let source_changed = classified.iter().any(|c| c.is(Category::Source))
        || touched.iter().any(|p| graph.contains(p));

    let mut seeds: BTreeSet<&str> = touched
        .iter()
        .copied()
        .filter(|p| graph.contains(p))
        .collect();
    if source_changed {
        seeds.extend(graph.unknown_modules().iter().map(String::as_str));
    }
    let seeds: Vec<&str> = seeds.into_iter().collect();
    let reached = bfs::reverse_bfs_multi(graph.reverse_map(), &seeds);

    let test_universe: BTreeSet<String> = graph.test_modules().map(|m| m.id.clone()).collect();
    let covered = bfs::forward_reachable(
        graph.forward_map(),
        test_universe.iter().map(String::as_str),
    );

    let mut affected = AffectedSet {
        tests: changed_tests(classified),
        ..AffectedSet::default()
    };
    for id in reached.into_keys() {
        let Some(module) = graph.get(&id) else {
            continue;
        };
        if module.is_test {
            affected.tests.insert(id.clone());
        } else {
            let mapped = mapper.map(&id, &test_universe);
            if mapped.is_empty() && !covered.contains(id.as_str()) {
                affected.unmapped_modules.insert(id.clone());
            }
            affected.tests.extend(mapped);
        }
        affected.modules.insert(id);
    }

    // Source outside the graph (unsupported language, deleted file): its
    // importers are unknown
    for path in changed_source(classified) {
        if graph.contains(&path) {
            continue;
        }
        affected.tests.extend(mapper.map(&path, &test_universe));
        affected.unmapped_modules.insert(path.clone());
        affected.modules.insert(path);
    }

    affected.test_mapping_incomplete = !affected.unmapped_modules.is_empty();
    tracing::info!(
        seeds = seeds.len(),
        modules = affected.modules.len(),
        tests = affected.tests.len(),
        unmapped = affected.unmapped_modules.len(),
        "Impact propagated"
    );
    affected
}

/// Name-based propagation without a graph.
///
/// `test_files` is every test file in the repository; changed source files
/// are mapped against it with `mapper`.
pub fn propagate_by_name(
    classified: &[FileClassification],
    test_files: &BTreeSet<String>,
    mapper: &dyn TestMapper,
) -> AffectedSet {
    let _span = tracing::info_span!("propagate_by_name", changed = classified.len()).entered();
    let mut affected = AffectedSet {
        modules: classified
            .iter()
            .filter(|c| c.is(Category::Source) || c.is(Category::Tests))
            .flat_map(|c| c.touched_paths().map(str::to_string))
            .collect(),
        tests: changed_tests(classified),
        ..AffectedSet::default()
    };
    for path in changed_source(classified) {
        let mapped = mapper.map(&path, test_files);
        if mapped.is_empty() {
            affected.unmapped_modules.insert(path);
        }
        affected.tests.extend(mapped);
    }
    affected.test_mapping_incomplete = !affected.unmapped_modules.is_empty();
    affected
}

/// Changed tests only. Incomplete whenever non-test source changed.
pub fn propagate_quick(classified: &[FileClassification]) -> AffectedSet {
    let unmapped = changed_source(classified);
    AffectedSet {
        modules: classified
            .iter()
            .filter(|c| c.is(Category::Source) || c.is(Category::Tests))
            .flat_map(|c| c.touched_paths().map(str::to_string))
            .collect(),
        tests: changed_tests(classified),
        test_mapping_incomplete: !unmapped.is_empty(),
        unmapped_modules: unmapped,
        ..AffectedSet::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangedFile;
    use crate::classify::Classifier;
    use crate::graph::module;

    fn classify(paths: &[&str]) -> Vec<FileClassification> {
        let classifier = Classifier::with_defaults().unwrap();
        let changes: Vec<ChangedFile> = paths
            .iter()
            .map(|p| ChangedFile::new(*p, ChangeKind::Modified))
            .collect();
        classifier.classify_all(&changes)
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// core <- api <- tests/test_api.py; util stands alone
    fn sample_graph() -> DependencyGraph {
        DependencyGraph::from_modules(vec![
            module("app/core.py", false, &[]),
            module("app/api.py", false, &["app/core.py"]),
            module("app/util.py", false, &[]),
            module("tests/test_api.py", true, &["app/api.py"]),
        ])
    }

    #[test]
    fn test_propagate_transitive_dependents() {
        let graph = sample_graph();
        let mapper = NamingConventionMapper::default();
        let affected = propagate(&graph, &classify(&["app/core.py"]), &mapper);
        assert_eq!(
            affected.modules,
            set(&["app/api.py", "app/core.py", "tests/test_api.py"])
        );
        assert_eq!(affected.tests, set(&["tests/test_api.py"]));
        assert!(!affected.test_mapping_incomplete);
    }

    #[test]
    fn test_propagate_uncovered_module_is_incomplete() {
        let graph = sample_graph();
        let mapper = NamingConventionMapper::default();
        let affected = propagate(&graph, &classify(&["app/util.py"]), &mapper);
        assert!(affected.tests.is_empty());
        assert!(affected.test_mapping_incomplete);
        assert_eq!(affected.unmapped_modules, set(&["app/util.py"]));
    }

    #[test]
    fn test_propagate_unknown_edge_modules_seeded() {
        let graph = DependencyGraph::from_modules(vec![
            module("app/plugins.py", false, &["?"]),
            module("app/audio.py", false, &[]),
            module("tests/test_plugins.py", true, &["app/plugins.py"]),
        ]);
        let mapper = NamingConventionMapper::default();
        let affected = propagate(&graph, &classify(&["app/audio.py"]), &mapper);
        assert!(affected.modules.contains("app/plugins.py"));
        assert!(affected.tests.contains("tests/test_plugins.py"));
    }

    #[test]
    fn test_propagate_docs_change_reaches_nothing() {
        let graph = DependencyGraph::from_modules(vec![module("app/plugins.py", false, &["?"])]);
        let mapper = NamingConventionMapper::default();
        let affected = propagate(&graph, &classify(&["README.md"]), &mapper);
        assert!(affected.modules.is_empty());
        assert!(!affected.test_mapping_incomplete);
    }

    #[test]
    fn test_propagate_cycle_terminates() {
        let graph = DependencyGraph::from_modules(vec![
            module("a.py", false, &["b.py"]),
            module("b.py", false, &["a.py"]),
            module("tests/test_a.py", true, &["a.py"]),
        ]);
        let mapper = NamingConventionMapper::default();
        let affected = propagate(&graph, &classify(&["b.py"]), &mapper);
        assert_eq!(affected.modules, set(&["a.py", "b.py", "tests/test_a.py"]));
        assert!(!affected.test_mapping_incomplete);
    }

    #[test]
    fn test_propagate_source_outside_graph_is_unmapped() {
        let graph = sample_graph();
        let mapper = NamingConventionMapper::default();
        let affected = propagate(&graph, &classify(&["cmd/server.go"]), &mapper);
        assert!(affected.modules.contains("cmd/server.go"));
        assert!(affected.test_mapping_incomplete);
    }

    #[test]
    fn test_propagate_deleted_test_not_scheduled() {
        let graph = sample_graph();
        let classifier = Classifier::with_defaults().unwrap();
        let classified =
            classifier.classify_all(&[ChangedFile::new("tests/test_old.py", ChangeKind::Deleted)]);
        let mapper = NamingConventionMapper::default();
        let affected = propagate(&graph, &classified, &mapper);
        assert!(affected.tests.is_empty());
    }

    #[test]
    fn test_propagate_by_name() {
        let tests = set(&["tests/test_models.py", "tests/test_views.py"]);
        let mapper = NamingConventionMapper::default();
        let affected = propagate_by_name(
            &classify(&["src/app/models.py", "tests/test_views.py"]),
            &tests,
            &mapper,
        );
        assert_eq!(
            affected.tests,
            set(&["tests/test_models.py", "tests/test_views.py"])
        );
        assert!(!affected.test_mapping_incomplete);

        let affected = propagate_by_name(&classify(&["src/app/db.py"]), &tests, &mapper);
        assert!(affected.test_mapping_incomplete);
        assert_eq!(affected.unmapped_modules, set(&["src/app/db.py"]));
    }

    #[test]
    fn test_propagate_quick() {
        let affected = propagate_quick(&classify(&["tests/test_a.py", "README.md"]));
        assert_eq!(affected.tests, set(&["tests/test_a.py"]));
        assert!(!affected.test_mapping_incomplete);

        let affected = propagate_quick(&classify(&["src/a.py"]));
        assert!(affected.test_mapping_incomplete);
    }
}
