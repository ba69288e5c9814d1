//! Module import graph
//!
//! Nodes are source files (ids are repository-relative paths). Edges are
//! either statically resolved imports or [`Edge::Unknown`], the sentinel for
//! imports whose target cannot be determined (dynamic loaders, relative
//! imports that point nowhere, files too large or too broken to parse).
//! Cycles are legal; consumers traverse with a visited set.

mod build;
mod resolve;

pub use build::{build_graph, find_test_files, GraphOptions, DEFAULT_MAX_FILE_SIZE};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use thiserror::Error;

use crate::language::Language;

/// Module identifier: repository-relative file path
pub type ModuleId = String;

/// Errors raised while building the graph
#[derive(Error, Debug)]
pub enum GraphBuildError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {0}")]
    ParseFailed(String),
    #[error("Failed to compile import query for {0}: {1}")]
    QueryCompileFailed(String, String),
    #[error("Failed to start parser pool: {0}")]
    Pool(String),
    #[error("Source root '{0}' does not exist")]
    MissingRoot(String),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] ignore::Error),
    #[error("Graph build cancelled: {0}")]
    Cancelled(String),
}

/// An import edge
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "lowercase")]
pub enum Edge {
    /// Import resolved to a module in this repository
    Static(ModuleId),
    /// Import whose target cannot be determined statically
    Unknown,
}

/// A source file in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    pub id: ModuleId,
    pub language: Language,
    pub is_test: bool,
    pub imports: BTreeSet<Edge>,
}

impl Module {
    pub fn has_unknown_edge(&self) -> bool {
        self.imports.contains(&Edge::Unknown)
    }

    /// Targets of static edges
    pub fn static_imports(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().filter_map(|e| match e {
            Edge::Static(id) => Some(id.as_str()),
            Edge::Unknown => None,
        })
    }
}

/// Directed import graph with forward and reverse adjacency
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    modules: BTreeMap<ModuleId, Module>,
    /// module -> modules it imports
    forward: HashMap<ModuleId, Vec<ModuleId>>,
    /// module -> modules importing it
    reverse: HashMap<ModuleId, Vec<ModuleId>>,
    /// modules carrying at least one unknown edge
    unknown: BTreeSet<ModuleId>,
}

/// Counts describing a graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub modules: usize,
    pub test_modules: usize,
    pub static_edges: usize,
    pub unknown_edges: usize,
}

impl DependencyGraph {
    /// Merge parsed modules into one graph.
    ///
    /// Static edges to ids that are not modules of the graph are dropped.
    pub fn from_modules(modules: impl IntoIterator<Item = Module>) -> Self {
        let modules: BTreeMap<ModuleId, Module> =
            modules.into_iter().map(|m| (m.id.clone(), m)).collect();
        let mut forward: HashMap<ModuleId, Vec<ModuleId>> = HashMap::new();
        let mut reverse: HashMap<ModuleId, Vec<ModuleId>> = HashMap::new();
        let mut unknown = BTreeSet::new();

        for module in modules.values() {
            if module.has_unknown_edge() {
                unknown.insert(module.id.clone());
            }
            for target in module.static_imports() {
                if target == module.id || !modules.contains_key(target) {
                    continue;
                }
                forward
                    .entry(module.id.clone())
                    .or_default()
                    .push(target.to_string());
                reverse
                    .entry(target.to_string())
                    .or_default()
                    .push(module.id.clone());
            }
        }

        Self {
            modules,
            forward,
            reverse,
            unknown,
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Modules in id order
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Modules importing `id`
    pub fn dependents(&self, id: &str) -> &[ModuleId] {
        self.reverse.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Modules `id` imports
    pub fn dependencies(&self, id: &str) -> &[ModuleId] {
        self.forward.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn forward_map(&self) -> &HashMap<ModuleId, Vec<ModuleId>> {
        &self.forward
    }

    pub(crate) fn reverse_map(&self) -> &HashMap<ModuleId, Vec<ModuleId>> {
        &self.reverse
    }

    /// Modules with at least one unknown edge
    pub fn unknown_modules(&self) -> &BTreeSet<ModuleId> {
        &self.unknown
    }

    pub fn test_modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values().filter(|m| m.is_test)
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            modules: self.modules.len(),
            test_modules: self.test_modules().count(),
            static_edges: self.forward.values().map(Vec::len).sum(),
            unknown_edges: self.unknown.len(),
        }
    }
}

#[cfg(test)]
pub(crate) fn module(id: &str, is_test: bool, imports: &[&str]) -> Module {
    Module {
        id: id.to_string(),
        language: Language::Python,
        is_test,
        imports: imports
            .iter()
            .map(|i| {
                if *i == "?" {
                    Edge::Unknown
                } else {
                    Edge::Static(i.to_string())
                }
            })
            .collect(),
    }
}
