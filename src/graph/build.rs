//! Graph construction: enumerate source files, extract imports in parallel,
//! resolve them, then merge once.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use tree_sitter::StreamingIterator;

use crate::changes::normalize_path;
use crate::controller::Deadline;
use crate::language::{ImportSpec, Language};
use crate::packages::SKIP_DIRS;

use super::resolve::Resolver;
use super::{DependencyGraph, Edge, GraphBuildError, Module};

/// Files larger than this are not parsed (1MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_048_576;

/// Knobs for [`build_graph`]
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Directories (relative to the repository root) to enumerate
    pub source_roots: Vec<String>,
    /// Extra directories holding tests. Enumerated alongside the source
    /// roots; a missing test root is skipped.
    pub test_roots: Vec<String>,
    /// Parser threads; `None` uses available parallelism
    pub workers: Option<usize>,
    /// Files above this size become modules with a single unknown edge
    pub max_file_size: u64,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            source_roots: vec![".".to_string()],
            test_roots: Vec::new(),
            workers: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Import extractor with lazily compiled per-language queries
struct ImportParser {
    queries: HashMap<Language, OnceCell<tree_sitter::Query>>,
}

impl ImportParser {
    fn new(languages: impl IntoIterator<Item = Language>) -> Self {
        Self {
            queries: languages.into_iter().map(|l| (l, OnceCell::new())).collect(),
        }
    }

    fn query(&self, language: Language) -> Result<&tree_sitter::Query, GraphBuildError> {
        let cell = self.queries.get(&language).ok_or_else(|| {
            GraphBuildError::QueryCompileFailed(language.to_string(), "not registered".into())
        })?;
        cell.get_or_try_init(|| {
            let def = language.def().ok_or_else(|| {
                GraphBuildError::QueryCompileFailed(language.to_string(), "not registered".into())
            })?;
            tree_sitter::Query::new(&(def.grammar)(), def.import_query).map_err(|e| {
                GraphBuildError::QueryCompileFailed(language.to_string(), format!("{:?}", e))
            })
        })
    }

    /// Imports declared in `source`, and whether the parse tree has errors
    fn extract(
        &self,
        language: Language,
        path: &str,
        source: &str,
    ) -> Result<(Vec<ImportSpec>, bool), GraphBuildError> {
        let def = language.def().ok_or_else(|| {
            GraphBuildError::QueryCompileFailed(language.to_string(), "not registered".into())
        })?;
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&(def.grammar)())
            .map_err(|e| GraphBuildError::ParseFailed(format!("{}: {:?}", path, e)))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| GraphBuildError::ParseFailed(path.to_string()))?;

        let query = self.query(language)?;
        let capture_names = query.capture_names();
        let mut cursor = tree_sitter::QueryCursor::new();
        let mut matches = cursor.matches(query, tree.root_node(), source.as_bytes());

        let mut specs = Vec::new();
        while let Some(m) = matches.next() {
            for cap in m.captures {
                let Some(name) = capture_names.get(cap.index as usize) else {
                    continue;
                };
                specs.extend((def.extract_import)(name, cap.node, source));
            }
        }
        Ok((specs, tree.root_node().has_error()))
    }
}

/// Source files under the source and test roots whose extension maps to a
/// language
fn enumerate_sources(
    root: &Path,
    options: &GraphOptions,
) -> Result<Vec<(String, PathBuf, Language)>, GraphBuildError> {
    let mut files = Vec::new();
    let mut seen = HashSet::new();
    let roots = options
        .source_roots
        .iter()
        .map(|r| (r, true))
        .chain(options.test_roots.iter().map(|r| (r, false)));
    for (source_root, required) in roots {
        let dir = root.join(source_root);
        if !dir.is_dir() {
            if required {
                return Err(GraphBuildError::MissingRoot(source_root.clone()));
            }
            tracing::warn!(root = %source_root, "Test root does not exist, skipping");
            continue;
        }
        let walker = WalkBuilder::new(&dir)
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .require_git(false)
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !(e.file_type().is_some_and(|t| t.is_dir()) && SKIP_DIRS.contains(&&*name))
            })
            .build();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let Some(language) = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(Language::from_extension)
            else {
                continue;
            };
            let rel = normalize_path(&path.strip_prefix(root).unwrap_or(path).to_string_lossy());
            if seen.insert(rel.clone()) {
                files.push((rel, path.to_path_buf(), language));
            }
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Test files under the source and test roots, recognized by name without
/// parsing
pub fn find_test_files(
    root: &Path,
    options: &GraphOptions,
) -> Result<BTreeSet<String>, GraphBuildError> {
    let _span = tracing::info_span!("find_test_files", root = %root.display()).entered();
    let tests: BTreeSet<String> = enumerate_sources(root, options)?
        .into_iter()
        .filter(|(rel, _, language)| language.def().is_some_and(|def| (def.is_test_file)(rel)))
        .map(|(rel, _, _)| rel)
        .collect();
    tracing::debug!(tests = tests.len(), "Enumerated test files");
    Ok(tests)
}

/// Build the import graph of the repository at `root`.
///
/// Files are parsed on a dedicated worker pool. The deadline is checked
/// before each file; once it passes the build stops with
/// [`GraphBuildError::Cancelled`] instead of returning a partial graph.
pub fn build_graph(
    root: &Path,
    options: &GraphOptions,
    deadline: &Deadline,
) -> Result<DependencyGraph, GraphBuildError> {
    let _span = tracing::info_span!("build_graph", root = %root.display()).entered();

    let files = enumerate_sources(root, options)?;
    tracing::debug!(files = files.len(), "Enumerated source files");

    let known: HashSet<String> = files.iter().map(|(rel, _, _)| rel.clone()).collect();
    let resolver = Resolver::new(&known, &options.source_roots);
    let languages: HashSet<Language> = files.iter().map(|(_, _, l)| *l).collect();
    let parser = ImportParser::new(languages);

    let workers = options.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    });
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("ciscope-parse-{}", i))
        .build()
        .map_err(|e| GraphBuildError::Pool(e.to_string()))?;

    let modules: Vec<Option<Module>> = pool.install(|| {
        files
            .par_iter()
            .map(|(rel, path, language)| {
                if deadline.is_expired() {
                    return Err(GraphBuildError::Cancelled(format!(
                        "deadline passed before {}",
                        rel
                    )));
                }
                parse_module(&parser, &resolver, rel, path, *language, options.max_file_size)
            })
            .collect::<Result<Vec<_>, GraphBuildError>>()
    })?;

    let graph = DependencyGraph::from_modules(modules.into_iter().flatten());
    let stats = graph.stats();
    tracing::info!(
        modules = stats.modules,
        tests = stats.test_modules,
        edges = stats.static_edges,
        unknown = stats.unknown_edges,
        "Dependency graph built"
    );
    Ok(graph)
}

/// Parse one file into a module. `None` for files that are not UTF-8.
fn parse_module(
    parser: &ImportParser,
    resolver: &Resolver<'_>,
    rel: &str,
    path: &Path,
    language: Language,
    max_file_size: u64,
) -> Result<Option<Module>, GraphBuildError> {
    let is_test = language
        .def()
        .is_some_and(|def| (def.is_test_file)(rel));
    let io_err = |source| GraphBuildError::Io {
        path: rel.to_string(),
        source,
    };

    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if size > max_file_size {
        tracing::warn!(path = rel, size, "File too large to parse, import edges unknown");
        return Ok(Some(Module {
            id: rel.to_string(),
            language,
            is_test,
            imports: [Edge::Unknown].into(),
        }));
    }

    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            tracing::debug!(path = rel, "Skipping non-UTF8 file");
            return Ok(None);
        }
        Err(e) => return Err(io_err(e)),
    };

    let (specs, has_error) = parser.extract(language, rel, &source)?;
    let mut imports: BTreeSet<Edge> = specs
        .iter()
        .flat_map(|spec| resolver.resolve(rel, language, spec))
        .collect();
    if has_error {
        tracing::debug!(path = rel, "Parse tree has errors, adding unknown edge");
        imports.insert(Edge::Unknown);
    }

    Ok(Some(Module {
        id: rel.to_string(),
        language,
        is_test,
        imports,
    }))
}
