//! File classification by ordered glob rules
//!
//! Each changed file is checked against every rule in declaration order and
//! collects every category whose pattern matches. Classification is additive:
//! `pyproject.toml` is both config and a dependency manifest. A file that
//! matches nothing is treated as source.
//!
//! Pattern semantics:
//! - `*` may cross `/`, so `*.md` matches `docs/guide/intro.md`
//! - a pattern without `/` is also tried against the file name, so
//!   `pyproject.toml` matches `packages/api/pyproject.toml`
//! - `dir/**` matches everything under `dir`

use std::collections::{BTreeMap, BTreeSet};

use globset::{GlobBuilder, GlobMatcher};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::changes::{ChangeKind, ChangedFile};

/// Below this many files, sequential matching beats rayon's overhead.
const PARALLEL_THRESHOLD: usize = 50;

/// Kind of CI-relevant content a file holds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Docs,
    Source,
    Tests,
    Config,
    Dependencies,
    CI,
    Build,
}

impl Category {
    /// All categories in declaration order
    pub const ALL: [Category; 7] = [
        Category::Docs,
        Category::Source,
        Category::Tests,
        Category::Config,
        Category::Dependencies,
        Category::CI,
        Category::Build,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Docs => write!(f, "docs"),
            Category::Source => write!(f, "source"),
            Category::Tests => write!(f, "tests"),
            Category::Config => write!(f, "config"),
            Category::Dependencies => write!(f, "dependencies"),
            Category::CI => write!(f, "ci"),
            Category::Build => write!(f, "build"),
        }
    }
}

/// Error returned when parsing an invalid Category string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCategoryError {
    /// The invalid input string
    pub input: String,
}

impl std::fmt::Display for ParseCategoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unknown category: '{}'. Valid options: docs, source, tests, config, dependencies, ci, build",
            self.input
        )
    }
}

impl std::error::Error for ParseCategoryError {}

impl std::str::FromStr for Category {
    type Err = ParseCategoryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docs" => Ok(Category::Docs),
            "source" => Ok(Category::Source),
            "tests" => Ok(Category::Tests),
            "config" => Ok(Category::Config),
            "dependencies" => Ok(Category::Dependencies),
            "ci" => Ok(Category::CI),
            "build" => Ok(Category::Build),
            _ => Err(ParseCategoryError {
                input: s.to_string(),
            }),
        }
    }
}

/// Errors building a classifier from rules
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Invalid pattern '{pattern}' for category {category}: {source}")]
    InvalidPattern {
        category: Category,
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// One `(category, glob)` rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub category: Category,
    pub pattern: String,
}

impl ClassificationRule {
    pub fn new(category: Category, pattern: impl Into<String>) -> Self {
        Self {
            category,
            pattern: pattern.into(),
        }
    }
}

/// Default pattern list per category, in declaration order.
pub fn default_patterns(category: Category) -> &'static [&'static str] {
    match category {
        Category::Docs => &[
            "docs/**",
            "*.md",
            "*.rst",
            "*.txt",
            "README*",
            "CHANGELOG*",
            "LICENSE*",
        ],
        Category::Source => &[
            "src/**", "lib/**", "**/*.py", "**/*.js", "**/*.ts", "**/*.tsx", "**/*.jsx",
            "**/*.rs", "**/*.go",
        ],
        Category::Tests => &[
            "tests/**",
            "**/*test*.py",
            "**/conftest.py",
            "**/*.test.ts",
            "**/*.test.js",
            "**/*.spec.ts",
            "**/*.spec.js",
            "**/*_test.go",
        ],
        Category::Config => &["*.toml", "*.yml", "*.yaml", "*.json", "*.cfg", "*.ini"],
        Category::Dependencies => &[
            "requirements*.txt",
            "pyproject.toml",
            "package.json",
            "package-lock.json",
            "yarn.lock",
            "pnpm-lock.yaml",
            "Pipfile*",
            "poetry.lock",
            "pixi.toml",
            "pixi.lock",
            "Cargo.toml",
            "Cargo.lock",
            "go.mod",
            "go.sum",
        ],
        Category::CI => &[
            ".github/workflows/**",
            ".github/actions/**",
            ".gitlab-ci.yml",
            ".circleci/**",
            "Jenkinsfile",
        ],
        Category::Build => &[
            "Dockerfile*",
            "docker-compose*.yml",
            "Makefile",
            "setup.py",
            "setup.cfg",
            "CMakeLists.txt",
            "build.gradle",
            "pom.xml",
            "build.rs",
        ],
    }
}

/// The built-in rule list
pub fn default_rules() -> Vec<ClassificationRule> {
    build_rules(&BTreeMap::new(), Vec::new())
}

/// Assemble the rule list: per-category replacements, then extra rules.
///
/// Categories absent from `replacements` keep their defaults. Extra rules are
/// appended after all category rules.
pub fn build_rules(
    replacements: &BTreeMap<Category, Vec<String>>,
    extra: Vec<ClassificationRule>,
) -> Vec<ClassificationRule> {
    let mut rules = Vec::new();
    for category in Category::ALL {
        match replacements.get(&category) {
            Some(patterns) => rules.extend(
                patterns
                    .iter()
                    .map(|p| ClassificationRule::new(category, p.clone())),
            ),
            None => rules.extend(
                default_patterns(category)
                    .iter()
                    .map(|p| ClassificationRule::new(category, *p)),
            ),
        }
    }
    rules.extend(extra);
    rules
}

/// Result of classifying one changed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileClassification {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    pub categories: BTreeSet<Category>,
    /// True when no rule matched and the file fell back to source
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub defaulted: bool,
}

impl FileClassification {
    pub fn is(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    /// New path, then the old path for renames
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.path.as_str()).chain(self.previous_path.as_deref())
    }
}

struct CompiledRule {
    category: Category,
    matcher: GlobMatcher,
    match_basename: bool,
}

/// Compiled rule list
pub struct Classifier {
    rules: Vec<CompiledRule>,
}

impl Classifier {
    /// Compile the given rules. Fails on the first malformed glob.
    pub fn new(rules: &[ClassificationRule]) -> Result<Self, ClassifyError> {
        let compiled = rules
            .iter()
            .map(|rule| {
                let glob = GlobBuilder::new(&rule.pattern)
                    .literal_separator(false)
                    .build()
                    .map_err(|source| ClassifyError::InvalidPattern {
                        category: rule.category,
                        pattern: rule.pattern.clone(),
                        source,
                    })?;
                Ok(CompiledRule {
                    category: rule.category,
                    matcher: glob.compile_matcher(),
                    match_basename: !rule.pattern.contains('/'),
                })
            })
            .collect::<Result<Vec<_>, ClassifyError>>()?;
        tracing::debug!(rules = compiled.len(), "Compiled classification rules");
        Ok(Self { rules: compiled })
    }

    /// Classifier with the built-in rules
    pub fn with_defaults() -> Result<Self, ClassifyError> {
        Self::new(&default_rules())
    }

    /// Categories matched by a path; empty when no rule applies
    pub fn matching_categories(&self, path: &str) -> BTreeSet<Category> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        self.rules
            .iter()
            .filter(|r| {
                r.matcher.is_match(path) || (r.match_basename && r.matcher.is_match(file_name))
            })
            .map(|r| r.category)
            .collect()
    }

    /// Classify one changed file. Never yields an empty category set.
    pub fn classify(&self, change: &ChangedFile) -> FileClassification {
        let mut categories = self.matching_categories(&change.path);
        let defaulted = categories.is_empty();
        if defaulted {
            tracing::warn!(
                path = %change.path,
                "No classification rule matched, treating as source"
            );
            categories.insert(Category::Source);
        }
        FileClassification {
            path: change.path.clone(),
            kind: change.kind,
            previous_path: change.previous_path.clone(),
            categories,
            defaulted,
        }
    }

    /// Classify a change set, preserving input order.
    ///
    /// Runs on the rayon pool at or above [`PARALLEL_THRESHOLD`] files.
    pub fn classify_all(&self, changes: &[ChangedFile]) -> Vec<FileClassification> {
        let _span = tracing::info_span!("classify_all", files = changes.len()).entered();
        if changes.len() >= PARALLEL_THRESHOLD {
            changes.par_iter().map(|c| self.classify(c)).collect()
        } else {
            changes.iter().map(|c| self.classify(c)).collect()
        }
    }
}

/// Union of categories across a classified change set
pub fn category_set(classified: &[FileClassification]) -> BTreeSet<Category> {
    classified
        .iter()
        .flat_map(|c| c.categories.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats(path: &str) -> BTreeSet<Category> {
        let classifier = Classifier::with_defaults().unwrap();
        classifier
            .classify(&ChangedFile::new(path, ChangeKind::Modified))
            .categories
    }

    fn set(items: &[Category]) -> BTreeSet<Category> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_readme_is_docs_only() {
        assert_eq!(cats("README.md"), set(&[Category::Docs]));
    }

    #[test]
    fn test_pyproject_is_config_and_dependencies() {
        assert_eq!(
            cats("pyproject.toml"),
            set(&[Category::Config, Category::Dependencies])
        );
    }

    #[test]
    fn test_nested_manifest_matches_by_basename() {
        let c = cats("packages/api/pyproject.toml");
        assert!(c.contains(&Category::Dependencies));
        assert!(c.contains(&Category::Config));
    }

    #[test]
    fn test_star_crosses_directories() {
        assert_eq!(cats("docs/guide/intro.md"), set(&[Category::Docs]));
        assert_eq!(cats("notes/deep/dir/file.rst"), set(&[Category::Docs]));
    }

    #[test]
    fn test_source_and_tests() {
        assert_eq!(cats("src/pkgA/util.py"), set(&[Category::Source]));
        let t = cats("tests/test_util.py");
        assert!(t.contains(&Category::Tests));
        assert!(t.contains(&Category::Source));
    }

    #[test]
    fn test_workflow_is_ci_and_config() {
        let c = cats(".github/workflows/ci.yml");
        assert!(c.contains(&Category::CI));
        assert!(c.contains(&Category::Config));
    }

    #[test]
    fn test_build_files() {
        assert!(cats("Dockerfile").contains(&Category::Build));
        assert!(cats("services/web/Dockerfile.prod").contains(&Category::Build));
        assert!(cats("setup.py").contains(&Category::Build));
    }

    #[test]
    fn test_unmatched_defaults_to_source() {
        let classifier = Classifier::with_defaults().unwrap();
        let c = classifier.classify(&ChangedFile::new("assets/logo.svg", ChangeKind::Added));
        assert_eq!(c.categories, set(&[Category::Source]));
        assert!(c.defaulted);
    }

    #[test]
    fn test_rename_classified_by_new_path() {
        let classifier = Classifier::with_defaults().unwrap();
        let c = classifier.classify(&ChangedFile::renamed("src/a.py", "docs/a.md"));
        assert_eq!(c.categories, set(&[Category::Docs]));
        assert_eq!(c.previous_path.as_deref(), Some("src/a.py"));
    }

    #[test]
    fn test_replacement_patterns() {
        let mut replacements = BTreeMap::new();
        replacements.insert(Category::Docs, vec!["handbook/**".to_string()]);
        let rules = build_rules(&replacements, Vec::new());
        let classifier = Classifier::new(&rules).unwrap();
        let handbook = classifier.matching_categories("handbook/index.html");
        assert!(handbook.contains(&Category::Docs));
        // README no longer docs once the docs list is replaced
        assert!(!classifier
            .matching_categories("README.md")
            .contains(&Category::Docs));
    }

    #[test]
    fn test_extra_rules_are_appended() {
        let rules = build_rules(
            &BTreeMap::new(),
            vec![ClassificationRule::new(Category::Build, "*.bzl")],
        );
        assert_eq!(
            rules.last(),
            Some(&ClassificationRule::new(Category::Build, "*.bzl"))
        );
        let classifier = Classifier::new(&rules).unwrap();
        assert_eq!(
            classifier.matching_categories("tools/defs.bzl"),
            set(&[Category::Build])
        );
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let rules = vec![ClassificationRule::new(Category::Docs, "docs/[")];
        let err = Classifier::new(&rules).err().unwrap();
        assert!(err.to_string().contains("docs/["));
    }

    #[test]
    fn test_classify_all_preserves_order_in_parallel() {
        let classifier = Classifier::with_defaults().unwrap();
        let changes: Vec<_> = (0..200)
            .map(|i| {
                let path = if i % 2 == 0 {
                    format!("docs/page{i}.md")
                } else {
                    format!("src/mod{i}.py")
                };
                ChangedFile::new(path, ChangeKind::Modified)
            })
            .collect();
        let result = classifier.classify_all(&changes);
        assert_eq!(result.len(), 200);
        for (change, class) in changes.iter().zip(&result) {
            assert_eq!(change.path, class.path);
        }
        assert!(result[0].is(Category::Docs));
        assert!(result[1].is(Category::Source));
    }

    #[test]
    fn test_category_round_trip_names() {
        for c in Category::ALL {
            assert_eq!(c.to_string().parse::<Category>().unwrap(), c);
        }
        assert!("nope".parse::<Category>().is_err());
        assert_eq!(serde_json::to_string(&Category::CI).unwrap(), "\"ci\"");
    }

    #[test]
    fn test_category_set_union() {
        let classifier = Classifier::with_defaults().unwrap();
        let classified = classifier.classify_all(&[
            ChangedFile::new("README.md", ChangeKind::Modified),
            ChangedFile::new("settings.json", ChangeKind::Modified),
        ]);
        assert_eq!(
            category_set(&classified),
            set(&[Category::Docs, Category::Config])
        );
    }
}
