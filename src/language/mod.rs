//! Language registry for import extraction
//!
//! Each supported language provides a tree-sitter grammar, a query selecting
//! the nodes that may declare a dependency on another file, and a function
//! turning a captured node into [`ImportSpec`]s. Languages are registered at
//! compile time based on feature flags.
//!
//! # Feature Flags
//!
//! - `lang-rust` - Rust support (enabled by default)
//! - `lang-python` - Python support (enabled by default)
//! - `lang-typescript` - TypeScript and TSX support (enabled by default)
//! - `lang-javascript` - JavaScript support (enabled by default)
//! - `lang-all` - All languages

use std::collections::HashMap;
use std::sync::LazyLock;

#[cfg(feature = "lang-javascript")]
mod javascript;
#[cfg(feature = "lang-python")]
mod python;
#[cfg(feature = "lang-rust")]
mod rust;
#[cfg(any(feature = "lang-javascript", feature = "lang-typescript"))]
mod script;
#[cfg(feature = "lang-typescript")]
mod typescript;

/// An import as written in source, before resolution against the repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportSpec {
    /// Python module path. `level` counts leading dots (0 = absolute).
    /// `names` are the imported members of a `from` import, which may
    /// themselves be submodules.
    Python {
        level: usize,
        module: String,
        names: Vec<String>,
    },
    /// ES module or CommonJS specifier (`"./util"`, `"react"`)
    Script(String),
    /// Rust `mod name;` declaration
    RustMod(String),
    /// Rust `use` path starting at `crate`, `self`, or `super`
    RustUse(Vec<String>),
    /// Target computed at runtime; cannot be resolved statically
    Dynamic,
}

/// A language definition with all import extraction configuration
pub struct LanguageDef {
    /// Language name (e.g., "rust", "python")
    pub name: &'static str,
    /// Function to get the tree-sitter grammar
    pub grammar: fn() -> tree_sitter::Language,
    /// File extensions for this language
    pub extensions: &'static [&'static str],
    /// Tree-sitter query selecting import-bearing nodes
    pub import_query: &'static str,
    /// Convert one captured node into imports
    pub extract_import: fn(capture: &str, node: tree_sitter::Node, source: &str) -> Vec<ImportSpec>,
    /// Whether a repository-relative path is a test file for this language
    pub is_test_file: fn(path: &str) -> bool,
}

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Rust (.rs files)
    Rust,
    /// Python (.py, .pyi files)
    Python,
    /// TypeScript (.ts, .mts, .cts files)
    TypeScript,
    /// TypeScript with JSX (.tsx files)
    Tsx,
    /// JavaScript (.js, .jsx, .mjs, .cjs files)
    JavaScript,
}

impl Language {
    /// Get the language definition from the registry, if compiled in
    pub fn def(&self) -> Option<&'static LanguageDef> {
        REGISTRY.get(&self.to_string())
    }

    /// Look up a language by file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        REGISTRY
            .from_extension(ext)
            .and_then(|def| def.name.parse().ok())
    }

    /// Look up a language from a path's extension
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// True for script languages sharing ES module resolution
    pub fn is_script(&self) -> bool {
        matches!(
            self,
            Language::TypeScript | Language::Tsx | Language::JavaScript
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Rust => write!(f, "rust"),
            Language::Python => write!(f, "python"),
            Language::TypeScript => write!(f, "typescript"),
            Language::Tsx => write!(f, "tsx"),
            Language::JavaScript => write!(f, "javascript"),
        }
    }
}

/// Error returned when parsing an invalid Language string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLanguageError {
    /// The invalid input string
    pub input: String,
}

impl std::fmt::Display for ParseLanguageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unknown language: '{}'. Valid options: rust, python, typescript, tsx, javascript",
            self.input
        )
    }
}

impl std::error::Error for ParseLanguageError {}

impl std::str::FromStr for Language {
    type Err = ParseLanguageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rust" => Ok(Language::Rust),
            "python" => Ok(Language::Python),
            "typescript" => Ok(Language::TypeScript),
            "tsx" => Ok(Language::Tsx),
            "javascript" => Ok(Language::JavaScript),
            _ => Err(ParseLanguageError {
                input: s.to_string(),
            }),
        }
    }
}

/// True when any directory component of `path` is a conventional test directory
pub(crate) fn in_test_dir(path: &str) -> bool {
    let mut parts: Vec<&str> = path.split('/').collect();
    parts.pop();
    parts
        .iter()
        .any(|p| matches!(*p, "tests" | "test" | "__tests__" | "spec"))
}

/// Whether `path` is a test file in any registered language
pub fn is_test_path(path: &str) -> bool {
    Language::from_path(path)
        .and_then(|l| l.def())
        .is_some_and(|def| (def.is_test_file)(path))
}

/// Global language registry
pub static REGISTRY: LazyLock<LanguageRegistry> = LazyLock::new(LanguageRegistry::new);

/// Registry of all supported languages
pub struct LanguageRegistry {
    /// Languages indexed by name
    by_name: HashMap<&'static str, &'static LanguageDef>,
    /// Languages indexed by extension
    by_extension: HashMap<&'static str, &'static LanguageDef>,
}

impl LanguageRegistry {
    /// Create a new registry with all enabled languages
    fn new() -> Self {
        let mut reg = Self {
            by_name: HashMap::new(),
            by_extension: HashMap::new(),
        };

        #[cfg(feature = "lang-rust")]
        reg.register(rust::definition());

        #[cfg(feature = "lang-python")]
        reg.register(python::definition());

        #[cfg(feature = "lang-typescript")]
        {
            reg.register(typescript::definition());
            reg.register(typescript::tsx_definition());
        }

        #[cfg(feature = "lang-javascript")]
        reg.register(javascript::definition());

        reg
    }

    fn register(&mut self, def: &'static LanguageDef) {
        self.by_name.insert(def.name, def);
        for ext in def.extensions {
            self.by_extension.insert(*ext, def);
        }
    }

    /// Get a language definition by name
    pub fn get(&self, name: &str) -> Option<&'static LanguageDef> {
        self.by_name.get(name).copied()
    }

    /// Get a language definition by file extension
    pub fn from_extension(&self, ext: &str) -> Option<&'static LanguageDef> {
        self.by_extension.get(ext).copied()
    }

    /// Iterate over all registered languages
    pub fn all(&self) -> impl Iterator<Item = &'static LanguageDef> + '_ {
        self.by_name.values().copied()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_by_extension() {
        #[cfg(feature = "lang-rust")]
        assert_eq!(Language::from_extension("rs"), Some(Language::Rust));
        #[cfg(feature = "lang-python")]
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        #[cfg(feature = "lang-typescript")]
        {
            assert_eq!(Language::from_extension("ts"), Some(Language::TypeScript));
            assert_eq!(Language::from_extension("tsx"), Some(Language::Tsx));
        }
        #[cfg(feature = "lang-javascript")]
        assert_eq!(Language::from_extension("mjs"), Some(Language::JavaScript));
        assert!(Language::from_extension("xyz").is_none());
    }

    #[test]
    fn test_from_path() {
        #[cfg(feature = "lang-python")]
        assert_eq!(Language::from_path("src/pkg/a.py"), Some(Language::Python));
        assert_eq!(Language::from_path("Makefile"), None);
        assert_eq!(Language::from_path("dir.d/README"), None);
    }

    #[test]
    fn test_all_definitions_have_valid_queries() {
        for def in REGISTRY.all() {
            let grammar = (def.grammar)();
            assert!(
                tree_sitter::Query::new(&grammar, def.import_query).is_ok(),
                "import query for {} does not compile",
                def.name
            );
        }
    }

    #[test]
    fn test_language_from_str_round_trip() {
        for lang in [
            Language::Rust,
            Language::Python,
            Language::TypeScript,
            Language::Tsx,
            Language::JavaScript,
        ] {
            assert_eq!(lang.to_string().parse::<Language>().unwrap(), lang);
        }
        let err = "cobol".parse::<Language>().unwrap_err();
        assert!(err.to_string().contains("cobol"));
    }

    #[test]
    fn test_in_test_dir() {
        assert!(in_test_dir("tests/test_a.py"));
        assert!(in_test_dir("pkg/__tests__/a.js"));
        assert!(!in_test_dir("src/tests.rs"));
        assert!(!in_test_dir("src/testing/a.py"));
    }
}
