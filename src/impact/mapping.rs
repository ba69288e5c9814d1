//! Mapping source modules to the tests that exercise them

use std::collections::{BTreeMap, BTreeSet};

use globset::{GlobBuilder, GlobMatcher};

use super::types::TestMappingMode;

/// Maps a source module to test files.
///
/// `tests` is the universe of known test files; implementations may also
/// return paths outside it (explicit manifests name tests directly).
pub trait TestMapper: Send + Sync {
    fn map(&self, module: &str, tests: &BTreeSet<String>) -> BTreeSet<String>;
}

/// Last path component
fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// File name without its final extension
fn without_ext(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Name a source module is known by. Package entry files (`__init__.py`,
/// `index.ts`, `mod.rs`, `lib.rs`) take their directory's name.
fn module_stem(path: &str) -> &str {
    let stem = without_ext(file_name(path));
    match stem {
        "__init__" | "index" | "mod" | "lib" => {
            let dir = path.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
            if dir.is_empty() {
                stem
            } else {
                file_name(dir)
            }
        }
        _ => stem,
    }
}

/// Name of the module a test file targets, by naming convention
fn test_target_stem(path: &str) -> &str {
    let stem = without_ext(file_name(path));
    if let Some(rest) = stem.strip_prefix("test_") {
        return rest;
    }
    for suffix in ["_tests", "_test", ".test", ".spec"] {
        if let Some(rest) = stem.strip_suffix(suffix) {
            return rest;
        }
    }
    stem
}

/// `tests/test_models.py` covers `models.py`, `button.test.tsx` covers
/// `button.tsx`
#[derive(Debug, Clone, Default)]
pub struct NamingConventionMapper {
    /// When non-empty, only tests under these directories are candidates
    test_roots: Vec<String>,
}

impl NamingConventionMapper {
    pub fn new(test_roots: &[String]) -> Self {
        Self {
            test_roots: test_roots
                .iter()
                .map(|r| r.trim_end_matches('/').to_string())
                .filter(|r| !r.is_empty() && r != ".")
                .collect(),
        }
    }

    fn in_roots(&self, test: &str) -> bool {
        self.test_roots.is_empty()
            || self
                .test_roots
                .iter()
                .any(|r| test.strip_prefix(r.as_str()).is_some_and(|rest| rest.starts_with('/')))
    }
}

impl TestMapper for NamingConventionMapper {
    fn map(&self, module: &str, tests: &BTreeSet<String>) -> BTreeSet<String> {
        let stem = module_stem(module);
        tests
            .iter()
            .filter(|t| t.as_str() != module && self.in_roots(t) && test_target_stem(t) == stem)
            .cloned()
            .collect()
    }
}

/// Explicit `glob -> [test files]` table
#[derive(Debug, Clone, Default)]
pub struct ManifestMapper {
    entries: Vec<(GlobMatcher, Vec<String>)>,
}

impl ManifestMapper {
    /// Compile the table. Globs follow classification rule semantics
    /// (`*` crosses `/`).
    pub fn new(table: &BTreeMap<String, Vec<String>>) -> Result<Self, globset::Error> {
        let entries = table
            .iter()
            .map(|(pattern, tests)| {
                let matcher = GlobBuilder::new(pattern)
                    .literal_separator(false)
                    .build()?
                    .compile_matcher();
                Ok((matcher, tests.clone()))
            })
            .collect::<Result<Vec<_>, globset::Error>>()?;
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TestMapper for ManifestMapper {
    fn map(&self, module: &str, _tests: &BTreeSet<String>) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(m, _)| m.is_match(module))
            .flat_map(|(_, tests)| tests.iter().cloned())
            .collect()
    }
}

/// Union of several mappers
pub struct CompositeMapper {
    mappers: Vec<Box<dyn TestMapper>>,
}

impl CompositeMapper {
    pub fn new(mappers: Vec<Box<dyn TestMapper>>) -> Self {
        Self { mappers }
    }
}

impl TestMapper for CompositeMapper {
    fn map(&self, module: &str, tests: &BTreeSet<String>) -> BTreeSet<String> {
        self.mappers
            .iter()
            .flat_map(|m| m.map(module, tests))
            .collect()
    }
}

/// Mapper for a configured mode
pub fn mapper_for(
    mode: TestMappingMode,
    test_roots: &[String],
    table: &BTreeMap<String, Vec<String>>,
) -> Result<Box<dyn TestMapper>, globset::Error> {
    Ok(match mode {
        TestMappingMode::Convention => Box::new(NamingConventionMapper::new(test_roots)),
        TestMappingMode::Manifest => Box::new(ManifestMapper::new(table)?),
        TestMappingMode::Both => Box::new(CompositeMapper::new(vec![
            Box::new(NamingConventionMapper::new(test_roots)),
            Box::new(ManifestMapper::new(table)?),
        ])),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stems() {
        assert_eq!(module_stem("src/pkg/models.py"), "models");
        assert_eq!(module_stem("src/pkg/__init__.py"), "pkg");
        assert_eq!(module_stem("web/button/index.tsx"), "button");
        assert_eq!(test_target_stem("tests/test_models.py"), "models");
        assert_eq!(test_target_stem("pkg/models_test.py"), "models");
        assert_eq!(test_target_stem("web/button.test.tsx"), "button");
        assert_eq!(test_target_stem("web/button.spec.js"), "button");
        assert_eq!(test_target_stem("tests/helpers.py"), "helpers");
    }

    #[test]
    fn test_convention_mapper() {
        let tests = set(&[
            "tests/test_models.py",
            "tests/test_views.py",
            "web/button.test.tsx",
        ]);
        let mapper = NamingConventionMapper::default();
        assert_eq!(
            mapper.map("src/app/models.py", &tests),
            set(&["tests/test_models.py"])
        );
        assert_eq!(
            mapper.map("web/button.tsx", &tests),
            set(&["web/button.test.tsx"])
        );
        assert!(mapper.map("src/app/db.py", &tests).is_empty());
    }

    #[test]
    fn test_convention_mapper_respects_test_roots() {
        let tests = set(&["tests/test_models.py", "legacy/test_models.py"]);
        let mapper = NamingConventionMapper::new(&["tests/".to_string()]);
        assert_eq!(
            mapper.map("src/models.py", &tests),
            set(&["tests/test_models.py"])
        );
    }

    #[test]
    fn test_manifest_mapper() {
        let mut table = BTreeMap::new();
        table.insert(
            "src/billing/**".to_string(),
            vec!["tests/integration/test_billing.py".to_string()],
        );
        let mapper = ManifestMapper::new(&table).unwrap();
        assert_eq!(
            mapper.map("src/billing/invoice.py", &BTreeSet::new()),
            set(&["tests/integration/test_billing.py"])
        );
        assert!(mapper.map("src/other.py", &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_manifest_mapper_rejects_bad_glob() {
        let mut table = BTreeMap::new();
        table.insert("src/[".to_string(), vec![]);
        assert!(ManifestMapper::new(&table).is_err());
    }

    #[test]
    fn test_both_mode_unions() {
        let mut table = BTreeMap::new();
        table.insert("*models.py".to_string(), vec!["tests/e2e/test_flow.py".to_string()]);
        let mapper = mapper_for(TestMappingMode::Both, &[], &table).unwrap();
        let tests = set(&["tests/test_models.py"]);
        assert_eq!(
            mapper.map("src/models.py", &tests),
            set(&["tests/e2e/test_flow.py", "tests/test_models.py"])
        );
        let convention_only = mapper_for(TestMappingMode::Convention, &[], &table).unwrap();
        assert_eq!(
            convention_only.map("src/models.py", &tests),
            set(&["tests/test_models.py"])
        );
    }
}
