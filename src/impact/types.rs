//! Data types for impact analysis

use std::collections::BTreeSet;

use serde::Serialize;

/// Everything a change set reaches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AffectedSet {
    /// Changed modules and every module that transitively imports one
    pub modules: BTreeSet<String>,
    /// Affected package ids (monorepo mode only)
    pub packages: BTreeSet<String>,
    /// Test files that must run
    pub tests: BTreeSet<String>,
    /// Some affected non-test module has no test covering or mapped to it
    pub test_mapping_incomplete: bool,
    /// Affected non-test modules with no covering or mapped test
    pub unmapped_modules: BTreeSet<String>,
}

impl AffectedSet {
    /// Tests as a space-separated list (pytest-friendly)
    pub fn tests_joined(&self) -> String {
        self.tests.iter().cloned().collect::<Vec<_>>().join(" ")
    }

    /// Packages as a comma-separated list
    pub fn packages_joined(&self) -> String {
        self.packages.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

/// How affected source modules are mapped to tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMappingMode {
    /// Test file names derived from module names
    Convention,
    /// Explicit `[test_map]` table only
    Manifest,
    /// Union of both
    #[default]
    Both,
}

impl std::fmt::Display for TestMappingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestMappingMode::Convention => write!(f, "convention"),
            TestMappingMode::Manifest => write!(f, "manifest"),
            TestMappingMode::Both => write!(f, "both"),
        }
    }
}

impl std::str::FromStr for TestMappingMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "convention" => Ok(TestMappingMode::Convention),
            "manifest" => Ok(TestMappingMode::Manifest),
            "both" => Ok(TestMappingMode::Both),
            _ => Err(format!(
                "Unknown test mapping mode: '{}'. Valid options: convention, manifest, both",
                s
            )),
        }
    }
}
