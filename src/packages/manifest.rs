//! Manifest parsing for package discovery
//!
//! Each reader extracts an optional package name and the raw dependency
//! names a manifest declares. Names are compared after [`normalize_name`].

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::PackageError;

/// Which marker defined a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Python,
    Pip,
    Npm,
    Cargo,
    Go,
    Explicit,
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageKind::Python => write!(f, "python"),
            PackageKind::Pip => write!(f, "pip"),
            PackageKind::Npm => write!(f, "npm"),
            PackageKind::Cargo => write!(f, "cargo"),
            PackageKind::Go => write!(f, "go"),
            PackageKind::Explicit => write!(f, "explicit"),
        }
    }
}

/// Marker files in priority order. The first marker present in a directory
/// decides the package kind; names and dependencies are merged across all.
pub(crate) const MARKERS: &[(&str, PackageKind)] = &[
    ("pyproject.toml", PackageKind::Python),
    ("package.json", PackageKind::Npm),
    ("Cargo.toml", PackageKind::Cargo),
    ("go.mod", PackageKind::Go),
    ("setup.py", PackageKind::Python),
    ("setup.cfg", PackageKind::Python),
    ("requirements.txt", PackageKind::Pip),
    ("__init__.py", PackageKind::Python),
];

/// Name and raw dependencies read from one manifest
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ManifestInfo {
    pub name: Option<String>,
    pub dependencies: BTreeSet<String>,
}

impl ManifestInfo {
    pub fn merge(&mut self, other: ManifestInfo) {
        if self.name.is_none() {
            self.name = other.name;
        }
        self.dependencies.extend(other.dependencies);
    }
}

static REQUIREMENT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)").expect("hardcoded regex")
});

static SETUP_PY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bname\s*=\s*["']([^"']+)["']"#).expect("hardcoded regex")
});

static SETUP_CFG_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*name\s*=\s*(\S+)\s*$").expect("hardcoded regex"));

/// Lowercase, with `_` and `.` folded to `-` (PEP 503 style)
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace(['_', '.'], "-")
}

/// Read a marker file and extract what it declares.
///
/// `__init__.py` carries no metadata and yields an empty record.
pub(crate) fn read_manifest(path: &Path) -> Result<ManifestInfo, PackageError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if file_name == "__init__.py" {
        return Ok(ManifestInfo::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| PackageError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let malformed = |message: String| PackageError::Manifest {
        path: path.display().to_string(),
        message,
    };

    match file_name.as_str() {
        "pyproject.toml" => parse_pyproject(&content).map_err(|e| malformed(e.to_string())),
        "package.json" => parse_package_json(&content).map_err(|e| malformed(e.to_string())),
        "Cargo.toml" => parse_cargo_toml(&content).map_err(|e| malformed(e.to_string())),
        "go.mod" => Ok(parse_go_mod(&content)),
        "setup.py" => Ok(ManifestInfo {
            name: SETUP_PY_NAME
                .captures(&content)
                .map(|c| c[1].to_string()),
            dependencies: BTreeSet::new(),
        }),
        "setup.cfg" => Ok(ManifestInfo {
            name: SETUP_CFG_NAME
                .captures(&content)
                .map(|c| c[1].to_string()),
            dependencies: BTreeSet::new(),
        }),
        _ => Ok(ManifestInfo {
            name: None,
            dependencies: parse_requirements(&content),
        }),
    }
}

/// Package name from a PEP 508 requirement string
fn requirement_name(spec: &str) -> Option<String> {
    REQUIREMENT_NAME
        .captures(spec)
        .map(|c| normalize_name(&c[1]))
}

fn table_keys(value: Option<&toml::Value>) -> impl Iterator<Item = String> + '_ {
    value
        .and_then(|v| v.as_table())
        .into_iter()
        .flat_map(|t| t.keys())
        .map(|k| normalize_name(k))
}

pub(crate) fn parse_pyproject(content: &str) -> Result<ManifestInfo, toml::de::Error> {
    let doc: toml::Table = toml::from_str(content)?;
    let project = doc.get("project");
    let tool = doc.get("tool");
    let poetry = tool.and_then(|t| t.get("poetry"));
    let pixi = tool.and_then(|t| t.get("pixi"));

    let name = project
        .and_then(|p| p.get("name"))
        .or_else(|| poetry.and_then(|p| p.get("name")))
        .or_else(|| {
            pixi.and_then(|p| p.get("project"))
                .and_then(|p| p.get("name"))
        })
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let mut deps = BTreeSet::new();
    if let Some(list) = project
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array())
    {
        deps.extend(list.iter().filter_map(|v| v.as_str()).filter_map(requirement_name));
    }
    if let Some(extras) = project
        .and_then(|p| p.get("optional-dependencies"))
        .and_then(|d| d.as_table())
    {
        for list in extras.values().filter_map(|v| v.as_array()) {
            deps.extend(list.iter().filter_map(|v| v.as_str()).filter_map(requirement_name));
        }
    }
    deps.extend(table_keys(poetry.and_then(|p| p.get("dependencies"))));
    deps.extend(table_keys(pixi.and_then(|p| p.get("dependencies"))));
    deps.extend(table_keys(pixi.and_then(|p| p.get("pypi-dependencies"))));
    deps.remove("python");

    Ok(ManifestInfo {
        name,
        dependencies: deps,
    })
}

pub(crate) fn parse_package_json(content: &str) -> Result<ManifestInfo, serde_json::Error> {
    let doc: serde_json::Value = serde_json::from_str(content)?;
    let name = doc.get("name").and_then(|n| n.as_str()).map(str::to_string);
    let mut deps = BTreeSet::new();
    for section in ["dependencies", "devDependencies", "peerDependencies"] {
        if let Some(obj) = doc.get(section).and_then(|d| d.as_object()) {
            deps.extend(obj.keys().map(|k| normalize_name(k)));
        }
    }
    Ok(ManifestInfo {
        name,
        dependencies: deps,
    })
}

pub(crate) fn parse_cargo_toml(content: &str) -> Result<ManifestInfo, toml::de::Error> {
    let doc: toml::Table = toml::from_str(content)?;
    let name = doc
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .map(str::to_string);
    let mut deps = BTreeSet::new();
    for section in ["dependencies", "dev-dependencies", "build-dependencies"] {
        deps.extend(table_keys(doc.get(section)));
    }
    Ok(ManifestInfo {
        name,
        dependencies: deps,
    })
}

pub(crate) fn parse_go_mod(content: &str) -> ManifestInfo {
    let mut name = None;
    let mut deps = BTreeSet::new();
    let mut in_require = false;
    let last_segment = |module: &str| module.rsplit('/').next().map(normalize_name);

    for line in content.lines() {
        let line = line.split("//").next().unwrap_or("").trim();
        if let Some(module) = line.strip_prefix("module ") {
            name = module.trim().rsplit('/').next().map(str::to_string);
        } else if line.starts_with("require (") {
            in_require = true;
        } else if in_require && line == ")" {
            in_require = false;
        } else if let Some(req) = line.strip_prefix("require ") {
            deps.extend(req.split_whitespace().next().and_then(last_segment));
        } else if in_require && !line.is_empty() {
            deps.extend(line.split_whitespace().next().and_then(last_segment));
        }
    }

    ManifestInfo {
        name,
        dependencies: deps,
    }
}

/// Dependencies from a requirements file.
///
/// Editable installs (`-e ../shared`) contribute the directory name so that
/// local path dependencies link packages together.
pub(crate) fn parse_requirements(content: &str) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some(target) = line
            .strip_prefix("-e ")
            .or_else(|| line.strip_prefix("--editable "))
        {
            let target = target.trim().trim_end_matches('/');
            if let Some(dir) = target.rsplit('/').next() {
                if !dir.is_empty() && dir != "." {
                    deps.insert(normalize_name(dir));
                }
            }
            continue;
        }
        if line.starts_with('-') {
            continue;
        }
        deps.extend(requirement_name(line));
    }
    deps
}
