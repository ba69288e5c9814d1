//! Monorepo package resolution
//!
//! Packages come either from explicit configuration or from marker files
//! (`pyproject.toml`, `package.json`, `Cargo.toml`, ...) found by walking the
//! repository. Every path maps to the package with the longest matching root,
//! or to the implicit root package `"."` when no root contains it.
//!
//! A change affects its owning package plus every package that transitively
//! declares a dependency on it. Dependency, CI, or build changes owned by the
//! root package affect every package.

mod manifest;

pub use manifest::{normalize_name, PackageKind};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::{Category, FileClassification};
use crate::impact::bfs::reverse_bfs_multi;
use manifest::{read_manifest, ManifestInfo, MARKERS};

/// Package identifier (manifest name, directory name, or root path)
pub type PackageId = String;

/// Id of the implicit package owning files outside every package root
pub const ROOT_PACKAGE_ID: &str = ".";

/// Directories never searched for package markers or source files
pub(crate) const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "venv",
    ".venv",
    "__pycache__",
    "build",
    "dist",
    "target",
];

/// Errors while discovering packages
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed manifest {path}: {message}")]
    Manifest { path: String, message: String },
    #[error("Configured package root '{0}' is not a directory")]
    InvalidRoot(String),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] ignore::Error),
}

/// A package root declared in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplicitPackage {
    /// Repository-relative directory
    pub root: String,
    /// Package id (defaults to the directory name)
    #[serde(default)]
    pub id: Option<String>,
    /// Ids of packages this one depends on
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Options for [`PackageSet::discover`]
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub explicit: Vec<ExplicitPackage>,
    pub max_depth: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            explicit: Vec::new(),
            max_depth: 4,
        }
    }
}

/// One package of the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub id: PackageId,
    /// Repository-relative root, `""` for the implicit root package
    pub root_path: String,
    pub kind: PackageKind,
    /// Ids of other packages in this repository that this one depends on
    pub declared_dependencies: BTreeSet<PackageId>,
}

/// All packages of one repository, indexed for path resolution
#[derive(Debug, Clone)]
pub struct PackageSet {
    packages: Vec<Package>,
    root: Package,
    /// Package ids ordered by descending root length (longest prefix first)
    by_root_len: Vec<usize>,
    /// id -> packages that depend on it
    dependents: HashMap<PackageId, Vec<PackageId>>,
}

/// Raw package record before dependency names are resolved to ids
struct Candidate {
    root_path: String,
    kind: PackageKind,
    info: ManifestInfo,
    explicit_id: Option<String>,
}

impl PackageSet {
    /// Discover packages under `root`.
    ///
    /// Explicit roots win when configured; marker discovery is skipped then.
    pub fn discover(root: &Path, options: &DiscoveryOptions) -> Result<Self, PackageError> {
        let _span = tracing::info_span!("discover_packages", root = %root.display()).entered();

        let (root_info, candidates) = if options.explicit.is_empty() {
            discover_markers(root, options.max_depth)?
        } else {
            let mut candidates = Vec::new();
            for ex in &options.explicit {
                let rel = crate::changes::normalize_path(&ex.root)
                    .trim_end_matches('/')
                    .to_string();
                if rel.is_empty() || !root.join(&rel).is_dir() {
                    return Err(PackageError::InvalidRoot(ex.root.clone()));
                }
                candidates.push(Candidate {
                    root_path: rel,
                    kind: PackageKind::Explicit,
                    info: ManifestInfo {
                        name: None,
                        dependencies: ex.depends_on.iter().map(|d| normalize_name(d)).collect(),
                    },
                    explicit_id: ex.id.clone(),
                });
            }
            (ManifestInfo::default(), candidates)
        };

        let set = Self::from_candidates(root_info, candidates);
        tracing::info!(packages = set.packages.len(), "Resolved packages");
        Ok(set)
    }

    /// Build a set from already-resolved packages.
    pub fn from_packages(packages: Vec<Package>) -> Self {
        Self::index(
            packages,
            Package {
                id: ROOT_PACKAGE_ID.to_string(),
                root_path: String::new(),
                kind: PackageKind::Explicit,
                declared_dependencies: BTreeSet::new(),
            },
        )
    }

    fn from_candidates(root_info: ManifestInfo, mut candidates: Vec<Candidate>) -> Self {
        candidates.sort_by(|a, b| a.root_path.cmp(&b.root_path));

        // Ids: explicit id, else manifest name, else directory name.
        // Colliding ids fall back to the root path.
        let base_ids: Vec<String> = candidates
            .iter()
            .map(|c| {
                c.explicit_id
                    .clone()
                    .or_else(|| c.info.name.clone())
                    .unwrap_or_else(|| {
                        c.root_path
                            .rsplit('/')
                            .next()
                            .unwrap_or(&c.root_path)
                            .to_string()
                    })
            })
            .collect();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for id in &base_ids {
            *counts.entry(id.as_str()).or_default() += 1;
        }
        let ids: Vec<String> = candidates
            .iter()
            .zip(&base_ids)
            .map(|(c, id)| {
                if counts.get(id.as_str()).copied().unwrap_or(0) > 1 || id == ROOT_PACKAGE_ID {
                    c.root_path.clone()
                } else {
                    id.clone()
                }
            })
            .collect();

        // Names a dependency may refer to a package by
        let mut lookup: HashMap<String, String> = HashMap::new();
        for (c, id) in candidates.iter().zip(&ids) {
            lookup.insert(normalize_name(id), id.clone());
            if let Some(dir) = c.root_path.rsplit('/').next() {
                lookup.entry(normalize_name(dir)).or_insert_with(|| id.clone());
            }
        }
        let resolve_deps = |own: &str, deps: &BTreeSet<String>| -> BTreeSet<PackageId> {
            deps.iter()
                .filter_map(|d| lookup.get(d))
                .filter(|id| id.as_str() != own)
                .cloned()
                .collect()
        };

        let mut packages: Vec<Package> = candidates
            .iter()
            .zip(&ids)
            .map(|(c, id)| Package {
                id: id.clone(),
                root_path: c.root_path.clone(),
                kind: c.kind,
                declared_dependencies: resolve_deps(id, &c.info.dependencies),
            })
            .collect();

        // A nested package is part of its enclosing package
        let roots: Vec<(String, String)> = packages
            .iter()
            .map(|p| (p.root_path.clone(), p.id.clone()))
            .collect();
        for pkg in &mut packages {
            let enclosed: Vec<PackageId> = roots
                .iter()
                .filter(|(r, id)| *id != pkg.id && is_within(r, &pkg.root_path))
                .map(|(_, id)| id.clone())
                .collect();
            pkg.declared_dependencies.extend(enclosed);
        }

        let root = Package {
            id: ROOT_PACKAGE_ID.to_string(),
            root_path: String::new(),
            kind: PackageKind::Explicit,
            declared_dependencies: resolve_deps(ROOT_PACKAGE_ID, &root_info.dependencies),
        };
        Self::index(packages, root)
    }

    fn index(mut packages: Vec<Package>, root: Package) -> Self {
        packages.sort_by(|a, b| a.id.cmp(&b.id));
        let mut by_root_len: Vec<usize> = (0..packages.len()).collect();
        by_root_len.sort_by(|&a, &b| {
            packages[b]
                .root_path
                .len()
                .cmp(&packages[a].root_path.len())
                .then_with(|| packages[a].root_path.cmp(&packages[b].root_path))
        });

        let mut dependents: HashMap<PackageId, Vec<PackageId>> = HashMap::new();
        for pkg in packages.iter().chain(std::iter::once(&root)) {
            for dep in &pkg.declared_dependencies {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(pkg.id.clone());
            }
        }

        Self {
            packages,
            root,
            by_root_len,
            dependents,
        }
    }

    /// Discovered packages (the implicit root package is not included)
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Package> {
        if id == ROOT_PACKAGE_ID {
            return Some(&self.root);
        }
        self.packages.iter().find(|p| p.id == id)
    }

    /// Owning package of a repository-relative path (longest root wins)
    pub fn resolve(&self, path: &str) -> &Package {
        self.by_root_len
            .iter()
            .map(|&i| &self.packages[i])
            .find(|p| is_within(path, &p.root_path))
            .unwrap_or(&self.root)
    }

    /// Packages affected by a classified change set.
    ///
    /// Owners of every touched path, expanded over reverse declared
    /// dependencies. Root-owned dependency, CI, or build changes mark every
    /// package affected.
    pub fn affected(&self, classified: &[FileClassification]) -> BTreeSet<PackageId> {
        let _span = tracing::info_span!("affected_packages", files = classified.len()).entered();
        let mut owners: BTreeSet<&str> = BTreeSet::new();
        let mut global = false;

        for c in classified {
            for path in c.touched_paths() {
                let owner = self.resolve(path);
                if owner.id == ROOT_PACKAGE_ID
                    && (c.is(Category::Dependencies) || c.is(Category::CI) || c.is(Category::Build))
                {
                    global = true;
                }
                owners.insert(owner.id.as_str());
            }
        }

        if global {
            tracing::debug!("Root-level dependency, CI, or build change affects every package");
            return self
                .packages
                .iter()
                .map(|p| p.id.clone())
                .chain(std::iter::once(ROOT_PACKAGE_ID.to_string()))
                .collect();
        }

        let seeds: Vec<&str> = owners.into_iter().collect();
        reverse_bfs_multi(&self.dependents, &seeds)
            .into_keys()
            .collect()
    }
}

/// True when `path` equals `root` or lies beneath it (component-wise)
fn is_within(path: &str, root: &str) -> bool {
    if root.is_empty() {
        return true;
    }
    path == root
        || (path.len() > root.len() && path.starts_with(root) && path.as_bytes()[root.len()] == b'/')
}

/// Walk the tree for marker files and group them per directory
fn discover_markers(
    root: &Path,
    max_depth: usize,
) -> Result<(ManifestInfo, Vec<Candidate>), PackageError> {
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .max_depth(Some(max_depth))
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_some_and(|t| t.is_dir()) && SKIP_DIRS.contains(&&*name))
        })
        .build();

    // dir -> marker file names present
    let mut markers: BTreeMap<String, Vec<&'static str>> = BTreeMap::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let Some(&(marker, _)) = MARKERS.iter().find(|(m, _)| *m == name) else {
            continue;
        };
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        markers.entry(rel).or_default().push(marker);
    }

    let manifest_dirs: Vec<String> = markers
        .iter()
        .filter(|(dir, m)| !dir.is_empty() && m.iter().any(|name| *name != "__init__.py"))
        .map(|(dir, _)| dir.clone())
        .collect();

    let mut root_info = ManifestInfo::default();
    let mut candidates = Vec::new();
    for (dir, found) in &markers {
        if found.len() == 1 && found[0] == "__init__.py" {
            // Only the top of a Python package tree that no manifest encloses
            let parent = dir.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
            let parent_is_pkg = markers
                .get(parent)
                .is_some_and(|m| m.contains(&"__init__.py"));
            let enclosed = manifest_dirs.iter().any(|m| is_within(dir, m));
            if dir.is_empty() || parent_is_pkg || enclosed {
                continue;
            }
        }

        let mut info = ManifestInfo::default();
        for name in found {
            info.merge(read_manifest(&root.join(dir).join(name))?);
        }
        if dir.is_empty() {
            root_info = info;
            continue;
        }

        let kind = MARKERS
            .iter()
            .find(|(m, _)| found.contains(m))
            .map(|(_, k)| *k)
            .unwrap_or(PackageKind::Python);
        candidates.push(Candidate {
            root_path: dir.clone(),
            kind,
            info,
            explicit_id: None,
        });
    }

    Ok((root_info, candidates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeKind, ChangedFile};
    use crate::classify::Classifier;

    fn pkg(id: &str, root: &str, deps: &[&str]) -> Package {
        Package {
            id: id.to_string(),
            root_path: root.to_string(),
            kind: PackageKind::Explicit,
            declared_dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn classify(paths: &[&str]) -> Vec<FileClassification> {
        let classifier = Classifier::with_defaults().unwrap();
        let changes: Vec<_> = paths
            .iter()
            .map(|p| ChangedFile::new(*p, ChangeKind::Modified))
            .collect();
        classifier.classify_all(&changes)
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_resolve_longest_prefix_wins() {
        let set = PackageSet::from_packages(vec![
            pkg("outer", "services", &[]),
            pkg("inner", "services/api", &[]),
        ]);
        assert_eq!(set.resolve("services/api/main.py").id, "inner");
        assert_eq!(set.resolve("services/worker.py").id, "outer");
        assert_eq!(set.resolve("services-old/x.py").id, ROOT_PACKAGE_ID);
        assert_eq!(set.resolve("README.md").id, ROOT_PACKAGE_ID);
    }

    #[test]
    fn test_affected_excludes_unrelated_package() {
        let set = PackageSet::from_packages(vec![
            pkg("pkgA", "src/pkgA", &[]),
            pkg("pkgB", "src/pkgB", &[]),
        ]);
        let affected = set.affected(&classify(&["src/pkgA/util.py"]));
        assert_eq!(affected.into_iter().collect::<Vec<_>>(), vec!["pkgA"]);
    }

    #[test]
    fn test_affected_includes_transitive_dependents() {
        let set = PackageSet::from_packages(vec![
            pkg("core", "libs/core", &[]),
            pkg("api", "services/api", &["core"]),
            pkg("web", "services/web", &["api"]),
            pkg("docs-site", "site", &[]),
        ]);
        let affected = set.affected(&classify(&["libs/core/model.py"]));
        let affected: Vec<_> = affected.into_iter().collect();
        assert_eq!(affected, vec!["api", "core", "web"]);
    }

    #[test]
    fn test_affected_cycle_terminates() {
        let set = PackageSet::from_packages(vec![
            pkg("a", "a", &["b"]),
            pkg("b", "b", &["a"]),
        ]);
        let affected = set.affected(&classify(&["a/x.py"]));
        assert_eq!(affected.len(), 2);
    }

    #[test]
    fn test_root_ci_change_affects_everything() {
        let set = PackageSet::from_packages(vec![pkg("a", "a", &[]), pkg("b", "b", &[])]);
        let affected = set.affected(&classify(&[".github/workflows/ci.yml"]));
        let affected: Vec<_> = affected.into_iter().collect();
        assert_eq!(affected, vec![".", "a", "b"]);
    }

    #[test]
    fn test_root_docs_change_only_root_package() {
        let set = PackageSet::from_packages(vec![pkg("a", "a", &[])]);
        let affected = set.affected(&classify(&["README.md"]));
        assert_eq!(affected.into_iter().collect::<Vec<_>>(), vec!["."]);
    }

    #[test]
    fn test_rename_across_packages_affects_both() {
        let set = PackageSet::from_packages(vec![pkg("a", "a", &[]), pkg("b", "b", &[])]);
        let classifier = Classifier::with_defaults().unwrap();
        let classified = classifier.classify_all(&[ChangedFile::renamed("a/x.py", "b/x.py")]);
        let affected: Vec<_> = set.affected(&classified).into_iter().collect();
        assert_eq!(affected, vec!["a", "b"]);
    }

    #[test]
    fn test_discover_markers_and_dependencies() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path();
        write(root, "pyproject.toml", "[project]\nname = \"mono\"\n");
        write(
            root,
            "packages/core/pyproject.toml",
            "[project]\nname = \"acme-core\"\ndependencies = []\n",
        );
        write(
            root,
            "packages/api/pyproject.toml",
            "[project]\nname = \"acme-api\"\ndependencies = [\"acme_core>=0.1\", \"fastapi\"]\n",
        );
        write(
            root,
            "web/package.json",
            r#"{"name": "web", "dependencies": {"left-pad": "1"}}"#,
        );
        write(root, "node_modules/leftpad/package.json", r#"{"name": "left-pad"}"#);
        write(root, "tools/lint/__init__.py", "");
        write(root, "tools/lint/rules/__init__.py", "");

        let set = PackageSet::discover(root, &DiscoveryOptions::default()).unwrap();
        let ids: Vec<_> = set.packages().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["acme-api", "acme-core", "lint", "web"]);

        let api = set.get("acme-api").unwrap();
        assert_eq!(api.kind, PackageKind::Python);
        assert_eq!(
            api.declared_dependencies.iter().collect::<Vec<_>>(),
            vec!["acme-core"]
        );
        assert_eq!(set.get("web").unwrap().kind, PackageKind::Npm);
        assert_eq!(set.resolve("tools/lint/rules/a.py").id, "lint");

        let affected = set.affected(&classify(&["packages/core/acme/models.py"]));
        assert_eq!(
            affected.into_iter().collect::<Vec<_>>(),
            vec!["acme-api", "acme-core"]
        );
    }

    #[test]
    fn test_discover_name_collision_uses_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        write(dir.path(), "a/app/package.json", r#"{"name": "app"}"#);
        write(dir.path(), "b/app/package.json", r#"{"name": "app"}"#);
        let set = PackageSet::discover(dir.path(), &DiscoveryOptions::default()).unwrap();
        let ids: Vec<_> = set.packages().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a/app", "b/app"]);
    }

    #[test]
    fn test_nested_package_is_dependency_of_enclosing() {
        let dir = tempfile::TempDir::new().unwrap();
        write(dir.path(), "svc/pyproject.toml", "[project]\nname = \"svc\"\n");
        write(dir.path(), "svc/plugins/auth/package.json", r#"{"name": "auth"}"#);
        let set = PackageSet::discover(dir.path(), &DiscoveryOptions::default()).unwrap();
        let affected = set.affected(&classify(&["svc/plugins/auth/index.js"]));
        assert_eq!(
            affected.into_iter().collect::<Vec<_>>(),
            vec!["auth", "svc"]
        );
    }

    #[test]
    fn test_discover_explicit_roots() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/pkgA")).unwrap();
        std::fs::create_dir_all(dir.path().join("src/pkgB")).unwrap();
        let options = DiscoveryOptions {
            explicit: vec![
                ExplicitPackage {
                    root: "src/pkgA".into(),
                    ..Default::default()
                },
                ExplicitPackage {
                    root: "src/pkgB/".into(),
                    id: Some("pkgB".into()),
                    depends_on: vec!["pkgA".into()],
                },
            ],
            ..Default::default()
        };
        let set = PackageSet::discover(dir.path(), &options).unwrap();
        assert_eq!(set.packages().len(), 2);
        assert!(set.get("pkgB").unwrap().declared_dependencies.contains("pkgA"));
        let affected = set.affected(&classify(&["src/pkgA/util.py"]));
        assert_eq!(
            affected.into_iter().collect::<Vec<_>>(),
            vec!["pkgA", "pkgB"]
        );
    }

    #[test]
    fn test_discover_explicit_missing_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = DiscoveryOptions {
            explicit: vec![ExplicitPackage {
                root: "nope".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            PackageSet::discover(dir.path(), &options),
            Err(PackageError::InvalidRoot(_))
        ));
    }

    #[test]
    fn test_discover_malformed_manifest_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        write(dir.path(), "svc/Cargo.toml", "[package\n");
        assert!(matches!(
            PackageSet::discover(dir.path(), &DiscoveryOptions::default()),
            Err(PackageError::Manifest { .. })
        ));
    }
}
