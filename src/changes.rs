//! Change set collection
//!
//! Turns a pair of revisions into an ordered list of [`ChangedFile`] records by
//! running `git diff --name-status` with rename detection. Orchestrators that
//! already know the changed paths can feed them in directly with
//! [`changes_from_paths`].

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Errors raised while collecting the change set.
///
/// All of these are fatal: without a trustworthy change set there is nothing
/// to reason about, so the analysis falls back to running everything.
#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("Not a git repository: {0}")]
    NotARepository(String),
    #[error("Revision '{0}' does not resolve to a commit")]
    InvalidRef(String),
    #[error("git {command} failed: {stderr}")]
    GitFailed { command: String, stderr: String },
    #[error("Malformed git output: {0}")]
    MalformedOutput(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a file changed between the two revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed => write!(f, "renamed"),
        }
    }
}

/// A single entry of the change set.
///
/// Paths are repository-relative with `/` separators. Renames keep the old
/// path in `previous_path`; everything downstream classifies by `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedFile {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: normalize_path(&path.into()),
            kind,
            previous_path: None,
        }
    }

    pub fn renamed(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            path: normalize_path(&to.into()),
            kind: ChangeKind::Renamed,
            previous_path: Some(normalize_path(&from.into())),
        }
    }

    /// Every path this change touches (new path first, then the old one for renames)
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.path.as_str()).chain(self.previous_path.as_deref())
    }
}

/// Normalize a path to forward slashes with no leading `./`.
///
/// Whitespace is kept: it is a legal part of a file name.
pub fn normalize_path(path: &str) -> String {
    let mut p = path.replace('\\', "/");
    while let Some(rest) = p.strip_prefix("./") {
        p = rest.to_string();
    }
    p
}

/// Collect changes between `base` and `head` using merge-base (three-dot) semantics.
pub fn collect_changes(
    root: &Path,
    base: &str,
    head: &str,
) -> Result<Vec<ChangedFile>, CollectionError> {
    let _span = tracing::info_span!("collect_changes", base, head).entered();

    for rev in [base, head] {
        if rev.is_empty() || rev.starts_with('-') {
            return Err(CollectionError::InvalidRef(rev.to_string()));
        }
    }

    let inside = run_git(root, &["rev-parse", "--is-inside-work-tree"])?;
    if inside.trim() != "true" {
        return Err(CollectionError::NotARepository(root.display().to_string()));
    }

    for rev in [base, head] {
        verify_ref(root, rev)?;
    }

    let range = format!("{}...{}", base, head);
    let output = run_git(
        root,
        &["diff", "--name-status", "-M", "-z", "--no-color", &range],
    )?;
    let changes = parse_name_status(&output)?;
    tracing::info!(count = changes.len(), "Collected change set");
    Ok(changes)
}

fn verify_ref(root: &Path, rev: &str) -> Result<(), CollectionError> {
    let spec = format!("{}^{{commit}}", rev);
    let output = std::process::Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", &spec])
        .current_dir(root)
        .output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(CollectionError::InvalidRef(rev.to_string()))
    }
}

fn run_git(root: &Path, args: &[&str]) -> Result<String, CollectionError> {
    let output = std::process::Command::new("git")
        .arg("--no-pager")
        .args(args)
        .current_dir(root)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("not a git repository") {
            return Err(CollectionError::NotARepository(root.display().to_string()));
        }
        if stderr.contains("unknown revision") || stderr.contains("bad revision") {
            return Err(CollectionError::InvalidRef(stderr));
        }
        return Err(CollectionError::GitFailed {
            command: args.first().copied().unwrap_or_default().to_string(),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse `git diff --name-status -z` output.
///
/// Records are NUL separated: `STATUS\0path\0` or, for renames and copies,
/// `R100\0old\0new\0`. Duplicate paths keep their first occurrence. A
/// truncated record fails the whole parse rather than dropping the rest.
pub fn parse_name_status(output: &str) -> Result<Vec<ChangedFile>, CollectionError> {
    let mut fields = output.split('\0').filter(|f| !f.is_empty());
    let mut changes = Vec::new();
    let mut seen = HashSet::new();

    while let Some(status) = fields.next() {
        let code = status.chars().next().unwrap_or('M');
        let change = match code {
            'R' | 'C' => {
                let (Some(from), Some(to)) = (fields.next(), fields.next()) else {
                    return Err(CollectionError::MalformedOutput(format!(
                        "truncated {} record",
                        status
                    )));
                };
                if code == 'R' {
                    ChangedFile::renamed(from, to)
                } else {
                    ChangedFile::new(to, ChangeKind::Added)
                }
            }
            _ => {
                let Some(path) = fields.next() else {
                    return Err(CollectionError::MalformedOutput(format!(
                        "truncated {} record",
                        status
                    )));
                };
                let kind = match code {
                    'A' => ChangeKind::Added,
                    'D' => ChangeKind::Deleted,
                    'M' | 'T' => ChangeKind::Modified,
                    other => {
                        tracing::debug!(status = %other, path, "Unusual git status, treating as modified");
                        ChangeKind::Modified
                    }
                };
                ChangedFile::new(path, kind)
            }
        };

        if change.path.is_empty() {
            continue;
        }
        if seen.insert(change.path.clone()) {
            changes.push(change);
        }
    }

    Ok(changes)
}

/// Build a change set from an explicit newline-separated path list.
///
/// Every path is reported as modified; blank lines and duplicates are dropped.
/// Lines are trimmed, so paths with edge whitespace need the git collector.
pub fn changes_from_paths<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<ChangedFile> {
    let mut seen = HashSet::new();
    lines
        .into_iter()
        .map(|line| normalize_path(line.trim()))
        .filter(|p| !p.is_empty())
        .filter(|p| seen.insert(p.clone()))
        .map(|p| ChangedFile::new(p, ChangeKind::Modified))
        .collect()
}
