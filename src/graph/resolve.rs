//! Import resolution against the set of known module paths
//!
//! Resolution never touches the filesystem: a target exists only if it was
//! enumerated as a module. Imports of third-party code resolve to nothing and
//! are dropped. Imports that clearly point inside the repository but match no
//! module become [`Edge::Unknown`].

use std::collections::HashSet;

use crate::language::{ImportSpec, Language};

use super::Edge;

/// Extensions tried for extensionless script specifiers, in order
const SCRIPT_EXTS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"];

/// Specifier prefixes used by bundler path aliases
const ALIAS_PREFIXES: &[&str] = &["@/", "~/", "#"];

pub(super) struct Resolver<'a> {
    known: &'a HashSet<String>,
    /// Directories absolute Python imports are resolved from
    python_bases: Vec<String>,
}

/// Parent directory of a repository-relative path (`""` at the root)
fn parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(d, _)| d).unwrap_or("")
}

fn join(dir: &str, rest: &str) -> String {
    match (dir.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => dir.to_string(),
        _ => format!("{}/{}", dir, rest),
    }
}

/// Join `rel` onto `dir`, folding `.` and `..`. `None` if it escapes the root.
pub(super) fn normalize_join(dir: &str, rel: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for seg in rel.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

impl<'a> Resolver<'a> {
    pub(super) fn new(known: &'a HashSet<String>, source_roots: &[String]) -> Self {
        let mut python_bases = vec![String::new()];
        let has_src = known.iter().any(|k| k.starts_with("src/"));
        let extra = source_roots
            .iter()
            .map(|r| crate::changes::normalize_path(r).trim_end_matches('/').to_string())
            .map(|r| if r == "." { String::new() } else { r })
            .chain(has_src.then(|| "src".to_string()));
        for base in extra {
            if !python_bases.contains(&base) {
                python_bases.push(base);
            }
        }
        Self {
            known,
            python_bases,
        }
    }

    fn hit(&self, candidate: &str) -> Option<String> {
        self.known.contains(candidate).then(|| candidate.to_string())
    }

    /// Edges for one import of `file`. Empty when the import is external.
    pub(super) fn resolve(&self, file: &str, language: Language, spec: &ImportSpec) -> Vec<Edge> {
        let edges = match spec {
            ImportSpec::Dynamic => vec![Edge::Unknown],
            ImportSpec::Python {
                level,
                module,
                names,
            } => self.resolve_python(file, *level, module, names),
            ImportSpec::Script(specifier) if language.is_script() => {
                self.resolve_script(file, specifier)
            }
            ImportSpec::Script(_) => Vec::new(),
            ImportSpec::RustMod(name) => self.resolve_rust_mod(file, name),
            ImportSpec::RustUse(path) => self.resolve_rust_use(file, path),
        };
        edges
            .into_iter()
            .filter(|e| !matches!(e, Edge::Static(id) if id == file))
            .collect()
    }

    /// `base/dotted/path.py`, `.pyi`, or `base/dotted/path/__init__.py`
    fn python_module(&self, base: &str, dotted: &str) -> Option<String> {
        let path = join(base, &dotted.replace('.', "/"));
        if path.is_empty() {
            return self.hit("__init__.py");
        }
        self.hit(&format!("{}.py", path))
            .or_else(|| self.hit(&format!("{}.pyi", path)))
            .or_else(|| self.hit(&format!("{}/__init__.py", path)))
    }

    fn resolve_python(&self, file: &str, level: usize, module: &str, names: &[String]) -> Vec<Edge> {
        if level > 0 {
            let mut base = parent(file);
            for _ in 1..level {
                if base.is_empty() {
                    return vec![Edge::Unknown];
                }
                base = parent(base);
            }
            let mut edges: Vec<Edge> = names
                .iter()
                .filter_map(|n| self.python_module(base, &join(module, n).replace('/', ".")))
                .map(Edge::Static)
                .collect();
            match self.python_module(base, module) {
                Some(hit) => edges.push(Edge::Static(hit)),
                None if edges.is_empty() => edges.push(Edge::Unknown),
                None => {}
            }
            return edges;
        }

        let dir = parent(file).to_string();
        let bases = self.python_bases.iter().chain(std::iter::once(&dir));
        let find = |dotted: &str| -> Option<(String, String)> {
            bases
                .clone()
                .find_map(|b| self.python_module(b, dotted).map(|hit| (b.clone(), hit)))
        };

        let mut edges = Vec::new();
        for name in names {
            if let Some((_, hit)) = find(&format!("{}.{}", module, name)) {
                edges.push(Edge::Static(hit));
            }
        }
        // Longest importable prefix of the module path, plus parent packages
        let segs: Vec<&str> = module.split('.').filter(|s| !s.is_empty()).collect();
        for n in (1..=segs.len()).rev() {
            let dotted = segs[..n].join(".");
            if let Some((base, hit)) = find(&dotted) {
                edges.push(Edge::Static(hit));
                for k in 1..n {
                    let pkg = join(&join(&base, &segs[..k].join("/")), "__init__.py");
                    if let Some(init) = self.hit(&pkg) {
                        edges.push(Edge::Static(init));
                    }
                }
                break;
            }
        }
        edges
    }

    fn resolve_script(&self, file: &str, specifier: &str) -> Vec<Edge> {
        let is_relative = specifier == "."
            || specifier == ".."
            || specifier.starts_with("./")
            || specifier.starts_with("../");
        if !is_relative {
            if specifier.starts_with('/') || ALIAS_PREFIXES.iter().any(|p| specifier.starts_with(p)) {
                return vec![Edge::Unknown];
            }
            return Vec::new();
        }

        let Some(target) = normalize_join(parent(file), specifier) else {
            return vec![Edge::Unknown];
        };
        if let Some(hit) = self.hit(&target) {
            return vec![Edge::Static(hit)];
        }

        let name = target.rsplit('/').next().unwrap_or(&target);
        if let Some((stem, ext)) = name.rsplit_once('.') {
            if !stem.is_empty() && !SCRIPT_EXTS.contains(&ext) {
                // Stylesheets, JSON, images: not modules
                return Vec::new();
            }
            // `./util.js` written for a file compiled from `./util.ts`
            if SCRIPT_EXTS.contains(&ext) {
                let base = &target[..target.len() - ext.len() - 1];
                for alt in ["ts", "tsx", "mts", "cts"] {
                    if let Some(hit) = self.hit(&format!("{}.{}", base, alt)) {
                        return vec![Edge::Static(hit)];
                    }
                }
            }
        }

        let candidates = SCRIPT_EXTS
            .iter()
            .map(|ext| format!("{}.{}", target, ext))
            .chain(SCRIPT_EXTS.iter().map(|ext| join(&target, &format!("index.{}", ext))));
        for candidate in candidates {
            if let Some(hit) = self.hit(&candidate) {
                return vec![Edge::Static(hit)];
            }
        }
        vec![Edge::Unknown]
    }

    /// Directory holding the crate root (`lib.rs` or `main.rs`) for `file`
    fn rust_crate_dir<'f>(&self, file: &'f str) -> &'f str {
        let mut dir = parent(file);
        loop {
            if self.known.contains(&join(dir, "lib.rs")) || self.known.contains(&join(dir, "main.rs")) {
                return dir;
            }
            if dir.is_empty() {
                return parent(file);
            }
            dir = parent(dir);
        }
    }

    /// Module path of `file` relative to its crate directory
    fn rust_module_path(&self, crate_dir: &str, file: &str) -> Vec<String> {
        let rel = file
            .strip_prefix(crate_dir)
            .map(|r| r.trim_start_matches('/'))
            .unwrap_or(file);
        let rel = rel.strip_suffix(".rs").unwrap_or(rel);
        let mut segs: Vec<String> = rel.split('/').map(str::to_string).collect();
        if matches!(segs.last().map(String::as_str), Some("mod")) {
            segs.pop();
        }
        if segs.len() == 1 && (segs[0] == "lib" || segs[0] == "main") {
            segs.clear();
        }
        segs
    }

    fn rust_file_for(&self, crate_dir: &str, path: &[String]) -> Option<String> {
        if path.is_empty() {
            return self
                .hit(&join(crate_dir, "lib.rs"))
                .or_else(|| self.hit(&join(crate_dir, "main.rs")));
        }
        let base = join(crate_dir, &path.join("/"));
        self.hit(&format!("{}.rs", base))
            .or_else(|| self.hit(&format!("{}/mod.rs", base)))
    }

    fn resolve_rust_mod(&self, file: &str, name: &str) -> Vec<Edge> {
        let file_name = file.rsplit('/').next().unwrap_or(file);
        let dir = match file_name {
            "mod.rs" | "lib.rs" | "main.rs" => parent(file).to_string(),
            _ => file.strip_suffix(".rs").unwrap_or(file).to_string(),
        };
        let base = join(&dir, name);
        match self
            .hit(&format!("{}.rs", base))
            .or_else(|| self.hit(&format!("{}/mod.rs", base)))
        {
            Some(hit) => vec![Edge::Static(hit)],
            None => vec![Edge::Unknown],
        }
    }

    fn resolve_rust_use(&self, file: &str, path: &[String]) -> Vec<Edge> {
        let crate_dir = self.rust_crate_dir(file);
        let current = self.rust_module_path(crate_dir, file);
        let mut segs = path.iter().map(String::as_str).peekable();

        let mut base: Vec<String> = match segs.next() {
            Some("crate") => Vec::new(),
            Some("self") => current.clone(),
            Some("super") => {
                let mut b = current.clone();
                b.pop();
                b
            }
            _ => return Vec::new(),
        };
        while segs.peek() == Some(&"super") {
            segs.next();
            base.pop();
        }
        let rest: Vec<String> = segs.map(str::to_string).collect();

        for n in (0..=rest.len()).rev() {
            let mut candidate = base.clone();
            candidate.extend_from_slice(&rest[..n]);
            if let Some(hit) = self.rust_file_for(crate_dir, &candidate) {
                return vec![Edge::Static(hit)];
            }
        }
        vec![Edge::Unknown]
    }
}
