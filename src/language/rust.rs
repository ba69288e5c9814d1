//! Rust language definition

use super::{in_test_dir, ImportSpec, LanguageDef};

/// Tree-sitter query for import-bearing nodes
const IMPORT_QUERY: &str = r#"
(mod_item) @mod
(use_declaration) @use
"#;

/// Path roots that refer to the current crate
const LOCAL_ROOTS: &[&str] = &["crate", "self", "super"];

static DEFINITION: LanguageDef = LanguageDef {
    name: "rust",
    grammar: || tree_sitter_rust::LANGUAGE.into(),
    extensions: &["rs"],
    import_query: IMPORT_QUERY,
    extract_import,
    is_test_file,
};

pub fn definition() -> &'static LanguageDef {
    &DEFINITION
}

fn extract_import(capture: &str, node: tree_sitter::Node, source: &str) -> Vec<ImportSpec> {
    match capture {
        "mod" => {
            // Inline modules live in the same file
            if node.child_by_field_name("body").is_some() {
                return Vec::new();
            }
            node.child_by_field_name("name")
                .map(|n| ImportSpec::RustMod(source[n.byte_range()].to_string()))
                .into_iter()
                .collect()
        }
        "use" => {
            let Some(argument) = node.child_by_field_name("argument") else {
                return Vec::new();
            };
            expand_use_tree(&source[argument.byte_range()])
                .into_iter()
                .filter(|path| path.first().is_some_and(|s| LOCAL_ROOTS.contains(&s.as_str())))
                .map(ImportSpec::RustUse)
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Flatten a use tree such as `crate::a::{b, c::{d as e, self}}` into paths.
///
/// Aliases and glob segments are dropped; `self` inside braces names the
/// enclosing path.
pub(crate) fn expand_use_tree(tree: &str) -> Vec<Vec<String>> {
    let compact = tree.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = Vec::new();
    expand_into(&compact, &mut Vec::new(), &mut out);
    out
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split("::").map(str::trim).filter(|s| !s.is_empty())
}

fn expand_into(tree: &str, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
    let tree = tree.trim();
    if let Some(open) = tree.find('{') {
        let close = tree.rfind('}').filter(|&c| c > open).unwrap_or(tree.len());
        let base_len = prefix.len();
        prefix.extend(segments(&tree[..open]).map(str::to_string));
        for part in split_top_level(&tree[open + 1..close]) {
            expand_into(part, prefix, out);
        }
        prefix.truncate(base_len);
        return;
    }

    let path = tree.split(" as ").next().unwrap_or(tree);
    let mut full = prefix.clone();
    for seg in segments(path) {
        if seg == "*" || (seg == "self" && !full.is_empty()) {
            continue;
        }
        full.push(seg.to_string());
    }
    if !full.is_empty() {
        out.push(full);
    }
}

/// Split on commas that are not nested inside braces
fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

/// Integration tests, `*_test.rs`, and `tests.rs` submodules
fn is_test_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name == "tests.rs" || name.ends_with("_test.rs") || name.ends_with("_tests.rs") || in_test_dir(path)
}
