//! Python language definition

use super::{in_test_dir, ImportSpec, LanguageDef};

/// Tree-sitter query for import-bearing nodes
const IMPORT_QUERY: &str = r#"
(import_statement) @import
(import_from_statement) @import_from
(call) @call
"#;

/// Callables that import a module named by their first argument
const DYNAMIC_LOADERS: &[&str] = &["__import__", "importlib.import_module", "import_module"];

static DEFINITION: LanguageDef = LanguageDef {
    name: "python",
    grammar: || tree_sitter_python::LANGUAGE.into(),
    extensions: &["py", "pyi"],
    import_query: IMPORT_QUERY,
    extract_import,
    is_test_file,
};

pub fn definition() -> &'static LanguageDef {
    &DEFINITION
}

fn text<'a>(node: tree_sitter::Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// Module path named by a `dotted_name` or `aliased_import` node
fn imported_name(node: tree_sitter::Node, source: &str) -> Option<String> {
    match node.kind() {
        "dotted_name" => Some(text(node, source).to_string()),
        "aliased_import" => node
            .child_by_field_name("name")
            .map(|n| text(n, source).to_string()),
        _ => None,
    }
}

/// Split a possibly-relative module path into (level, module)
fn split_relative(path: &str) -> (usize, String) {
    let trimmed = path.trim_start_matches('.');
    (path.len() - trimmed.len(), trimmed.to_string())
}

/// Contents of a plain string literal; `None` for f-strings and non-strings
fn string_literal(node: tree_sitter::Node, source: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let raw = text(node, source);
    let quote = raw.find(['"', '\''])?;
    if raw[..quote].contains(['f', 'F']) {
        return None;
    }
    let mut cursor = node.walk();
    if node
        .named_children(&mut cursor)
        .any(|c| c.kind() == "interpolation")
    {
        return None;
    }
    Some(raw[quote..].trim_matches(['"', '\'']).to_string())
}

fn extract_import(capture: &str, node: tree_sitter::Node, source: &str) -> Vec<ImportSpec> {
    match capture {
        "import" => {
            let mut cursor = node.walk();
            let names: Vec<String> = node
                .children_by_field_name("name", &mut cursor)
                .filter_map(|n| imported_name(n, source))
                .collect();
            names
                .into_iter()
                .map(|module| ImportSpec::Python {
                    level: 0,
                    module,
                    names: Vec::new(),
                })
                .collect()
        }
        "import_from" => {
            let Some(module_node) = node.child_by_field_name("module_name") else {
                return Vec::new();
            };
            let (level, module) = split_relative(text(module_node, source));
            let mut cursor = node.walk();
            let names: Vec<String> = node
                .children_by_field_name("name", &mut cursor)
                .filter_map(|n| imported_name(n, source))
                .collect();
            vec![ImportSpec::Python {
                level,
                module,
                names,
            }]
        }
        "call" => {
            let Some(function) = node.child_by_field_name("function") else {
                return Vec::new();
            };
            if !DYNAMIC_LOADERS.contains(&text(function, source)) {
                return Vec::new();
            }
            let first_arg = node
                .child_by_field_name("arguments")
                .and_then(|args| args.named_child(0));
            match first_arg.and_then(|arg| string_literal(arg, source)) {
                Some(target) => {
                    let (level, module) = split_relative(&target);
                    vec![ImportSpec::Python {
                        level,
                        module,
                        names: Vec::new(),
                    }]
                }
                None => vec![ImportSpec::Dynamic],
            }
        }
        _ => Vec::new(),
    }
}

/// `test_*.py`, `*_test.py`, `*_tests.py`, `conftest.py`, or anything under a test directory
fn is_test_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.starts_with("test_")
        || name.ends_with("_test.py")
        || name.ends_with("_tests.py")
        || name == "conftest.py"
        || in_test_dir(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::test_support::extract;
    use crate::language::Language;

    fn py(level: usize, module: &str, names: &[&str]) -> ImportSpec {
        ImportSpec::Python {
            level,
            module: module.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[test]
    fn test_extract_plain_imports() {
        let specs = extract(Language::Python, "import os\nimport pkg.sub as s, other\n");
        assert_eq!(
            specs,
            vec![py(0, "os", &[]), py(0, "pkg.sub", &[]), py(0, "other", &[])]
        );
    }

    #[test]
    fn test_extract_from_imports() {
        let source = "from pkg.models import User, Group as G\nfrom . import helpers\nfrom ..core.db import *\n";
        let specs = extract(Language::Python, source);
        assert_eq!(
            specs,
            vec![
                py(0, "pkg.models", &["User", "Group"]),
                py(1, "", &["helpers"]),
                py(2, "core.db", &[]),
            ]
        );
    }

    #[test]
    fn test_extract_dynamic_imports() {
        let source = r#"
import importlib
mod = importlib.import_module("plugins.audio")
rel = importlib.import_module(".local", __package__)
x = __import__(name)
y = importlib.import_module(f"plugins.{kind}")
print("not an import")
"#;
        let specs = extract(Language::Python, source);
        assert_eq!(
            specs,
            vec![
                py(0, "importlib", &[]),
                py(0, "plugins.audio", &[]),
                py(1, "local", &[]),
                ImportSpec::Dynamic,
                ImportSpec::Dynamic,
            ]
        );
    }

    #[test]
    fn test_is_test_file() {
        assert!(is_test_file("tests/unit/helpers.py"));
        assert!(is_test_file("src/pkg/test_models.py"));
        assert!(is_test_file("src/pkg/models_test.py"));
        assert!(is_test_file("conftest.py"));
        assert!(!is_test_file("src/pkg/models.py"));
        assert!(!is_test_file("src/pkg/contest.py"));
    }
}
