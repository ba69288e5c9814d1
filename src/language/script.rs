//! Import extraction shared by JavaScript and TypeScript
//!
//! Both grammars use the same node kinds for ES module statements and calls.

use super::{in_test_dir, ImportSpec};

/// Tree-sitter query for import-bearing nodes
pub(super) const IMPORT_QUERY: &str = r#"
(import_statement) @import
(export_statement) @export
(call_expression) @call
"#;

/// Literal value of a string or substitution-free template node
fn literal(node: tree_sitter::Node, source: &str) -> Option<String> {
    let text = &source[node.byte_range()];
    match node.kind() {
        "string" => Some(text.trim_matches(|c| c == '"' || c == '\'').to_string()),
        "template_string" => {
            let mut cursor = node.walk();
            let has_substitution = node
                .named_children(&mut cursor)
                .any(|c| c.kind() == "template_substitution");
            if has_substitution {
                None
            } else {
                Some(text.trim_matches('`').to_string())
            }
        }
        _ => None,
    }
}

pub(super) fn extract_import(capture: &str, node: tree_sitter::Node, source: &str) -> Vec<ImportSpec> {
    match capture {
        "import" | "export" => {
            let source_node = node.child_by_field_name("source").or_else(|| {
                // TypeScript `import x = require("y")`
                let mut cursor = node.walk();
                let clause = node
                    .named_children(&mut cursor)
                    .find(|c| c.kind() == "import_require_clause")?;
                clause.child_by_field_name("source").or_else(|| {
                    let mut inner = clause.walk();
                    let found = clause
                        .named_children(&mut inner)
                        .find(|c| c.kind() == "string");
                    found
                })
            });
            source_node
                .and_then(|s| literal(s, source))
                .map(ImportSpec::Script)
                .into_iter()
                .collect()
        }
        "call" => {
            let Some(function) = node.child_by_field_name("function") else {
                return Vec::new();
            };
            let is_loader = function.kind() == "import"
                || (function.kind() == "identifier" && &source[function.byte_range()] == "require");
            if !is_loader {
                return Vec::new();
            }
            let first_arg = node
                .child_by_field_name("arguments")
                .and_then(|args| args.named_child(0));
            match first_arg {
                Some(arg) => match literal(arg, source) {
                    Some(spec) => vec![ImportSpec::Script(spec)],
                    None => vec![ImportSpec::Dynamic],
                },
                None => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

pub(super) fn is_test_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.contains(".test.") || name.contains(".spec.") || in_test_dir(path)
}
