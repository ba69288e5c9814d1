//! TypeScript language definitions
//!
//! `.tsx` needs the TSX grammar variant; imports are extracted the same way.

use super::script::{extract_import, is_test_file, IMPORT_QUERY};
use super::LanguageDef;

static DEFINITION: LanguageDef = LanguageDef {
    name: "typescript",
    grammar: || tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
    extensions: &["ts", "mts", "cts"],
    import_query: IMPORT_QUERY,
    extract_import,
    is_test_file,
};

static TSX_DEFINITION: LanguageDef = LanguageDef {
    name: "tsx",
    grammar: || tree_sitter_typescript::LANGUAGE_TSX.into(),
    extensions: &["tsx"],
    import_query: IMPORT_QUERY,
    extract_import,
    is_test_file,
};

pub fn definition() -> &'static LanguageDef {
    &DEFINITION
}

pub fn tsx_definition() -> &'static LanguageDef {
    &TSX_DEFINITION
}
