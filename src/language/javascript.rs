//! JavaScript language definition

use super::script::{extract_import, is_test_file, IMPORT_QUERY};
use super::LanguageDef;

static DEFINITION: LanguageDef = LanguageDef {
    name: "javascript",
    grammar: || tree_sitter_javascript::LANGUAGE.into(),
    extensions: &["js", "jsx", "mjs", "cjs"],
    import_query: IMPORT_QUERY,
    extract_import,
    is_test_file,
};

pub fn definition() -> &'static LanguageDef {
    &DEFINITION
}
