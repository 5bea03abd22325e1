//! Rust top-level declaration extractor.
//!
//! Extracts functions, structs, enums, traits, impl blocks, type aliases,
//! and inline modules. The `pub` marker on the declaration line decides
//! export status.
//!
//! ## AST node types (tree-sitter-rust)
//!
//! - `function_item` -> function
//! - `struct_item` / `enum_item` / `union_item` -> class
//! - `trait_item` -> interface
//! - `impl_item` -> class (named `impl X` / `impl T for X`)
//! - `type_item` -> type
//! - `mod_item` -> module

use crate::types::ChunkKind;

use super::{declaration_from, node_text, Declaration, LanguageChunker};

/// Extractor for Rust source files.
pub struct RustChunker;

impl LanguageChunker for RustChunker {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &[u8]) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();

        for child in root.children(&mut cursor) {
            let kind = match child.kind() {
                "function_item" => ChunkKind::Function,
                "struct_item" | "enum_item" | "union_item" => ChunkKind::Class,
                "trait_item" => ChunkKind::Interface,
                "type_item" => ChunkKind::Type,
                "mod_item" => ChunkKind::Module,
                "impl_item" => {
                    if let Some(decl) = extract_impl(child, source) {
                        declarations.push(decl);
                    }
                    continue;
                }
                _ => continue,
            };

            if let Some(name_node) = child.child_by_field_name("name") {
                let name = node_text(name_node, source).to_string();
                let exported = is_pub(child, source);
                declarations.push(declaration_from(child, source, name, kind, exported));
            }
        }

        declarations
    }
}

/// impl blocks carry no `name` field; build one from the type (and trait).
fn extract_impl(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<Declaration> {
    let type_node = node.child_by_field_name("type")?;
    let type_name = node_text(type_node, source);

    let name = if let Some(trait_node) = node.child_by_field_name("trait") {
        format!("impl {} for {}", node_text(trait_node, source), type_name)
    } else {
        format!("impl {type_name}")
    };

    // impl blocks have no visibility of their own; they surface whatever
    // their type exports, so mark them exported.
    Some(declaration_from(node, source, name, ChunkKind::Class, true))
}

/// True when the declaration carries a `pub` visibility modifier.
fn is_pub(node: tree_sitter::Node<'_>, source: &[u8]) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            return node_text(child, source).starts_with("pub");
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_file;
    use crate::types::Language;
    use std::path::Path;

    fn chunks(source: &str) -> Vec<crate::types::Chunk> {
        chunk_file(Language::Rust, Path::new("lib.rs"), source)
    }

    #[test]
    fn test_function_visibility() {
        let src = "pub fn api() {}\n\nfn helper() {}\n";
        let result = chunks(src);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].exports, vec!["api"]);
        assert!(result[1].exports.is_empty());
    }

    #[test]
    fn test_struct_enum_trait_kinds() {
        let src = "pub struct Config;\n\npub enum Mode { A, B }\n\npub trait Run {\n    fn run(&self);\n}\n\npub type Alias = u32;\n";
        let result = chunks(src);
        assert_eq!(result[0].kind, ChunkKind::Class);
        assert_eq!(result[1].kind, ChunkKind::Class);
        assert_eq!(result[2].kind, ChunkKind::Interface);
        assert_eq!(result[3].kind, ChunkKind::Type);
    }

    #[test]
    fn test_impl_blocks_not_split() {
        let src = "struct Config;\n\nimpl Config {\n    pub fn new() -> Self { Config }\n    fn check(&self) {}\n}\n";
        let result = chunks(src);
        assert_eq!(result.len(), 2);
        let imp = result.iter().find(|c| c.name == "impl Config").expect("impl");
        assert_eq!(imp.kind, ChunkKind::Class);
        // Methods stay inside the impl chunk.
        assert!(imp.text.contains("fn new"));
        assert!(!result.iter().any(|c| c.name == "new"));
    }

    #[test]
    fn test_trait_impl_name() {
        let src = "impl Display for Config {\n    fn fmt(&self) {}\n}\n";
        let result = chunks(src);
        assert_eq!(result[0].name, "impl Display for Config");
    }

    #[test]
    fn test_inline_module() {
        let src = "pub mod util {\n    pub fn inner() {}\n}\n";
        let result = chunks(src);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "util");
        assert_eq!(result[0].kind, ChunkKind::Module);
    }

    #[test]
    fn test_use_imports_on_whole_file_text() {
        let src = "use std::collections::HashMap;\nuse serde::Serialize;\n\npub fn f() -> HashMap<String, String> { HashMap::new() }\n";
        let result = chunks(src);
        assert_eq!(result.len(), 1);
        // Imports are extracted from chunk text; the fn chunk has none.
        assert!(result[0].imports.is_empty());
    }
}
