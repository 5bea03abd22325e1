//! Java top-level declaration extractor.
//!
//! Java puts everything inside top-level types, so extraction stops at
//! classes, interfaces, enums, records, and annotation types. Method
//! bodies stay inside their type's chunk. The `public` modifier marks a
//! type as exported.

use crate::types::ChunkKind;

use super::{declaration_from, node_text, Declaration, LanguageChunker};

/// Extractor for Java source files.
pub struct JavaChunker;

impl LanguageChunker for JavaChunker {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &[u8]) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();

        for child in root.children(&mut cursor) {
            let kind = match child.kind() {
                "class_declaration" | "enum_declaration" | "record_declaration" => {
                    ChunkKind::Class
                }
                "interface_declaration" | "annotation_type_declaration" => ChunkKind::Interface,
                _ => continue,
            };

            if let Some(name_node) = child.child_by_field_name("name") {
                let name = node_text(name_node, source).to_string();
                let exported = has_public_modifier(child, source);
                declarations.push(declaration_from(child, source, name, kind, exported));
            }
        }

        declarations
    }
}

/// Check the `modifiers` child for `public`.
fn has_public_modifier(node: tree_sitter::Node<'_>, source: &[u8]) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "modifiers" {
            return node_text(child, source)
                .split_whitespace()
                .any(|m| m == "public");
        }
    }
    false
}
