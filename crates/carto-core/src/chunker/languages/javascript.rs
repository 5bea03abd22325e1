//! JavaScript top-level declaration extractor.
//!
//! Extracts functions, classes, and top-level bindings whose value is a
//! function or arrow. `export` on the declaration line marks the name as
//! exported; `export default` declarations are named after the inner
//! declaration or fall back to `default`.

use crate::types::ChunkKind;

use super::{declaration_from, node_text, Declaration, LanguageChunker};

/// Extractor for JavaScript source files.
pub struct JavaScriptChunker;

impl LanguageChunker for JavaScriptChunker {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_javascript::LANGUAGE.into()
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &[u8]) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();

        for child in root.children(&mut cursor) {
            extract_top_level(child, child, source, false, &mut declarations);
        }

        declarations
    }
}

/// Shared walker for JavaScript-family grammars (reused by TypeScript,
/// whose JS constructs carry the same node kinds).
///
/// `range_node` is the outermost node (so `export` prefixes stay in the
/// chunk text); `node` is the declaration being inspected.
pub(super) fn extract_top_level(
    range_node: tree_sitter::Node<'_>,
    node: tree_sitter::Node<'_>,
    source: &[u8],
    exported: bool,
    declarations: &mut Vec<Declaration>,
) {
    match node.kind() {
        "export_statement" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.is_named() && child.kind() != "export_clause" {
                    extract_top_level(node, child, source, true, declarations);
                }
            }
        }
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source).to_string();
                declarations.push(declaration_from(
                    range_node,
                    source,
                    name,
                    ChunkKind::Function,
                    exported,
                ));
            }
        }
        "class_declaration" | "abstract_class_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source).to_string();
                declarations.push(declaration_from(
                    range_node,
                    source,
                    name,
                    ChunkKind::Class,
                    exported,
                ));
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            extract_bindings(range_node, node, source, exported, declarations);
        }
        _ => {}
    }
}

/// `const x = () => {}` style bindings. Function-valued bindings become
/// function chunks; other exported bindings become type chunks.
fn extract_bindings(
    range_node: tree_sitter::Node<'_>,
    node: tree_sitter::Node<'_>,
    source: &[u8],
    exported: bool,
    declarations: &mut Vec<Declaration>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "variable_declarator" {
            continue;
        }
        let name_node = match child.child_by_field_name("name") {
            Some(n) => n,
            None => continue,
        };
        let name = node_text(name_node, source).to_string();

        let is_function = child
            .child_by_field_name("value")
            .map(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function"))
            .unwrap_or(false);

        if is_function {
            declarations.push(declaration_from(
                range_node,
                source,
                name,
                ChunkKind::Function,
                exported,
            ));
        } else if exported {
            declarations.push(declaration_from(
                range_node,
                source,
                name,
                ChunkKind::Type,
                exported,
            ));
        }
    }
}
