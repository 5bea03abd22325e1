//! TypeScript top-level declaration extractor.
//!
//! Reuses the JavaScript walker for shared constructs and adds the
//! TypeScript-only node kinds: interfaces, type aliases, enums, and
//! namespaces.

use crate::types::ChunkKind;

use super::{declaration_from, javascript, node_text, Declaration, LanguageChunker};

/// Extractor for TypeScript source files.
pub struct TypeScriptChunker;

impl LanguageChunker for TypeScriptChunker {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &[u8]) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();

        for child in root.children(&mut cursor) {
            extract_ts_top_level(child, child, source, false, &mut declarations);
        }

        declarations
    }
}

fn extract_ts_top_level(
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
                    extract_ts_top_level(node, child, source, true, declarations);
                }
            }
        }
        "interface_declaration" => {
            push_named(range_node, node, source, ChunkKind::Interface, exported, declarations);
        }
        "type_alias_declaration" => {
            push_named(range_node, node, source, ChunkKind::Type, exported, declarations);
        }
        "enum_declaration" => {
            push_named(range_node, node, source, ChunkKind::Class, exported, declarations);
        }
        "internal_module" | "module" => {
            push_named(range_node, node, source, ChunkKind::Module, exported, declarations);
        }
        // Some grammar versions wrap `namespace X {}` in a statement node.
        "expression_statement" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "internal_module" {
                    push_named(node, child, source, ChunkKind::Module, exported, declarations);
                }
            }
        }
        _ => javascript::extract_top_level(range_node, node, source, exported, declarations),
    }
}

fn push_named(
    range_node: tree_sitter::Node<'_>,
    node: tree_sitter::Node<'_>,
    source: &[u8],
    kind: ChunkKind,
    exported: bool,
    declarations: &mut Vec<Declaration>,
) {
    if let Some(name_node) = node.child_by_field_name("name") {
        let name = node_text(name_node, source).to_string();
        declarations.push(declaration_from(range_node, source, name, kind, exported));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_file;
    use crate::types::Language;
    use std::path::Path;

    fn chunks(source: &str) -> Vec<crate::types::Chunk> {
        chunk_file(Language::TypeScript, Path::new("api.ts"), source)
    }

    #[test]
    fn test_interface_and_type_alias() {
        let src = "export interface User {\n  id: number;\n  name: string;\n}\n\ntype UserId = number;\n";
        let result = chunks(src);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].name, "User");
        assert_eq!(result[0].kind, ChunkKind::Interface);
        assert_eq!(result[0].exports, vec!["User"]);
        assert_eq!(result[1].name, "UserId");
        assert_eq!(result[1].kind, ChunkKind::Type);
        assert!(result[1].exports.is_empty());
    }

    #[test]
    fn test_enum() {
        let src = "export enum Status {\n  Active,\n  Disabled,\n}\n";
        let result = chunks(src);
        assert_eq!(result[0].kind, ChunkKind::Class);
        assert_eq!(result[0].name, "Status");
    }

    #[test]
    fn test_js_constructs_still_work() {
        let src = "export function load(id: number): Promise<string> {\n  return fetch(`/u/${id}`).then(r => r.text());\n}\n\nclass Cache {\n  private store = new Map();\n}\n";
        let result = chunks(src);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].kind, ChunkKind::Function);
        assert_eq!(result[1].kind, ChunkKind::Class);
    }

    #[test]
    fn test_namespace() {
        let src = "namespace Geometry {\n  export function area(r: number) { return r * r; }\n}\n";
        let result = chunks(src);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].kind, ChunkKind::Module);
        assert_eq!(result[0].name, "Geometry");
    }
}
