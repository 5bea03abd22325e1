//! Go top-level declaration extractor.
//!
//! Extracts functions, methods, and type declarations (structs,
//! interfaces, aliases). Go marks visibility by capitalization:
//! a capitalized name is exported.

use crate::types::ChunkKind;

use super::{declaration_from, node_text, Declaration, LanguageChunker};

/// Extractor for Go source files.
pub struct GoChunker;

impl LanguageChunker for GoChunker {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_go::LANGUAGE.into()
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &[u8]) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();

        for child in root.children(&mut cursor) {
            match child.kind() {
                "function_declaration" | "method_declaration" => {
                    if let Some(name_node) = child.child_by_field_name("name") {
                        let name = node_text(name_node, source).to_string();
                        let exported = go_exported(&name);
                        declarations.push(declaration_from(
                            child,
                            source,
                            name,
                            ChunkKind::Function,
                            exported,
                        ));
                    }
                }
                "type_declaration" => {
                    extract_type_specs(child, source, &mut declarations);
                }
                _ => {}
            }
        }

        declarations
    }
}

/// A `type` declaration may hold several specs: `type ( A struct{...}; B int )`.
fn extract_type_specs(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    declarations: &mut Vec<Declaration>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        // `type A struct{}` is a type_spec; `type B = A` is a type_alias.
        if child.kind() != "type_spec" && child.kind() != "type_alias" {
            continue;
        }
        let name_node = match child.child_by_field_name("name") {
            Some(n) => n,
            None => continue,
        };
        let name = node_text(name_node, source).to_string();

        let kind = if child.kind() == "type_alias" {
            ChunkKind::Type
        } else {
            match child.child_by_field_name("type") {
                Some(body) => match body.kind() {
                    "struct_type" => ChunkKind::Class,
                    "interface_type" => ChunkKind::Interface,
                    _ => ChunkKind::Type,
                },
                None => ChunkKind::Type,
            }
        };

        let exported = go_exported(&name);
        // Use the outer declaration node so the chunk text includes the
        // `type` keyword for single-spec declarations.
        let range_node = if node.named_child_count() == 1 { node } else { child };
        declarations.push(declaration_from(range_node, source, name, kind, exported));
    }
}

/// Go visibility: capitalized names are exported.
fn go_exported(name: &str) -> bool {
    name.starts_with(|c: char| c.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_file;
    use crate::types::Language;
    use std::path::Path;

    fn chunks(source: &str) -> Vec<crate::types::Chunk> {
        chunk_file(Language::Go, Path::new("main.go"), source)
    }

    #[test]
    fn test_functions_and_methods() {
        let src = "package main\n\nfunc Hello() string {\n\treturn \"hi\"\n}\n\nfunc (c *Config) validate() bool {\n\treturn true\n}\n";
        let result = chunks(src);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].name, "Hello");
        assert_eq!(result[0].kind, ChunkKind::Function);
        assert_eq!(result[0].exports, vec!["Hello"]);
        assert_eq!(result[1].name, "validate");
        assert!(result[1].exports.is_empty());
    }

    #[test]
    fn test_struct_and_interface() {
        let src = "package main\n\ntype Config struct {\n\tName string\n}\n\ntype Reader interface {\n\tRead(p []byte) (int, error)\n}\n\ntype alias = Config\n";
        let result = chunks(src);
        let config = result.iter().find(|c| c.name == "Config").expect("Config");
        assert_eq!(config.kind, ChunkKind::Class);
        let reader = result.iter().find(|c| c.name == "Reader").expect("Reader");
        assert_eq!(reader.kind, ChunkKind::Interface);
        let alias = result.iter().find(|c| c.name == "alias").expect("alias");
        assert_eq!(alias.kind, ChunkKind::Type);
        assert!(alias.exports.is_empty());
    }

    #[test]
    fn test_line_ranges_ascending_non_overlapping() {
        let src = "package main\n\nfunc A() {}\n\nfunc B() {}\n\nfunc C() {}\n";
        let result = chunks(src);
        assert_eq!(result.len(), 3);
        for pair in result.windows(2) {
            assert!(pair[0].line_end < pair[1].line_start);
        }
    }

    #[test]
    fn test_go_imports_extracted() {
        let src = "package main\n\nimport (\n\t\"fmt\"\n\t\"example.com/m/internal\"\n)\n\nfunc main() {\n\tfmt.Println(\"x\")\n}\n";
        let result = chunks(src);
        // Only the function is a declaration; imports come from its text,
        // so the whole-file import block is not attached to it.
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "main");
    }
}
