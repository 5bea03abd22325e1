//! Python top-level declaration extractor.
//!
//! Extracts module-level functions and classes, unwrapping decorators so
//! the chunk text includes them. Python has no export keyword; names not
//! starting with an underscore are treated as public.

use crate::types::ChunkKind;

use super::{declaration_from, node_text, Declaration, LanguageChunker};

/// Extractor for Python source files.
pub struct PythonChunker;

impl LanguageChunker for PythonChunker {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &[u8]) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        let root = tree.root_node();
        let mut cursor = root.walk();

        for child in root.children(&mut cursor) {
            match child.kind() {
                "function_definition" | "class_definition" => {
                    if let Some(decl) = extract_definition(child, child, source) {
                        declarations.push(decl);
                    }
                }
                // `@decorator` wrapping: range covers the decorators too.
                "decorated_definition" => {
                    if let Some(inner) = child.child_by_field_name("definition") {
                        if let Some(decl) = extract_definition(child, inner, source) {
                            declarations.push(decl);
                        }
                    }
                }
                _ => {}
            }
        }

        declarations
    }
}

fn extract_definition(
    range_node: tree_sitter::Node<'_>,
    def_node: tree_sitter::Node<'_>,
    source: &[u8],
) -> Option<Declaration> {
    let kind = match def_node.kind() {
        "function_definition" => ChunkKind::Function,
        "class_definition" => ChunkKind::Class,
        _ => return None,
    };

    let name_node = def_node.child_by_field_name("name")?;
    let name = node_text(name_node, source).to_string();
    let exported = !name.starts_with('_');

    Some(declaration_from(range_node, source, name, kind, exported))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_file;
    use crate::types::Language;
    use std::path::Path;

    fn chunks(source: &str) -> Vec<crate::types::Chunk> {
        chunk_file(Language::Python, Path::new("app.py"), source)
    }

    #[test]
    fn test_function_and_class() {
        let src = "def handler(event):\n    return event\n\nclass Service:\n    def run(self):\n        pass\n";
        let result = chunks(src);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].name, "handler");
        assert_eq!(result[0].kind, ChunkKind::Function);
        assert_eq!(result[1].name, "Service");
        assert_eq!(result[1].kind, ChunkKind::Class);
        // Methods stay inside the class chunk.
        assert!(result[1].text.contains("def run"));
    }

    #[test]
    fn test_private_name_not_exported() {
        let src = "def _internal():\n    pass\n\ndef public():\n    pass\n";
        let result = chunks(src);
        assert!(result[0].exports.is_empty());
        assert_eq!(result[1].exports, vec!["public"]);
    }

    #[test]
    fn test_decorated_function_includes_decorator() {
        let src = "@app.route('/health')\ndef health():\n    return 'ok'\n";
        let result = chunks(src);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "health");
        assert_eq!(result[0].line_start, 1);
        assert!(result[0].text.starts_with("@app.route"));
    }

    #[test]
    fn test_expression_only_file_falls_back() {
        let src = "print('hello')\nx = 1\n";
        let result = chunks(src);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].kind, ChunkKind::Module);
        assert_eq!(result[0].line_start, 1);
    }
}
