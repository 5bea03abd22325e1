//! Per-language top-level declaration extractors.
//!
//! Each of the six grammar-backed languages registers an extractor that
//! maps tree-sitter AST nodes to [`Declaration`]s. Extractors only look at
//! the syntactic top level: method bodies inside classes/impls are not
//! split out, so the returned declarations are non-overlapping and in
//! source order by construction.

pub mod go;
pub mod java;
pub mod javascript;
pub mod python;
pub mod rust;
pub mod typescript;

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::types::{ChunkKind, Language};

/// A top-level declaration extracted from an AST.
#[derive(Debug, Clone)]
pub struct Declaration {
    /// Declaration name.
    pub name: String,
    /// Chunk kind this declaration maps to.
    pub kind: ChunkKind,
    /// Starting line (1-indexed).
    pub line_start: u32,
    /// Ending line (1-indexed, inclusive).
    pub line_end: u32,
    /// Raw source text.
    pub text: String,
    /// Whether the source line carries the language's public marker.
    pub exported: bool,
}

/// Trait each language extractor implements.
pub trait LanguageChunker: Send + Sync {
    /// Returns the tree-sitter grammar for this language.
    fn grammar(&self) -> tree_sitter::Language;

    /// Extract top-level declarations from a parsed tree.
    fn extract(&self, tree: &tree_sitter::Tree, source: &[u8]) -> Vec<Declaration>;
}

/// Global extractor registry, initialized once.
static REGISTRY: OnceLock<HashMap<Language, Box<dyn LanguageChunker>>> = OnceLock::new();

/// Get the extractor for a language, when one is registered.
pub fn extractor(language: Language) -> Option<&'static dyn LanguageChunker> {
    let registry = REGISTRY.get_or_init(|| {
        let mut map: HashMap<Language, Box<dyn LanguageChunker>> = HashMap::new();
        map.insert(Language::Go, Box::new(go::GoChunker));
        map.insert(Language::JavaScript, Box::new(javascript::JavaScriptChunker));
        map.insert(Language::TypeScript, Box::new(typescript::TypeScriptChunker));
        map.insert(Language::Python, Box::new(python::PythonChunker));
        map.insert(Language::Java, Box::new(java::JavaChunker));
        map.insert(Language::Rust, Box::new(rust::RustChunker));
        map
    });
    registry.get(&language).map(|c| c.as_ref())
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Get the text content of a tree-sitter node.
pub(crate) fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a [u8]) -> &'a str {
    std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
}

/// 1-indexed start line of a node.
pub(crate) fn line_start(node: tree_sitter::Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

/// 1-indexed inclusive end line of a node.
pub(crate) fn line_end(node: tree_sitter::Node<'_>) -> u32 {
    node.end_position().row as u32 + 1
}

/// Build a declaration from a node with an already-resolved name and kind.
pub(crate) fn declaration_from(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    name: String,
    kind: ChunkKind,
    exported: bool,
) -> Declaration {
    Declaration {
        name,
        kind,
        line_start: line_start(node),
        line_end: line_end(node),
        text: node_text(node, source).to_string(),
        exported,
    }
}
