//! Syntax-aware chunker.
//!
//! Splits a source file into an ordered, non-overlapping list of chunks
//! covering the syntactic top level. Six languages (Go, JavaScript,
//! TypeScript, Python, Java, Rust) get tree-sitter declaration extraction;
//! everything else, and any file whose parse yields no declarations,
//! becomes a single whole-file chunk.
//!
//! Parse failures degrade to the whole-file chunk and never propagate.

pub mod languages;

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Chunk, ChunkKind, Language};

/// Chunk one file.
///
/// Returns at least one chunk for non-empty content: the extracted
/// declarations, or a whole-file fallback whose kind reflects the file
/// family (`module` for source, `config` for configuration formats,
/// `script` for shell/docker/make).
pub fn chunk_file(language: Language, file: &Path, content: &str) -> Vec<Chunk> {
    if language.has_grammar() {
        if let Some(declarations) = extract_declarations(language, content) {
            if !declarations.is_empty() {
                return declarations
                    .into_iter()
                    .map(|decl| {
                        let imports = extract_imports(language, &decl.text);
                        let exports = if decl.exported {
                            vec![decl.name.clone()]
                        } else {
                            Vec::new()
                        };
                        Chunk {
                            file: file.to_path_buf(),
                            name: decl.name,
                            kind: decl.kind,
                            language,
                            line_start: decl.line_start,
                            line_end: decl.line_end,
                            text: decl.text,
                            imports,
                            exports,
                        }
                    })
                    .collect();
            }
        } else {
            tracing::debug!(
                file = %file.display(),
                language = %language,
                "parse failed, falling back to whole-file chunk"
            );
        }
    }

    vec![whole_file_chunk(language, file, content)]
}

/// Run the language extractor over the content. `None` means the parser
/// could not be constructed or the parse itself failed.
fn extract_declarations(
    language: Language,
    content: &str,
) -> Option<Vec<languages::Declaration>> {
    let chunker = languages::extractor(language)?;

    let mut parser = tree_sitter::Parser::new();
    parser.set_language(&chunker.grammar()).ok()?;
    let tree = parser.parse(content, None)?;

    Some(chunker.extract(&tree, content.as_bytes()))
}

/// Build the single whole-file fallback chunk.
fn whole_file_chunk(language: Language, file: &Path, content: &str) -> Chunk {
    let kind = if language.is_config() {
        ChunkKind::Config
    } else if language.is_script() {
        ChunkKind::Script
    } else {
        ChunkKind::Module
    };

    let line_count = content.lines().count().max(1) as u32;
    let name = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".into());

    Chunk {
        file: file.to_path_buf(),
        name,
        kind,
        language,
        line_start: 1,
        line_end: line_count,
        text: content.to_string(),
        imports: extract_imports(language, content),
        exports: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Import extraction (per language family, regex-based)
// ---------------------------------------------------------------------------

static GO_IMPORT_SINGLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s+(?:[A-Za-z_.]+\s+)?"([^"]+)""#).expect("static regex")
});
static GO_IMPORT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"import\s*\(((?s).*?)\)").expect("static regex"));
static GO_IMPORT_BLOCK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)""#).expect("static regex"));

static JS_IMPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s+(?:[\w$*{},\s]+?\s+from\s+)?['"]([^'"]+)['"]"#).expect("static regex")
});
static JS_REQUIRE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:require|import)\s*\(\s*['"]([^'"]+)['"]\s*\)"#).expect("static regex")
});

static PY_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*import\s+([\w.]+(?:\s*,\s*[\w.]+)*)").expect("static regex"));
static PY_FROM_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*from\s+([\w.]+)\s+import").expect("static regex"));

static JAVA_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*import\s+(?:static\s+)?([\w.]+(?:\.\*)?)\s*;").expect("static regex")
});

static RUST_USE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([A-Za-z_]\w*)").expect("static regex")
});
static RUST_EXTERN_CRATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"extern\s+crate\s+(\w+)").expect("static regex"));

/// Extract a deduplicated, order-preserving list of import targets from a
/// chunk's text.
pub fn extract_imports(language: Language, text: &str) -> Vec<String> {
    let mut imports: Vec<String> = Vec::new();
    let mut push = |target: &str| {
        let target = target.trim();
        if !target.is_empty() && !imports.iter().any(|i| i == target) {
            imports.push(target.to_string());
        }
    };

    match language {
        Language::Go => {
            for caps in GO_IMPORT_BLOCK.captures_iter(text) {
                for line in GO_IMPORT_BLOCK_LINE.captures_iter(&caps[1]) {
                    push(&line[1]);
                }
            }
            for caps in GO_IMPORT_SINGLE.captures_iter(text) {
                push(&caps[1]);
            }
        }
        Language::JavaScript | Language::TypeScript => {
            for caps in JS_IMPORT_FROM.captures_iter(text) {
                push(&caps[1]);
            }
            for caps in JS_REQUIRE.captures_iter(text) {
                push(&caps[1]);
            }
        }
        Language::Python => {
            for caps in PY_IMPORT.captures_iter(text) {
                for target in caps[1].split(',') {
                    push(target);
                }
            }
            for caps in PY_FROM_IMPORT.captures_iter(text) {
                push(&caps[1]);
            }
        }
        Language::Java => {
            for caps in JAVA_IMPORT.captures_iter(text) {
                push(&caps[1]);
            }
        }
        Language::Rust => {
            for caps in RUST_USE.captures_iter(text) {
                push(&caps[1]);
            }
            for caps in RUST_EXTERN_CRATE.captures_iter(text) {
                push(&caps[1]);
            }
        }
        _ => {}
    }

    imports
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_config_fallback_kind() {
        let chunks = chunk_file(Language::Yaml, Path::new("ci.yaml"), "jobs:\n  build:\n    steps: []\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Config);
        assert_eq!(chunks[0].name, "ci");
        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks[0].line_end, 3);
    }

    #[test]
    fn test_script_fallback_kind() {
        let chunks = chunk_file(Language::Dockerfile, Path::new("Dockerfile"), "FROM alpine\nRUN true\n");
        assert_eq!(chunks[0].kind, ChunkKind::Script);
    }

    #[test]
    fn test_unknown_fallback_kind() {
        let chunks = chunk_file(Language::Unknown, Path::new("notes.txt"), "hello\n");
        assert_eq!(chunks[0].kind, ChunkKind::Module);
    }

    #[test]
    fn test_empty_content_single_chunk() {
        let chunks = chunk_file(Language::Markdown, Path::new("README.md"), "");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks[0].line_end, 1);
    }

    #[test]
    fn test_chunks_ordered_and_disjoint() {
        let src = "package main\n\nfunc A() {}\n\nfunc B() {}\n\ntype C struct{}\n";
        let chunks = chunk_file(Language::Go, Path::new("main.go"), src);
        assert!(chunks.len() >= 3);
        for pair in chunks.windows(2) {
            assert!(
                pair[0].line_end < pair[1].line_start,
                "chunks must not overlap: {:?} vs {:?}",
                (pair[0].line_start, pair[0].line_end),
                (pair[1].line_start, pair[1].line_end),
            );
        }
    }

    #[test]
    fn test_go_imports() {
        let text = "import (\n\t\"fmt\"\n\tlog \"github.com/acme/logger\"\n)\nimport \"os\"\n";
        let imports = extract_imports(Language::Go, text);
        assert_eq!(imports, vec!["fmt", "github.com/acme/logger", "os"]);
    }

    #[test]
    fn test_js_imports() {
        let text = "import React from 'react';\nimport { useState } from 'react';\nconst fs = require('fs');\nawait import('./lazy');\n";
        let imports = extract_imports(Language::JavaScript, text);
        assert_eq!(imports, vec!["react", "fs", "./lazy"]);
    }

    #[test]
    fn test_python_imports() {
        let text = "import os, sys\nimport json\nfrom pathlib import Path\n";
        let imports = extract_imports(Language::Python, text);
        assert_eq!(imports, vec!["os", "sys", "json", "pathlib"]);
    }

    #[test]
    fn test_java_imports() {
        let text = "import java.util.List;\nimport static org.junit.Assert.*;\nimport com.acme.*;\n";
        let imports = extract_imports(Language::Java, text);
        assert_eq!(imports, vec!["java.util.List", "org.junit.Assert.*", "com.acme.*"]);
    }

    #[test]
    fn test_rust_imports() {
        let text = "use std::collections::HashMap;\npub use serde::Serialize;\npub(crate) use tokio::sync;\nextern crate alloc;\n";
        let imports = extract_imports(Language::Rust, text);
        assert_eq!(imports, vec!["std", "serde", "tokio", "alloc"]);
    }

    #[test]
    fn test_imports_deduplicated() {
        let text = "import json\nimport json\n";
        let imports = extract_imports(Language::Python, text);
        assert_eq!(imports, vec!["json"]);
    }
}
