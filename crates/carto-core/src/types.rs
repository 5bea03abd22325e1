//! Core domain types shared across all carto-core subsystems.
//!
//! These types form the API contract between modules. Changing them
//! requires updating all consumers, so they should be stable and minimal.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Languages and file formats recognized by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Go (.go)
    Go,
    /// JavaScript (.js, .jsx, .mjs, .cjs)
    JavaScript,
    /// TypeScript (.ts, .tsx, .mts, .cts)
    TypeScript,
    /// Python (.py, .pyi)
    Python,
    /// Java (.java)
    Java,
    /// Rust (.rs)
    Rust,
    /// C (.c, .h)
    C,
    /// C++ (.cpp, .cc, .cxx, .hpp, .hxx, .hh)
    Cpp,
    /// C# (.cs)
    CSharp,
    /// Ruby (.rb, .rake)
    Ruby,
    /// PHP (.php)
    Php,
    /// Swift (.swift)
    Swift,
    /// Kotlin (.kt, .kts)
    Kotlin,
    /// Scala (.scala, .sbt)
    Scala,
    /// Dart (.dart)
    Dart,
    /// Lua (.lua)
    Lua,
    /// Elixir (.ex, .exs)
    Elixir,
    /// Erlang (.erl, .hrl)
    Erlang,
    /// Haskell (.hs)
    Haskell,
    /// Zig (.zig)
    Zig,
    /// SQL (.sql)
    Sql,
    /// Protocol Buffers (.proto)
    Proto,
    /// GraphQL (.graphql, .gql)
    GraphQl,
    /// Vue single-file components (.vue)
    Vue,
    /// Svelte components (.svelte)
    Svelte,
    /// HTML (.html, .htm)
    Html,
    /// CSS / SCSS / LESS (.css, .scss, .less)
    Css,
    /// Shell (.sh, .bash, .zsh) and exact names like `Makefile`
    Shell,
    /// PowerShell (.ps1)
    PowerShell,
    /// Dockerfile (exact filename or .dockerfile)
    Dockerfile,
    /// Makefile (exact filename, .mk)
    Makefile,
    /// Markdown (.md, .mdx, .rst)
    Markdown,
    /// TOML (.toml)
    Toml,
    /// YAML (.yml, .yaml)
    Yaml,
    /// JSON (.json, .jsonc)
    Json,
    /// XML (.xml)
    Xml,
    /// INI-style config (.ini, .cfg, .conf, .properties)
    Ini,
    /// Terraform (.tf, .tfvars)
    Terraform,
    /// Unknown / unmapped. Still included in scan output.
    Unknown,
}

impl Language {
    /// Detect language from a filename extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "go" => Self::Go,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "py" | "pyi" => Self::Python,
            "java" => Self::Java,
            "rs" => Self::Rust,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Self::Cpp,
            "cs" => Self::CSharp,
            "rb" | "rake" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kt" | "kts" => Self::Kotlin,
            "scala" | "sbt" => Self::Scala,
            "dart" => Self::Dart,
            "lua" => Self::Lua,
            "ex" | "exs" => Self::Elixir,
            "erl" | "hrl" => Self::Erlang,
            "hs" => Self::Haskell,
            "zig" => Self::Zig,
            "sql" => Self::Sql,
            "proto" => Self::Proto,
            "graphql" | "gql" => Self::GraphQl,
            "vue" => Self::Vue,
            "svelte" => Self::Svelte,
            "html" | "htm" => Self::Html,
            "css" | "scss" | "less" => Self::Css,
            "sh" | "bash" | "zsh" => Self::Shell,
            "ps1" => Self::PowerShell,
            "dockerfile" => Self::Dockerfile,
            "mk" => Self::Makefile,
            "md" | "mdx" | "rst" => Self::Markdown,
            "toml" => Self::Toml,
            "yml" | "yaml" => Self::Yaml,
            "json" | "jsonc" => Self::Json,
            "xml" => Self::Xml,
            "ini" | "cfg" | "conf" | "properties" => Self::Ini,
            "tf" | "tfvars" => Self::Terraform,
            _ => Self::Unknown,
        }
    }

    /// Detect language from an exact filename (for extensionless files).
    pub fn from_filename(name: &str) -> Option<Self> {
        match name {
            "Dockerfile" | "Containerfile" => Some(Self::Dockerfile),
            "Makefile" | "makefile" | "GNUmakefile" => Some(Self::Makefile),
            "Rakefile" => Some(Self::Ruby),
            "Gemfile" => Some(Self::Ruby),
            "Jenkinsfile" => Some(Self::Shell),
            "Vagrantfile" => Some(Self::Ruby),
            "CMakeLists.txt" => Some(Self::Makefile),
            _ => None,
        }
    }

    /// Returns the language identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Rust => "rust",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Scala => "scala",
            Self::Dart => "dart",
            Self::Lua => "lua",
            Self::Elixir => "elixir",
            Self::Erlang => "erlang",
            Self::Haskell => "haskell",
            Self::Zig => "zig",
            Self::Sql => "sql",
            Self::Proto => "proto",
            Self::GraphQl => "graphql",
            Self::Vue => "vue",
            Self::Svelte => "svelte",
            Self::Html => "html",
            Self::Css => "css",
            Self::Shell => "shell",
            Self::PowerShell => "powershell",
            Self::Dockerfile => "dockerfile",
            Self::Makefile => "makefile",
            Self::Markdown => "markdown",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Ini => "ini",
            Self::Terraform => "terraform",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true for the six languages the chunker parses with
    /// tree-sitter. Everything else gets a whole-file fallback chunk.
    pub fn has_grammar(&self) -> bool {
        matches!(
            self,
            Self::Go
                | Self::JavaScript
                | Self::TypeScript
                | Self::Python
                | Self::Java
                | Self::Rust
        )
    }

    /// Recognized configuration formats. Whole-file fallback chunks for
    /// these carry kind `config`.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Toml | Self::Yaml | Self::Json | Self::Xml | Self::Ini | Self::Terraform
        )
    }

    /// Shell/docker/make style files. Whole-file fallback chunks for these
    /// carry kind `script`.
    pub fn is_script(&self) -> bool {
        matches!(
            self,
            Self::Shell | Self::PowerShell | Self::Dockerfile | Self::Makefile
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scan output: files and modules
// ---------------------------------------------------------------------------

/// Metadata about a scanned file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the project root.
    pub path: PathBuf,
    /// Detected language.
    pub language: Language,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Last-modified timestamp, when the filesystem reports one.
    pub modified: Option<DateTime<Utc>>,
}

/// The build system a module's manifest belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleType {
    /// `go.mod`
    Go,
    /// `package.json`
    Node,
    /// `Cargo.toml`
    Rust,
    /// `pom.xml`
    JavaMaven,
    /// `build.gradle` / `build.gradle.kts`
    JavaGradle,
    /// `pyproject.toml` / `setup.py`
    Python,
    /// No manifest found; the project root itself.
    Unknown,
}

impl ModuleType {
    /// Returns the module type identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::Node => "node",
            Self::Rust => "rust",
            Self::JavaMaven => "java-maven",
            Self::JavaGradle => "java-gradle",
            Self::Python => "python",
            Self::Unknown => "unknown",
        }
    }
}

/// A subtree of the project demarcated by a build-system manifest.
///
/// Every scanned file belongs to exactly one module: the deepest module
/// whose directory encloses it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// Module name (manifest-declared where parseable, directory name
    /// otherwise).
    pub name: String,
    /// Which build system declared this module.
    pub module_type: ModuleType,
    /// Absolute path of the module directory.
    pub path: PathBuf,
    /// Root-relative path of the manifest file that declared this module.
    /// `None` for the implicit root module.
    pub manifest: Option<PathBuf>,
    /// Files assigned to this module, in scan order.
    pub files: Vec<FileEntry>,
}

/// Result of scanning a project root.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Project name (basename of the root unless overridden).
    pub project: String,
    /// Resolved absolute root path.
    pub root: PathBuf,
    /// All files surviving the ignore rules, in scan order.
    pub files: Vec<FileEntry>,
    /// Detected modules, each owning a disjoint subset of `files`.
    pub modules: Vec<Module>,
}

// ---------------------------------------------------------------------------
// Chunks and atoms
// ---------------------------------------------------------------------------

/// The kind of construct a chunk represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Function or method definition.
    Function,
    /// Class, struct, enum, or impl block.
    Class,
    /// Interface or trait definition.
    Interface,
    /// Type alias or standalone type declaration.
    Type,
    /// Whole-file chunk for source files without extracted declarations.
    Module,
    /// Whole-file chunk for a recognized configuration format.
    Config,
    /// Whole-file chunk for shell/docker/make files.
    Script,
}

impl ChunkKind {
    /// Returns the wire string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Module => "module",
            Self::Config => "config",
            Self::Script => "script",
        }
    }
}

/// A syntactic slice of a source file: one top-level declaration, or the
/// whole file when no declarations were extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Path of the file this chunk came from, relative to the project root.
    pub file: PathBuf,
    /// Declaration name (or the file stem for whole-file chunks).
    pub name: String,
    /// What kind of construct this is.
    pub kind: ChunkKind,
    /// Language of the containing file.
    pub language: Language,
    /// Starting line (1-indexed).
    pub line_start: u32,
    /// Ending line (1-indexed, inclusive).
    pub line_end: u32,
    /// Raw source text of the chunk.
    pub text: String,
    /// Unresolved import/require targets referenced by this chunk.
    pub imports: Vec<String>,
    /// Names of externally visible declarations in this chunk.
    pub exports: Vec<String>,
}

/// The fast-tier LLM summary of one chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    /// Declaration name, inherited from the chunk.
    pub name: String,
    /// Chunk kind, inherited from the chunk.
    pub kind: ChunkKind,
    /// File path, inherited from the chunk.
    pub file: PathBuf,
    /// Starting line (1-indexed), inherited from the chunk.
    pub line_start: u32,
    /// Ending line (1-indexed, inclusive), inherited from the chunk.
    pub line_end: u32,
    /// 1-3 sentence natural-language summary.
    pub summary: String,
    /// The same code with cryptic names expanded and short inline comments.
    pub clarified_code: String,
    /// Import targets, as refined by the model.
    pub imports: Vec<String>,
    /// Exported names, as refined by the model.
    pub exports: Vec<String>,
}

impl Atom {
    /// Stable string identifier used by wiring edges:
    /// `{file-path}::{declaration-name}`. Edges are data, never pointers.
    pub fn id(&self) -> String {
        format!("{}::{}", self.file.display(), self.name)
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One commit touching a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Commit hash.
    pub hash: String,
    /// Author name.
    pub author: String,
    /// ISO-8601 author date.
    pub date: String,
    /// Commit subject line.
    pub message: String,
    /// Pull-request number extracted from the message, if any.
    pub pr: Option<u64>,
}

/// Recent version-control history for one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileHistory {
    /// Path relative to the project root.
    pub path: PathBuf,
    /// Commits, most recent first, bounded by window and cap.
    pub commits: Vec<CommitRecord>,
    /// Deduplicated author names.
    pub authors: Vec<String>,
    /// Commit count, used as a complexity proxy.
    pub churn: usize,
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// How an artifact relates to the codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactCategory {
    /// File-linked (commits, code review threads).
    Signal,
    /// Project-level knowledge (docs, wiki pages).
    Knowledge,
    /// Hybrid.
    Context,
}

/// Whether a source runs once per project or once per module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceScope {
    /// Fetched once for the whole project.
    Project,
    /// Fetched once per detected module.
    Module,
}

/// Universal record produced by an external artifact source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Name of the producing source.
    pub source: String,
    /// Relationship of this artifact to the code.
    pub category: ArtifactCategory,
    /// Identifier, unique within the producing source.
    pub id: String,
    /// Short human-readable title.
    pub title: String,
    /// Free-form body text.
    pub body: String,
    /// Link back to the external system, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Linked file paths, when file-scoped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Module this artifact belongs to, for module-scoped sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// ISO-8601 date, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Author, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Free-form string tags (`type=pr`, etc.).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Deep analysis outputs
// ---------------------------------------------------------------------------

/// A directed dependency edge between two atoms.
///
/// Endpoints are `{file-path}::{declaration-name}` strings (see
/// [`Atom::id`]), never in-memory handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    /// Source atom identifier.
    pub from: String,
    /// Target atom identifier.
    pub to: String,
    /// One-line reason for the edge.
    pub reason: String,
}

/// A business-domain grouping of files within a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    /// Zone name.
    pub name: String,
    /// 1-3 sentence statement of intent.
    pub intent: String,
    /// File paths believed to belong to this zone.
    pub files: Vec<String>,
}

/// Deep-tier analysis result for one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleAnalysis {
    /// Name of the analyzed module. Filled in by the analyzer, not the model.
    #[serde(default)]
    pub module: String,
    /// 1-3 sentence statement of the module's purpose.
    pub module_intent: String,
    /// Dependency edges among the module's atoms.
    #[serde(default)]
    pub wiring: Vec<Dependency>,
    /// Domain groupings of the module's files.
    #[serde(default)]
    pub zones: Vec<Zone>,
}

/// A recurring design pattern observed across modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    /// Pattern name.
    pub name: String,
    /// What the pattern is and where it shows up.
    pub description: String,
    /// Concrete examples, when the model lists them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,
}

/// Cross-module deep analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSynthesis {
    /// Narrative architectural blueprint.
    pub blueprint: String,
    /// Recurring patterns.
    #[serde(default)]
    pub patterns: Vec<PatternRecord>,
}

// ---------------------------------------------------------------------------
// Layers and tiers
// ---------------------------------------------------------------------------

/// The seven named data views written to the memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Per-module atom summaries.
    Atoms,
    /// Per-module file histories.
    History,
    /// Per-module signal artifacts.
    Signals,
    /// Per-module dependency edges.
    Wiring,
    /// Per-module domain zones.
    Zones,
    /// Project-wide architectural narrative.
    Blueprint,
    /// Project-wide recurring patterns.
    Patterns,
}

impl Layer {
    /// All layers, per-module first, project-wide last.
    pub const ALL: [Layer; 7] = [
        Layer::Atoms,
        Layer::History,
        Layer::Signals,
        Layer::Wiring,
        Layer::Zones,
        Layer::Blueprint,
        Layer::Patterns,
    ];

    /// Returns the lowercase layer name used in source tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Atoms => "atoms",
            Self::History => "history",
            Self::Signals => "signals",
            Self::Wiring => "wiring",
            Self::Zones => "zones",
            Self::Blueprint => "blueprint",
            Self::Patterns => "patterns",
        }
    }

    /// True for the layers stored under the `_system` pseudo-module.
    pub fn is_project_wide(&self) -> bool {
        matches!(self, Self::Blueprint | Self::Patterns)
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval size budgets. Each tier is a superset of the one below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// ~5 KB: zones + blueprint.
    Mini,
    /// ~50 KB: mini + atoms + wiring.
    Standard,
    /// ~500 KB: standard + history + signals.
    Full,
}

impl Tier {
    /// The layers retrieved at this tier. Supersets by construction:
    /// mini ⊆ standard ⊆ full.
    pub fn layers(&self) -> &'static [Layer] {
        match self {
            Self::Mini => &[Layer::Zones, Layer::Blueprint],
            Self::Standard => &[Layer::Zones, Layer::Blueprint, Layer::Atoms, Layer::Wiring],
            Self::Full => &[
                Layer::Zones,
                Layer::Blueprint,
                Layer::Atoms,
                Layer::Wiring,
                Layer::History,
                Layer::Signals,
            ],
        }
    }

    /// Returns the tier name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mini => "mini",
            Self::Standard => "standard",
            Self::Full => "full",
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = crate::error::CartoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mini" => Ok(Self::Mini),
            "standard" => Ok(Self::Standard),
            "full" => Ok(Self::Full),
            other => Err(crate::error::CartoError::Config {
                details: format!("invalid tier {other:?} (expected mini, standard, or full)"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_extension("go"), Language::Go);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("kts"), Language::Kotlin);
        assert_eq!(Language::from_extension("xyz"), Language::Unknown);
    }

    #[test]
    fn test_language_from_filename() {
        assert_eq!(Language::from_filename("Dockerfile"), Some(Language::Dockerfile));
        assert_eq!(Language::from_filename("Makefile"), Some(Language::Makefile));
        assert_eq!(Language::from_filename("main.go"), None);
    }

    #[test]
    fn test_grammar_set_is_exactly_six() {
        let with_grammar = [
            Language::Go,
            Language::JavaScript,
            Language::TypeScript,
            Language::Python,
            Language::Java,
            Language::Rust,
        ];
        for lang in with_grammar {
            assert!(lang.has_grammar(), "{lang} should have a grammar");
        }
        assert!(!Language::Cpp.has_grammar());
        assert!(!Language::Unknown.has_grammar());
    }

    #[test]
    fn test_atom_id_format() {
        let atom = Atom {
            name: "ParseConfig".into(),
            kind: ChunkKind::Function,
            file: PathBuf::from("internal/config/load.go"),
            line_start: 10,
            line_end: 42,
            summary: String::new(),
            clarified_code: String::new(),
            imports: vec![],
            exports: vec![],
        };
        assert_eq!(atom.id(), "internal/config/load.go::ParseConfig");
    }

    #[test]
    fn test_tier_monotonicity() {
        let mini: std::collections::HashSet<_> = Tier::Mini.layers().iter().collect();
        let standard: std::collections::HashSet<_> = Tier::Standard.layers().iter().collect();
        let full: std::collections::HashSet<_> = Tier::Full.layers().iter().collect();
        assert!(mini.is_subset(&standard));
        assert!(standard.is_subset(&full));
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!("mini".parse::<Tier>().ok(), Some(Tier::Mini));
        assert_eq!("full".parse::<Tier>().ok(), Some(Tier::Full));
        assert!("huge".parse::<Tier>().is_err());
    }

    #[test]
    fn test_layer_names_closed_set() {
        let names: Vec<&str> = Layer::ALL.iter().map(Layer::as_str).collect();
        assert_eq!(
            names,
            vec!["atoms", "history", "signals", "wiring", "zones", "blueprint", "patterns"]
        );
    }
}
