//! Filesystem scanner and module detector.
//!
//! Walks the project tree, applies ignore rules, classifies files by
//! language, and groups them into modules demarcated by build-system
//! manifests. The scan is the first pipeline phase and the only one whose
//! failure is fatal.
//!
//! ## Ignore rules
//!
//! A `.gitignore` at the root (standard gitignore grammar: `*`, `**`, `?`,
//! `!` negation, trailing `/`, leading `/`) is honored even when the tree is
//! not a git repository. On top of that, a built-in set of directories and
//! lock files is always skipped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;

use crate::error::{CartoError, CartoResult};
use crate::types::{FileEntry, Language, Module, ModuleType, ScanResult};

/// Directories never traversed, regardless of ignore files.
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "__pycache__",
    "vendor",
    "dist",
    "build",
    ".carto",
    "target",
    ".next",
    ".cache",
];

/// Files never indexed: lock files carry no semantic content worth an atom.
const SKIP_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Gemfile.lock",
    "Cargo.lock",
    "go.sum",
    "composer.lock",
];

/// Build-manifest filenames, checked in this order when a directory holds
/// more than one.
const MANIFEST_NAMES: &[(&str, ModuleType)] = &[
    ("go.mod", ModuleType::Go),
    ("Cargo.toml", ModuleType::Rust),
    ("package.json", ModuleType::Node),
    ("pom.xml", ModuleType::JavaMaven),
    ("build.gradle", ModuleType::JavaGradle),
    ("build.gradle.kts", ModuleType::JavaGradle),
    ("pyproject.toml", ModuleType::Python),
    ("setup.py", ModuleType::Python),
];

/// Whether a filename is one of the recognized build manifests.
pub(crate) fn is_manifest_file(name: &str) -> bool {
    MANIFEST_NAMES.iter().any(|(m, _)| *m == name)
}

/// Scan a project root.
///
/// The project name defaults to the basename of the resolved root.
pub fn scan(root: &Path) -> CartoResult<ScanResult> {
    scan_named(root, None)
}

/// Scan a project root with an explicit project name.
pub fn scan_named(root: &Path, project: Option<&str>) -> CartoResult<ScanResult> {
    let root = std::fs::canonicalize(root).map_err(|e| CartoError::Scan {
        message: format!("cannot resolve root {}: {e}", root.display()),
    })?;

    let project = project
        .map(str::to_string)
        .or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "project".into());

    let files = walk_files(&root)?;
    let modules = detect_modules(&root, &project, &files);

    tracing::info!(
        project = %project,
        files = files.len(),
        modules = modules.len(),
        "scan complete"
    );

    Ok(ScanResult {
        project,
        root,
        files,
        modules,
    })
}

/// Walk the tree and collect surviving files with language + size.
fn walk_files(root: &Path) -> CartoResult<Vec<FileEntry>> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .require_git(false)
        .git_global(false)
        .git_exclude(false)
        .follow_links(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                !SKIP_DIRS.contains(&name.as_ref())
            } else {
                !SKIP_FILES.contains(&name.as_ref())
            }
        });

    let mut files = Vec::new();
    for result in builder.build() {
        let entry = result.map_err(|e| CartoError::Scan {
            message: format!("walk error under {}: {e}", root.display()),
        })?;

        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|e| CartoError::Scan {
                message: format!("path {} escapes root: {e}", path.display()),
            })?
            .to_path_buf();

        let metadata = entry.metadata().map_err(|e| CartoError::Scan {
            message: format!("stat {}: {e}", path.display()),
        })?;

        let modified: Option<DateTime<Utc>> =
            metadata.modified().ok().map(DateTime::<Utc>::from);

        files.push(FileEntry {
            language: detect_language(&relative),
            size_bytes: metadata.len(),
            modified,
            path: relative,
        });
    }

    Ok(files)
}

/// Primary detection by extension, secondary by exact filename. Unmapped
/// files stay in the list as `unknown`.
fn detect_language(path: &Path) -> Language {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let lang = Language::from_extension(&ext.to_ascii_lowercase());
        if lang != Language::Unknown {
            return lang;
        }
    }

    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(Language::from_filename)
        .unwrap_or(Language::Unknown)
}

/// Detect modules from manifest files and assign every file to the deepest
/// enclosing module.
///
/// When no manifest exists, or when some file is not enclosed by any
/// manifest directory, an implicit root module (type `unknown`, named after
/// the project) picks up the remainder so every file has exactly one owner.
fn detect_modules(root: &Path, project: &str, files: &[FileEntry]) -> Vec<Module> {
    // One manifest per directory, first match in MANIFEST_NAMES order wins.
    let mut manifest_dirs: HashMap<PathBuf, (ModuleType, PathBuf)> = HashMap::new();
    for (name, module_type) in MANIFEST_NAMES {
        for file in files {
            if file.path.file_name().and_then(|n| n.to_str()) == Some(*name) {
                let dir = file.path.parent().unwrap_or(Path::new("")).to_path_buf();
                manifest_dirs
                    .entry(dir)
                    .or_insert((*module_type, file.path.clone()));
            }
        }
    }

    // Deepest first, so the first prefix match is the deepest enclosure.
    let mut detected: Vec<(PathBuf, ModuleType, PathBuf)> = manifest_dirs
        .into_iter()
        .map(|(dir, (ty, manifest))| (dir, ty, manifest))
        .collect();
    detected.sort_by(|a, b| {
        b.0.components()
            .count()
            .cmp(&a.0.components().count())
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut modules: Vec<Module> = detected
        .iter()
        .map(|(dir, ty, manifest)| Module {
            name: module_name(root, dir, *ty, manifest),
            module_type: *ty,
            path: root.join(dir),
            manifest: Some(manifest.clone()),
            files: Vec::new(),
        })
        .collect();

    let mut orphans: Vec<FileEntry> = Vec::new();
    for file in files {
        let owner = detected
            .iter()
            .position(|(dir, _, _)| dir.as_os_str().is_empty() || file.path.starts_with(dir));
        match owner {
            Some(i) => modules[i].files.push(file.clone()),
            None => orphans.push(file.clone()),
        }
    }

    if modules.is_empty() || !orphans.is_empty() {
        modules.push(Module {
            name: project.into(),
            module_type: ModuleType::Unknown,
            path: root.to_path_buf(),
            manifest: None,
            files: orphans,
        });
    }

    modules
}

/// Parse a module name from its manifest where straightforward, falling
/// back to the directory name.
fn module_name(root: &Path, dir: &Path, ty: ModuleType, manifest: &Path) -> String {
    let fallback = || {
        let d = if dir.as_os_str().is_empty() { root } else { dir };
        d.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".into())
    };

    let content = match std::fs::read_to_string(root.join(manifest)) {
        Ok(c) => c,
        Err(_) => return fallback(),
    };

    let parsed = match ty {
        ModuleType::Go => parse_go_mod_name(&content),
        ModuleType::Node => parse_package_json_name(&content),
        ModuleType::Rust => parse_cargo_toml_name(&content),
        ModuleType::Python => parse_pyproject_name(&content),
        ModuleType::JavaMaven | ModuleType::JavaGradle | ModuleType::Unknown => None,
    };

    parsed.unwrap_or_else(fallback)
}

/// `module example.com/foo/bar` -> `bar`.
fn parse_go_mod_name(content: &str) -> Option<String> {
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("module ") {
            let module_path = rest.trim().trim_matches('"');
            return module_path.rsplit('/').next().map(str::to_string);
        }
    }
    None
}

fn parse_package_json_name(content: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    value.get("name")?.as_str().map(str::to_string)
}

fn parse_cargo_toml_name(content: &str) -> Option<String> {
    let value: toml::Value = toml::from_str(content).ok()?;
    value
        .get("package")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

fn parse_pyproject_name(content: &str) -> Option<String> {
    let value: toml::Value = toml::from_str(content).ok()?;
    value
        .get("project")
        .and_then(|p| p.get("name"))
        .or_else(|| {
            value
                .get("tool")
                .and_then(|t| t.get("poetry"))
                .and_then(|p| p.get("name"))
        })
        .and_then(|n| n.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, content).expect("write");
    }

    #[test]
    fn test_scan_empty_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let result = scan(dir.path()).expect("scan");
        assert!(result.files.is_empty());
        // Even an empty tree gets the implicit root module.
        assert_eq!(result.modules.len(), 1);
        assert_eq!(result.modules[0].module_type, ModuleType::Unknown);
    }

    #[test]
    fn test_scan_missing_root_is_fatal() {
        let result = scan(Path::new("/nonexistent/carto-test-root"));
        assert!(matches!(result, Err(CartoError::Scan { .. })));
    }

    #[test]
    fn test_single_go_module() {
        let dir = tempfile::tempdir().expect("create temp dir");
        write(dir.path(), "go.mod", "module example.com/m\n\ngo 1.22\n");
        write(dir.path(), "main.go", "package main\n\nfunc main() {}\n");

        let result = scan(dir.path()).expect("scan");
        assert_eq!(result.modules.len(), 1);
        assert_eq!(result.modules[0].name, "m");
        assert_eq!(result.modules[0].module_type, ModuleType::Go);
        assert_eq!(result.modules[0].manifest.as_deref(), Some(Path::new("go.mod")));
        assert_eq!(result.modules[0].files.len(), 2);
    }

    #[test]
    fn test_deepest_module_wins() {
        let dir = tempfile::tempdir().expect("create temp dir");
        write(dir.path(), "go.mod", "module example.com/outer\n");
        write(dir.path(), "inner/go.mod", "module example.com/outer/inner\n");
        write(dir.path(), "inner/lib.go", "package inner\n");
        write(dir.path(), "main.go", "package main\n");

        let result = scan(dir.path()).expect("scan");
        let inner = result
            .modules
            .iter()
            .find(|m| m.name == "inner")
            .expect("inner module");
        assert!(inner.files.iter().any(|f| f.path == Path::new("inner/lib.go")));

        let outer = result
            .modules
            .iter()
            .find(|m| m.name == "outer")
            .expect("outer module");
        assert!(outer.files.iter().any(|f| f.path == Path::new("main.go")));
        assert!(!outer.files.iter().any(|f| f.path.starts_with("inner")));
    }

    #[test]
    fn test_every_file_has_exactly_one_module() {
        let dir = tempfile::tempdir().expect("create temp dir");
        write(dir.path(), "a/go.mod", "module example.com/a\n");
        write(dir.path(), "a/main.go", "package main\n");
        write(dir.path(), "b/package.json", "{\"name\": \"b-app\"}\n");
        write(dir.path(), "b/index.js", "module.exports = {};\n");
        write(dir.path(), "README.md", "# readme\n");

        let result = scan(dir.path()).expect("scan");
        for file in &result.files {
            let owners = result
                .modules
                .iter()
                .filter(|m| m.files.iter().any(|f| f.path == file.path))
                .count();
            assert_eq!(owners, 1, "{} should have one owner", file.path.display());
        }

        // The README is not enclosed by a manifest dir: it lands in the
        // implicit root module.
        let root_module = result
            .modules
            .iter()
            .find(|m| m.module_type == ModuleType::Unknown)
            .expect("root module");
        assert!(root_module
            .files
            .iter()
            .any(|f| f.path == Path::new("README.md")));
        assert!(root_module.manifest.is_none());
    }

    #[test]
    fn test_node_module_name_from_package_json() {
        let dir = tempfile::tempdir().expect("create temp dir");
        write(dir.path(), "package.json", "{\"name\": \"web-frontend\"}\n");
        write(dir.path(), "index.js", "console.log(1);\n");

        let result = scan(dir.path()).expect("scan");
        assert_eq!(result.modules[0].name, "web-frontend");
        assert_eq!(result.modules[0].module_type, ModuleType::Node);
    }

    #[test]
    fn test_gitignore_honored_without_git_repo() {
        let dir = tempfile::tempdir().expect("create temp dir");
        write(dir.path(), ".gitignore", "*.log\ngenerated/\n!keep.log\n");
        write(dir.path(), "app.py", "x = 1\n");
        write(dir.path(), "debug.log", "noise\n");
        write(dir.path(), "keep.log", "kept\n");
        write(dir.path(), "generated/out.py", "y = 2\n");

        let result = scan(dir.path()).expect("scan");
        let paths: Vec<&Path> = result.files.iter().map(|f| f.path.as_path()).collect();
        assert!(paths.contains(&Path::new("app.py")));
        assert!(paths.contains(&Path::new("keep.log")));
        assert!(!paths.contains(&Path::new("debug.log")));
        assert!(!paths.iter().any(|p| p.starts_with("generated")));
    }

    #[test]
    fn test_builtin_skips() {
        let dir = tempfile::tempdir().expect("create temp dir");
        write(dir.path(), "src/lib.rs", "pub fn f() {}\n");
        write(dir.path(), "node_modules/pkg/index.js", "x\n");
        write(dir.path(), "target/debug/out", "bin\n");
        write(dir.path(), "Cargo.lock", "# lock\n");
        write(dir.path(), ".carto/manifest.json", "{}\n");

        let result = scan(dir.path()).expect("scan");
        let paths: Vec<&Path> = result.files.iter().map(|f| f.path.as_path()).collect();
        assert_eq!(paths, vec![Path::new("src/lib.rs")]);
    }

    #[test]
    fn test_unknown_files_still_listed() {
        let dir = tempfile::tempdir().expect("create temp dir");
        write(dir.path(), "data.bin", "blob");
        write(dir.path(), "Dockerfile", "FROM alpine\n");

        let result = scan(dir.path()).expect("scan");
        let bin = result
            .files
            .iter()
            .find(|f| f.path == Path::new("data.bin"))
            .expect("data.bin listed");
        assert_eq!(bin.language, Language::Unknown);

        let docker = result
            .files
            .iter()
            .find(|f| f.path == Path::new("Dockerfile"))
            .expect("Dockerfile listed");
        assert_eq!(docker.language, Language::Dockerfile);
    }

    #[test]
    fn test_manifest_name_parsers() {
        assert_eq!(
            parse_go_mod_name("module github.com/acme/widget\n"),
            Some("widget".into())
        );
        assert_eq!(
            parse_package_json_name("{\"name\": \"@acme/widget\"}"),
            Some("@acme/widget".into())
        );
        assert_eq!(
            parse_cargo_toml_name("[package]\nname = \"widget\"\nversion = \"0.1.0\"\n"),
            Some("widget".into())
        );
        assert_eq!(
            parse_pyproject_name("[project]\nname = \"widget\"\n"),
            Some("widget".into())
        );
        assert_eq!(
            parse_pyproject_name("[tool.poetry]\nname = \"poetry-widget\"\n"),
            Some("poetry-widget".into())
        );
    }
}
