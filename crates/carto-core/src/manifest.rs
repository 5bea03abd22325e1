//! Incremental-reindex manifest.
//!
//! A project-scoped sidecar at `{root}/.carto/manifest.json` records the
//! content hash, size, and index time of every file the last run touched.
//! Classifying the current tree against it yields the added/modified/
//! removed/unchanged sets that drive incremental runs.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CartoError, CartoResult};

/// Manifest schema version. Bump when the sidecar shape changes.
const MANIFEST_VERSION: &str = "1.0";

/// Per-file entry in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// SHA-256 hex of the file bytes at index time.
    pub hash: String,
    /// File size in bytes at index time.
    pub size: u64,
    /// When this file was last indexed.
    pub indexed_at: DateTime<Utc>,
}

/// The project sidecar tracking what has been indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version.
    pub version: String,
    /// Project name.
    pub project: String,
    /// Timestamp of the last successful run.
    pub indexed_at: DateTime<Utc>,
    /// Map from root-relative path to its last-indexed state.
    pub files: BTreeMap<String, ManifestEntry>,
    /// Map from manifest-file path to the resolved module name. Manifest
    /// names can differ from their directory (go.mod module directives,
    /// package.json names), and once a manifest file is deleted the name
    /// is no longer derivable from disk; this map lets remnant cleanup
    /// target the module's real store tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modules: BTreeMap<String, String>,
}

/// Partition of `prior ∪ current` paths produced by [`Manifest::classify`].
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Present only in the current tree.
    pub added: Vec<PathBuf>,
    /// Present in both with differing content hashes.
    pub modified: Vec<PathBuf>,
    /// Present only in the prior manifest.
    pub removed: Vec<PathBuf>,
    /// Present in both with identical hashes.
    pub unchanged: Vec<PathBuf>,
}

impl Manifest {
    /// Create an empty manifest for a project.
    pub fn new(project: &str) -> Self {
        Self {
            version: MANIFEST_VERSION.into(),
            project: project.into(),
            indexed_at: Utc::now(),
            files: BTreeMap::new(),
            modules: BTreeMap::new(),
        }
    }

    /// Sidecar path for a project root.
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(".carto").join("manifest.json")
    }

    /// Load the manifest from `{root}/.carto/manifest.json`.
    ///
    /// A missing sidecar yields an empty manifest (first run). A corrupt
    /// sidecar is an error; callers may choose to force a full run instead.
    pub fn load(root: &Path, project: &str) -> CartoResult<Self> {
        let path = Self::path_for(root);
        if !path.exists() {
            return Ok(Self::new(project));
        }

        let content = std::fs::read_to_string(&path)?;
        let manifest: Manifest = serde_json::from_str(&content).map_err(|e| {
            CartoError::Serialization(format!("manifest at {}: {e}", path.display()))
        })?;
        Ok(manifest)
    }

    /// Persist the manifest, stamping `indexed_at` with the current time.
    ///
    /// Writes through a temp file and renames so a crash never leaves a
    /// half-written sidecar.
    pub fn save(&mut self, root: &Path) -> CartoResult<()> {
        self.indexed_at = Utc::now();

        let path = Self::path_for(root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &path)?;

        tracing::debug!(path = %path.display(), files = self.files.len(), "manifest saved");
        Ok(())
    }

    /// Classify current file hashes against the recorded state.
    ///
    /// The four returned sets partition `prior_paths ∪ current_paths`.
    pub fn classify(&self, current: &HashMap<PathBuf, String>) -> Classification {
        let mut result = Classification::default();

        for (path, hash) in current {
            match self.files.get(&path_key(path)) {
                Some(entry) if entry.hash == *hash => result.unchanged.push(path.clone()),
                Some(_) => result.modified.push(path.clone()),
                None => result.added.push(path.clone()),
            }
        }

        for key in self.files.keys() {
            let path = PathBuf::from(key);
            if !current.contains_key(&path) {
                result.removed.push(path);
            }
        }

        result.added.sort();
        result.modified.sort();
        result.removed.sort();
        result.unchanged.sort();
        result
    }

    /// Record a file's current state, keeping the existing entry (and its
    /// timestamp) when the hash is unchanged.
    pub fn record(&mut self, path: &Path, hash: &str, size: u64) {
        if let Some(entry) = self.files.get(&path_key(path)) {
            if entry.hash == hash {
                return;
            }
        }
        self.update_file(path, hash, size);
    }

    /// Record a file as indexed with the given hash and size.
    pub fn update_file(&mut self, path: &Path, hash: &str, size: u64) {
        self.files.insert(
            path_key(path),
            ManifestEntry {
                hash: hash.into(),
                size,
                indexed_at: Utc::now(),
            },
        );
    }

    /// Drop a file from the manifest after its records were removed.
    pub fn remove_file(&mut self, path: &Path) {
        self.files.remove(&path_key(path));
    }

    /// Record the resolved name of the module a manifest file declares.
    pub fn record_module(&mut self, manifest_path: &Path, name: &str) {
        self.modules.insert(path_key(manifest_path), name.into());
    }

    /// Look up the module name recorded for a manifest file.
    pub fn module_for_manifest(&self, manifest_path: &Path) -> Option<&str> {
        self.modules.get(&path_key(manifest_path)).map(String::as_str)
    }

    /// Drop a module mapping once its manifest file is gone.
    pub fn remove_module(&mut self, manifest_path: &Path) {
        self.modules.remove(&path_key(manifest_path));
    }
}

/// Manifest keys are forward-slash relative paths regardless of platform.
fn path_key(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        raw.into_owned()
    } else {
        raw.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// SHA-256 hex of file content, the manifest's change-detection hash.
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
