//! Error types for carto-core.
//!
//! Uses a hierarchical error enum so callers can pattern-match on the
//! component that failed. Display strings carry the component prefix
//! (`scanner: …`, `llm: …`, `store: …`) so aggregated run errors stay
//! attributable after they have been flattened into strings.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all carto-core operations.
#[derive(Debug, Error)]
pub enum CartoError {
    // ---- Fatal (halts the pipeline) ----
    /// The filesystem scan failed. This is the only fatal pipeline error.
    #[error("scanner: {message}")]
    Scan {
        /// Human-readable error description.
        message: String,
    },

    // ---- Configuration (surfaced before the pipeline starts) ----
    /// Missing credential, invalid base URL, invalid tier, etc.
    #[error("config: {details}")]
    Config {
        /// What's wrong with the config.
        details: String,
    },

    // ---- Per-unit transient (unit dropped, run continues) ----
    /// A single file failed to chunk. The rest of the index is fine.
    #[error("chunker: {path}: {message}")]
    Chunk {
        /// Path to the file that failed.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// An LLM request failed: transport, non-2xx status, or a response
    /// missing its text block.
    #[error("llm: {message}")]
    Llm {
        /// Human-readable error description (vendor body included for
        /// non-2xx responses).
        message: String,
    },

    /// The completion text contained no balanced JSON object, or the
    /// extracted substring did not parse.
    #[error("llm: json extraction: {message}")]
    JsonExtract {
        /// Why extraction failed.
        message: String,
    },

    /// A git subprocess failed for one file.
    #[error("history: {path}: {message}")]
    History {
        /// File whose log could not be collected.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    // ---- Per-source transient ----
    /// An artifact source failed; its output is omitted.
    #[error("source {name}: {message}")]
    Source {
        /// Name of the failing source.
        name: String,
        /// Human-readable error description.
        message: String,
    },

    // ---- Per-layer transient ----
    /// A vector-store write or read failed for one (module, layer).
    #[error("store: {message}")]
    Store {
        /// Human-readable error description.
        message: String,
    },

    // ---- Cancellation ----
    /// The run was cancelled by the caller.
    #[error("pipeline: cancelled")]
    Cancelled,

    // ---- Wrapped external errors ----
    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialize: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("internal: {0}")]
    Internal(String),
}

impl CartoError {
    /// Whether this error halts the pipeline (scan failure and
    /// cancellation do; everything else is accumulated).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Scan { .. } | Self::Cancelled)
    }
}

impl From<serde_json::Error> for CartoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience type alias for Results in carto-core.
pub type CartoResult<T> = Result<T, CartoError>;
