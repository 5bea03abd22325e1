//! Fast-tier atom analyzer.
//!
//! Turns each chunk into a structured atom (summary, clarified code,
//! imports, exports) through one gateway call per chunk. A per-batch
//! semaphore (default 4) bounds the fan-out independently of the
//! gateway's global bound; the two compose.
//!
//! A chunk that fails analysis is logged and dropped; the batch only
//! fails as a whole on cancellation. Successful atoms come back in chunk
//! input order with no gaps.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{CartoError, CartoResult};
use crate::llm::{CompletionRequest, LlmGateway, ModelTier};
use crate::types::{Atom, Chunk};

/// Completion budget for one atom. Clarified code roughly doubles the
/// input, so this stays generous.
const ATOM_MAX_TOKENS: u32 = 2048;

const ATOM_SYSTEM_PROMPT: &str = "You are a senior engineer summarizing code for a \
semantic index. Reply with a single JSON object and nothing else: no prose, no \
markdown fences. The object has exactly these keys: \"summary\" (1-3 sentences on \
what the code does), \"clarified_code\" (the same code with cryptic names expanded \
and short inline comments added), \"imports\" (array of module/package strings the \
code depends on), \"exports\" (array of names this code exposes to the rest of the \
codebase).";

/// Wire shape of the model's reply for one chunk.
#[derive(Debug, Deserialize)]
struct AtomReply {
    summary: String,
    #[serde(default)]
    clarified_code: String,
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    exports: Vec<String>,
}

/// Batch analyzer for chunks of one file.
pub struct AtomAnalyzer {
    gateway: Arc<LlmGateway>,
    batch_concurrent: usize,
}

impl AtomAnalyzer {
    /// Create an analyzer sharing the given gateway.
    pub fn new(gateway: Arc<LlmGateway>, batch_concurrent: usize) -> Self {
        Self {
            gateway,
            batch_concurrent: batch_concurrent.max(1),
        }
    }

    /// Analyze a batch of chunks.
    ///
    /// Returns the successful atoms (chunk input order, failures
    /// compacted out) together with the per-chunk errors for the run
    /// aggregate. Only cancellation fails the batch itself.
    pub async fn analyze(
        &self,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> CartoResult<(Vec<Atom>, Vec<CartoError>)> {
        let semaphore = Arc::new(Semaphore::new(self.batch_concurrent));

        let tasks = chunks.iter().map(|chunk| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(CartoError::Cancelled),
                    permit = semaphore.acquire_owned() => permit.map_err(|_| {
                        CartoError::Internal("batch semaphore closed".into())
                    })?,
                };
                self.analyze_chunk(chunk, cancel).await
            }
        });

        let results = futures_util::future::join_all(tasks).await;

        let mut atoms = Vec::with_capacity(chunks.len());
        let mut errors = Vec::new();
        for (chunk, result) in chunks.iter().zip(results) {
            match result {
                Ok(atom) => atoms.push(atom),
                Err(CartoError::Cancelled) => return Err(CartoError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        file = %chunk.file.display(),
                        chunk = %chunk.name,
                        error = %e,
                        "atom analysis failed, dropping chunk"
                    );
                    errors.push(e);
                }
            }
        }

        Ok((atoms, errors))
    }

    /// One gateway call for one chunk.
    async fn analyze_chunk(&self, chunk: &Chunk, cancel: &CancellationToken) -> CartoResult<Atom> {
        let request = CompletionRequest {
            system: ATOM_SYSTEM_PROMPT.into(),
            prompt: build_prompt(chunk),
            max_tokens: ATOM_MAX_TOKENS,
            tier: ModelTier::Fast,
        };

        let value = self.gateway.complete_json(&request, cancel).await?;
        let reply: AtomReply = serde_json::from_value(value).map_err(|e| {
            CartoError::JsonExtract {
                message: format!("atom reply for {} malformed: {e}", chunk.name),
            }
        })?;

        Ok(Atom {
            name: chunk.name.clone(),
            kind: chunk.kind,
            file: chunk.file.clone(),
            line_start: chunk.line_start,
            line_end: chunk.line_end,
            summary: reply.summary,
            clarified_code: reply.clarified_code,
            imports: merge_unique(&chunk.imports, reply.imports),
            exports: merge_unique(&chunk.exports, reply.exports),
        })
    }
}

/// User prompt: the declaration's identity plus its raw code.
fn build_prompt(chunk: &Chunk) -> String {
    format!(
        "Declaration `{name}` ({kind}, {language}) from `{file}`, lines {start}-{end}:\n\n{text}",
        name = chunk.name,
        kind = chunk.kind.as_str(),
        language = chunk.language,
        file = chunk.file.display(),
        start = chunk.line_start,
        end = chunk.line_end,
        text = chunk.text,
    )
}

/// Union of syntactic extraction and model output, first-seen order.
fn merge_unique(base: &[String], extra: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = base.to_vec();
    for item in extra {
        if !merged.contains(&item) {
            merged.push(item);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkKind, Language};
    use std::path::PathBuf;

    fn chunk(name: &str) -> Chunk {
        Chunk {
            file: PathBuf::from("src/main.go"),
            name: name.into(),
            kind: ChunkKind::Function,
            language: Language::Go,
            line_start: 3,
            line_end: 9,
            text: "func A() {}".into(),
            imports: vec!["fmt".into()],
            exports: vec![name.into()],
        }
    }

    #[test]
    fn test_prompt_carries_identity_and_code() {
        let prompt = build_prompt(&chunk("A"));
        assert!(prompt.contains("`A`"));
        assert!(prompt.contains("function"));
        assert!(prompt.contains("src/main.go"));
        assert!(prompt.contains("lines 3-9"));
        assert!(prompt.contains("func A() {}"));
    }

    #[test]
    fn test_merge_unique_keeps_order() {
        let merged = merge_unique(
            &["fmt".into(), "os".into()],
            vec!["fmt".into(), "net/http".into()],
        );
        assert_eq!(merged, vec!["fmt", "os", "net/http"]);
    }

    #[test]
    fn test_atom_reply_defaults() {
        let reply: AtomReply =
            serde_json::from_str(r#"{"summary": "does a thing"}"#).expect("parse");
        assert_eq!(reply.summary, "does a thing");
        assert!(reply.clarified_code.is_empty());
        assert!(reply.imports.is_empty());
    }
}
