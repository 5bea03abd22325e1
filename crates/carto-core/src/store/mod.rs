//! Layered storage adapter.
//!
//! Serializes each index layer to a single textual payload and writes it
//! to the vector-memory service under a structured source tag:
//!
//! ```text
//! carto/{project}/{module}/layer:{layer}
//! ```
//!
//! `{module}` is the literal `_system` for the two project-wide layers.
//! Reads come back either by exact tag (layer retrieval), by tier
//! (composed layer retrievals with a per-layer cap), or by free-form
//! hybrid search scoped with a source-tag prefix.

pub mod client;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::CartoResult;
use crate::types::{Layer, Tier};

pub use client::{MemoryClient, MemoryRecord, NewMemory, SearchHit};

/// Module segment for project-wide layers.
pub const SYSTEM_MODULE: &str = "_system";

/// Payloads above this are truncated at the last line boundary.
const MAX_PAYLOAD_CHARS: usize = 49_000;

/// Per-layer cap on tier retrieval results.
const LAYER_RESULT_CAP: usize = 200;

/// One layer's records in a tier retrieval.
#[derive(Debug, Clone)]
pub struct LayerRecords {
    /// Which layer these records belong to.
    pub layer: Layer,
    /// The matching records, at most [`LAYER_RESULT_CAP`] per layer.
    pub records: Vec<SearchHit>,
}

/// Storage adapter over the memory client.
pub struct StorageAdapter {
    client: MemoryClient,
}

impl StorageAdapter {
    /// Wrap a memory client.
    pub fn new(client: MemoryClient) -> Self {
        Self { client }
    }

    /// Build the source tag for a (project, module, layer) triple.
    ///
    /// Project and module names are flattened so the tag always has
    /// exactly four `/`-separated segments.
    pub fn source_tag(project: &str, module: Option<&str>, layer: Layer) -> String {
        format!(
            "carto/{}/{}/layer:{}",
            sanitize_segment(project),
            module.map_or_else(|| SYSTEM_MODULE.to_string(), sanitize_segment),
            layer.as_str()
        )
    }

    /// Serialize a structured layer as JSON and write it.
    pub async fn write_json_layer<T: Serialize>(
        &self,
        project: &str,
        module: Option<&str>,
        layer: Layer,
        value: &T,
        cancel: &CancellationToken,
    ) -> CartoResult<()> {
        let payload = serde_json::to_string_pretty(value)?;
        self.write_text_layer(project, module, layer, &payload, cancel)
            .await
    }

    /// Write a textual layer payload (the blueprint is a plain string).
    ///
    /// Prior records under the tag are cleared first, so each (module,
    /// layer) holds exactly one record reflecting the current state
    /// rather than an append history of partial writes.
    pub async fn write_text_layer(
        &self,
        project: &str,
        module: Option<&str>,
        layer: Layer,
        payload: &str,
        cancel: &CancellationToken,
    ) -> CartoResult<()> {
        self.clear_layer(project, module, layer, cancel).await?;

        let source = Self::source_tag(project, module, layer);
        let text = truncate_payload(payload);

        let memory = NewMemory {
            text,
            source: source.clone(),
            metadata: Some(serde_json::json!({
                "project": project,
                "module": module.unwrap_or(SYSTEM_MODULE),
                "layer": layer.as_str(),
            })),
        };

        self.client.add_batch(&[memory], false, cancel).await?;
        tracing::debug!(source = %source, bytes = payload.len(), "layer written");
        Ok(())
    }

    /// Delete every record under one (project, module, layer) tag. Runs
    /// before every layer write, when a module's files were all removed,
    /// and on forced re-index.
    pub async fn clear_layer(
        &self,
        project: &str,
        module: Option<&str>,
        layer: Layer,
        cancel: &CancellationToken,
    ) -> CartoResult<usize> {
        let source = Self::source_tag(project, module, layer);
        let records = self
            .client
            .list_by_source(&source, LAYER_RESULT_CAP, cancel)
            .await?;

        let mut deleted = 0;
        for record in &records {
            if record.id.is_empty() {
                continue;
            }
            self.client.delete(&record.id, cancel).await?;
            deleted += 1;
        }

        if deleted > 0 {
            tracing::debug!(source = %source, deleted, "layer cleared");
        }
        Ok(deleted)
    }

    /// Clear every per-module layer for one module.
    pub async fn clear_module(
        &self,
        project: &str,
        module: &str,
        cancel: &CancellationToken,
    ) -> CartoResult<()> {
        for layer in Layer::ALL {
            if layer.is_project_wide() {
                continue;
            }
            self.clear_layer(project, Some(module), layer, cancel).await?;
        }
        Ok(())
    }

    /// List all records under one exact source tag.
    pub async fn retrieve_layer(
        &self,
        project: &str,
        module: Option<&str>,
        layer: Layer,
        cancel: &CancellationToken,
    ) -> CartoResult<Vec<MemoryRecord>> {
        let source = Self::source_tag(project, module, layer);
        self.client
            .list_by_source(&source, LAYER_RESULT_CAP, cancel)
            .await
    }

    /// Tier retrieval: compose per-layer hybrid searches scoped to the
    /// project (and optionally one module), capped per layer.
    ///
    /// The cap applies per layer. Where the layer's tag is fully known
    /// (project-wide layers, or per-module layers with a module filter)
    /// the exact tag doubles as the search prefix, so the store's `k`
    /// budget is spent on that layer alone. Without a module filter the
    /// candidate set is widened before filtering, so records from other
    /// layers cannot crowd a layer out of its cap.
    ///
    /// The layer sets are supersets by construction: mini ⊆ standard ⊆ full.
    pub async fn retrieve_by_tier(
        &self,
        project: &str,
        module: Option<&str>,
        query: &str,
        tier: Tier,
        cancel: &CancellationToken,
    ) -> CartoResult<Vec<LayerRecords>> {
        let mut bundles = Vec::with_capacity(tier.layers().len());
        for &layer in tier.layers() {
            // Project-wide layers always live under _system, regardless of
            // any module filter.
            let tag_module = if layer.is_project_wide() { None } else { module };

            let (prefix, k) = match (tag_module, layer.is_project_wide()) {
                (Some(m), _) => (Self::source_tag(project, Some(m), layer), LAYER_RESULT_CAP),
                (None, true) => (Self::source_tag(project, None, layer), LAYER_RESULT_CAP),
                (None, false) => (
                    format!("carto/{}/", sanitize_segment(project)),
                    LAYER_RESULT_CAP * Layer::ALL.len(),
                ),
            };

            let hits = self.client.search(query, k, true, Some(&prefix), cancel).await?;
            let suffix = format!("/layer:{}", layer.as_str());
            let records: Vec<SearchHit> = hits
                .into_iter()
                .filter(|hit| hit.source.ends_with(&suffix))
                .take(LAYER_RESULT_CAP)
                .collect();
            bundles.push(LayerRecords { layer, records });
        }

        Ok(bundles)
    }

    /// Free-form hybrid search, bypassing tiers. The optional project
    /// scopes results with a source-tag prefix.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        project: Option<&str>,
        cancel: &CancellationToken,
    ) -> CartoResult<Vec<SearchHit>> {
        let prefix = project.map(|p| format!("carto/{}/", sanitize_segment(p)));
        self.client
            .search(query, k, true, prefix.as_deref(), cancel)
            .await
    }

    /// Probe the service.
    pub async fn health(&self, cancel: &CancellationToken) -> bool {
        self.client.health(cancel).await
    }
}

/// Keep tag segments free of `/` so every tag has exactly four segments.
fn sanitize_segment(segment: &str) -> String {
    segment.replace('/', "-")
}

/// Cut oversized payloads at the last line boundary under the ceiling.
fn truncate_payload(payload: &str) -> String {
    if payload.len() <= MAX_PAYLOAD_CHARS {
        return payload.to_string();
    }

    let mut end = MAX_PAYLOAD_CHARS;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    let head = &payload[..end];
    let cut = head.rfind('\n').unwrap_or(end);
    tracing::warn!(
        original = payload.len(),
        truncated = cut,
        "layer payload exceeded ceiling, truncated at line boundary"
    );
    head[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_tag_shape() {
        let tag = StorageAdapter::source_tag("carto", Some("core"), Layer::Atoms);
        assert_eq!(tag, "carto/carto/core/layer:atoms");

        let system = StorageAdapter::source_tag("carto", None, Layer::Blueprint);
        assert_eq!(system, "carto/carto/_system/layer:blueprint");
    }

    #[test]
    fn test_source_tag_matches_contract_regex() {
        let re = regex::Regex::new(
            r"^carto/[^/]+/[^/]+/layer:(atoms|history|signals|wiring|zones|blueprint|patterns)$",
        )
        .expect("regex");

        for layer in Layer::ALL {
            let module = if layer.is_project_wide() { None } else { Some("api") };
            let tag = StorageAdapter::source_tag("my-project", module, layer);
            assert!(re.is_match(&tag), "tag {tag} should match");
        }
    }

    #[test]
    fn test_source_tag_flattens_scoped_names() {
        let tag = StorageAdapter::source_tag("proj", Some("@acme/web"), Layer::Zones);
        assert_eq!(tag, "carto/proj/@acme-web/layer:zones");
        assert_eq!(tag.split('/').count(), 4);
    }

    #[test]
    fn test_truncate_short_payload_untouched() {
        assert_eq!(truncate_payload("short"), "short");
    }

    #[test]
    fn test_truncate_cuts_at_line_boundary() {
        let line = "x".repeat(99);
        let payload = format!("{line}\n").repeat(600); // 60k chars
        let truncated = truncate_payload(&payload);
        assert!(truncated.len() <= MAX_PAYLOAD_CHARS);
        assert!(truncated.ends_with(&line));
        assert!(!truncated.ends_with('\n'));
    }

    #[test]
    fn test_layer_cap_constant_sane() {
        assert!(LAYER_RESULT_CAP > 0);
        assert!(MAX_PAYLOAD_CHARS == 49_000);
    }
}
