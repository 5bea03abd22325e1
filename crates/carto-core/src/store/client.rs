//! HTTP client for the external vector-memory service.
//!
//! Thin shim over the service's wire API: add, add-batch, list-by-source,
//! hybrid search, delete, health. Every request carries JSON and, when
//! configured, the `X-API-Key` header. Request bodies and paths match the
//! service contract exactly; everything smarter lives in the adapter.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::StoreConfig;
use crate::error::{CartoError, CartoResult};

/// Records per add-batch request.
const BATCH_SIZE: usize = 500;

/// A memory to be written.
#[derive(Debug, Clone, Serialize)]
pub struct NewMemory {
    /// Payload text.
    pub text: String,
    /// Structured source tag.
    pub source: String,
    /// Optional metadata object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A stored memory returned by list-by-source.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryRecord {
    /// Record id.
    #[serde(default)]
    pub id: String,
    /// Payload text.
    #[serde(default)]
    pub text: String,
    /// Source tag.
    #[serde(default)]
    pub source: String,
    /// Metadata object, when stored.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// A search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    /// Record id.
    #[serde(default)]
    pub id: String,
    /// Payload text.
    #[serde(default)]
    pub text: String,
    /// Relevance score.
    #[serde(default)]
    pub score: f64,
    /// Source tag.
    #[serde(default)]
    pub source: String,
    /// Metadata object, when stored.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    memories: Vec<MemoryRecord>,
}

/// Vector-memory service client.
pub struct MemoryClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl MemoryClient {
    /// Build a client from store configuration.
    pub fn new(config: &StoreConfig) -> CartoResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CartoError::Store {
                message: format!("HTTP client construction failed: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// `POST /memory/add`.
    pub async fn add(
        &self,
        memory: &NewMemory,
        deduplicate: bool,
        cancel: &CancellationToken,
    ) -> CartoResult<String> {
        let body = serde_json::json!({
            "text": memory.text,
            "source": memory.source,
            "metadata": memory.metadata,
            "deduplicate": deduplicate,
        });
        let response = self
            .send(self.http.post(self.url("/memory/add")).json(&body), cancel)
            .await?;
        let parsed: AddResponse = parse_body(response).await?;
        Ok(parsed.id)
    }

    /// `POST /memory/add-batch`, chunked at the fixed batch size.
    pub async fn add_batch(
        &self,
        memories: &[NewMemory],
        deduplicate: bool,
        cancel: &CancellationToken,
    ) -> CartoResult<()> {
        for chunk in memories.chunks(BATCH_SIZE) {
            let body = serde_json::json!({
                "memories": chunk,
                "deduplicate": deduplicate,
            });
            self.send(
                self.http.post(self.url("/memory/add-batch")).json(&body),
                cancel,
            )
            .await?;
        }
        Ok(())
    }

    /// `GET /memories?source=<tag>&limit=<n>` (exact-tag listing).
    pub async fn list_by_source(
        &self,
        source: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> CartoResult<Vec<MemoryRecord>> {
        let request = self
            .http
            .get(self.url("/memories"))
            .query(&[("source", source), ("limit", &limit.to_string())]);
        let response = self.send(request, cancel).await?;
        let parsed: ListResponse = parse_body(response).await?;
        Ok(parsed.memories)
    }

    /// `POST /search` (hybrid lexical + semantic), optionally constrained
    /// by a source-tag prefix.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        hybrid: bool,
        source_prefix: Option<&str>,
        cancel: &CancellationToken,
    ) -> CartoResult<Vec<SearchHit>> {
        let mut body = serde_json::json!({
            "query": query,
            "k": k,
            "hybrid": hybrid,
        });
        if let Some(prefix) = source_prefix {
            body["source"] = serde_json::Value::String(prefix.to_string());
        }
        let response = self
            .send(self.http.post(self.url("/search")).json(&body), cancel)
            .await?;
        let parsed: SearchResponse = parse_body(response).await?;
        Ok(parsed.results)
    }

    /// `DELETE /memory/{id}`.
    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> CartoResult<()> {
        self.send(
            self.http.delete(self.url(&format!("/memory/{id}"))),
            cancel,
        )
        .await?;
        Ok(())
    }

    /// `GET /health`. True when the service answers 2xx.
    pub async fn health(&self, cancel: &CancellationToken) -> bool {
        let request = self.http.get(self.url("/health"));
        matches!(self.send(request, cancel).await, Ok(_))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Attach headers, send with cancellation, check the status.
    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> CartoResult<reqwest::Response> {
        let builder = match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        };

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CartoError::Cancelled),
            result = builder.send() => result.map_err(|e| CartoError::Store {
                message: format!("request failed: {e}"),
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CartoError::Store {
                message: format!("HTTP {status}: {body}"),
            });
        }

        Ok(response)
    }
}

async fn parse_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> CartoResult<T> {
    response.json().await.map_err(|e| CartoError::Store {
        message: format!("response body malformed: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join() {
        let client = MemoryClient::new(&StoreConfig {
            base_url: "http://localhost:8900/".into(),
            ..StoreConfig::default()
        })
        .expect("client");
        assert_eq!(client.url("/memory/add"), "http://localhost:8900/memory/add");
    }

    #[test]
    fn test_new_memory_serialization_omits_empty_metadata() {
        let memory = NewMemory {
            text: "t".into(),
            source: "carto/p/m/layer:atoms".into(),
            metadata: None,
        };
        let json = serde_json::to_string(&memory).expect("serialize");
        assert!(!json.contains("metadata"));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_store_error() {
        let client = MemoryClient::new(&StoreConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
            ..StoreConfig::default()
        })
        .expect("client");
        let cancel = CancellationToken::new();
        let err = client
            .list_by_source("carto/p/m/layer:atoms", 10, &cancel)
            .await
            .expect_err("unreachable");
        assert!(err.to_string().starts_with("store: "));
    }
}
