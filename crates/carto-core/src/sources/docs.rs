//! Built-in documentation fetcher.
//!
//! Project-scoped: fetches the URLs listed under the `docs` source in
//! `.carto/sources.yaml` (`urls`, comma-joined) and emits one `knowledge`
//! artifact per page. A page that fails to fetch is skipped with a
//! warning; only a completely failed configuration surfaces an error.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CartoError, CartoResult};
use crate::types::{Artifact, ArtifactCategory, SourceScope};

use super::{ArtifactSource, FetchContext};

/// Per-page fetch timeout.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Bodies larger than this are cut at the last line boundary.
const MAX_BODY_CHARS: usize = 20_000;

/// Documentation page source.
pub struct DocsSource {
    urls: Vec<String>,
    http: reqwest::Client,
}

impl DocsSource {
    /// Create the source with no URLs configured.
    pub fn new() -> Self {
        Self {
            urls: Vec::new(),
            http: reqwest::Client::new(),
        }
    }
}

impl Default for DocsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactSource for DocsSource {
    fn name(&self) -> &'static str {
        "docs"
    }

    fn scope(&self) -> SourceScope {
        SourceScope::Project
    }

    fn configure(&mut self, settings: &HashMap<String, String>) -> CartoResult<()> {
        if let Some(raw) = settings.get("urls") {
            self.urls = raw
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
            for url in &self.urls {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(CartoError::Source {
                        name: "docs".into(),
                        message: format!("invalid docs URL {url:?}"),
                    });
                }
            }
        }
        Ok(())
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> CartoResult<Vec<Artifact>> {
        let mut artifacts = Vec::new();

        for url in &self.urls {
            if ctx.cancel.is_cancelled() {
                return Err(CartoError::Cancelled);
            }
            match self.fetch_page(url, ctx).await {
                Ok(artifact) => artifacts.push(artifact),
                Err(CartoError::Cancelled) => return Err(CartoError::Cancelled),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "docs page fetch failed, skipping");
                }
            }
        }

        Ok(artifacts)
    }
}

impl DocsSource {
    async fn fetch_page(&self, url: &str, ctx: &FetchContext<'_>) -> CartoResult<Artifact> {
        let response = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(CartoError::Cancelled),
            result = self.http.get(url).timeout(FETCH_TIMEOUT).send() => {
                result.map_err(|e| CartoError::Source {
                    name: "docs".into(),
                    message: format!("GET {url} failed: {e}"),
                })?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(CartoError::Source {
                name: "docs".into(),
                message: format!("GET {url} returned HTTP {status}"),
            });
        }

        let body = response.text().await.map_err(|e| CartoError::Source {
            name: "docs".into(),
            message: format!("reading {url} failed: {e}"),
        })?;

        Ok(Artifact {
            source: "docs".into(),
            category: ArtifactCategory::Knowledge,
            id: url.to_string(),
            title: page_title(url),
            body: clip_body(&body),
            url: Some(url.to_string()),
            files: Vec::new(),
            module: None,
            date: None,
            author: None,
            tags: Default::default(),
        })
    }
}

/// Last path segment, or the URL itself for bare hosts.
fn page_title(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains("://"))
        .unwrap_or(url)
        .to_string()
}

/// Cut oversized bodies at a line boundary.
fn clip_body(body: &str) -> String {
    if body.len() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let mut end = MAX_BODY_CHARS;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    let head = &body[..end];
    match head.rfind('\n') {
        Some(i) => head[..i].to_string(),
        None => head.to_string(),
    }
}
