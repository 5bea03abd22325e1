//! External artifact sources.
//!
//! A source produces artifacts (commits, docs pages, issues) from an
//! external system. Sources declare a scope: project-wide sources run
//! once per run, module-scoped sources run once per module. The registry
//! localizes failures: a failing source logs, contributes nothing, and
//! never stops the run.
//!
//! Credentials and settings reach a source opaquely through its
//! `configure` map (assembled by the orchestrator from configuration and
//! `.carto/sources.yaml`); sources never read environment variables.

pub mod docs;
pub mod git;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{CartoError, CartoResult};
use crate::types::{Artifact, Module, SourceScope};

/// Everything a source needs for one fetch.
pub struct FetchContext<'a> {
    /// Project root on disk.
    pub root: &'a Path,
    /// Project name.
    pub project: &'a str,
    /// The module being fetched, for module-scoped sources.
    pub module: Option<&'a Module>,
    /// Run cancellation signal.
    pub cancel: &'a CancellationToken,
}

/// One pluggable artifact source.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Stable source name (used in artifact records and settings keys).
    fn name(&self) -> &'static str;

    /// Whether this source runs once per project or once per module.
    fn scope(&self) -> SourceScope;

    /// Accept credentials and settings. Called once before any fetch.
    fn configure(&mut self, settings: &HashMap<String, String>) -> CartoResult<()>;

    /// Produce artifacts for the given context.
    async fn fetch(&self, ctx: &FetchContext<'_>) -> CartoResult<Vec<Artifact>>;
}

/// Holder for the heterogeneous source set.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<Box<dyn ArtifactSource>>,
}

impl SourceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in sources: git commits (module scope) and
    /// the docs fetcher (project scope).
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(git::GitSource::new()));
        registry.register(Box::new(docs::DocsSource::new()));
        registry
    }

    /// Add a source.
    pub fn register(&mut self, source: Box<dyn ArtifactSource>) {
        self.sources.push(source);
    }

    /// Pass each source its settings map. Sources without an entry keep
    /// their defaults; a source that rejects its settings is logged and
    /// left unconfigured.
    pub fn configure(&mut self, settings: &HashMap<String, HashMap<String, String>>) {
        for source in &mut self.sources {
            if let Some(map) = settings.get(source.name()) {
                if let Err(e) = source.configure(map) {
                    tracing::warn!(source = source.name(), error = %e, "source configuration rejected");
                }
            }
        }
    }

    /// Fetch all project-scoped sources concurrently.
    pub async fn fetch_project(
        &self,
        ctx: &FetchContext<'_>,
    ) -> (Vec<Artifact>, Vec<CartoError>) {
        let tasks = self
            .sources
            .iter()
            .filter(|s| s.scope() == SourceScope::Project)
            .map(|source| async move { (source.name(), source.fetch(ctx).await) });

        collect_results(futures_util::future::join_all(tasks).await)
    }

    /// Fetch all module-scoped sources for one module, sequentially.
    /// Concurrency across modules comes from the pipeline's module fan-out.
    pub async fn fetch_module(
        &self,
        ctx: &FetchContext<'_>,
    ) -> (Vec<Artifact>, Vec<CartoError>) {
        let mut results = Vec::new();
        for source in &self.sources {
            if source.scope() != SourceScope::Module {
                continue;
            }
            results.push((source.name(), source.fetch(ctx).await));
        }
        collect_results(results)
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the registry holds no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Flatten per-source results, logging and localizing failures.
fn collect_results(
    results: Vec<(&'static str, CartoResult<Vec<Artifact>>)>,
) -> (Vec<Artifact>, Vec<CartoError>) {
    let mut artifacts = Vec::new();
    let mut errors = Vec::new();

    for (name, result) in results {
        match result {
            Ok(mut items) => artifacts.append(&mut items),
            Err(e) => {
                tracing::warn!(source = name, error = %e, "artifact source failed, omitting");
                errors.push(CartoError::Source {
                    name: name.into(),
                    message: e.to_string(),
                });
            }
        }
    }

    (artifacts, errors)
}
