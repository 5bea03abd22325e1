//! Pipeline orchestrator.
//!
//! Drives the five phases of an indexing run and wires every subsystem
//! together. This is the top-level public API of carto-core.
//!
//! ```text
//! scan -> (chunk x atoms)  -+
//!      -> history           +-> deep (per module, then system)
//!      -> artifacts         -+        -> store -> memory service
//!                                     -> manifest -> .carto/manifest.json
//! ```
//!
//! Phases are total ordering points: phase N+1 starts only after phase N
//! has fully drained. Within phases 2-4 the module fan-out runs under the
//! per-batch semaphore, which composes with the gateway's global bound.
//!
//! Only the scan can fail the run. Everything after it accumulates
//! non-fatal errors into the report; cancellation aborts before anything
//! is persisted.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::atoms::AtomAnalyzer;
use crate::chunker;
use crate::config::{self, CartoConfig};
use crate::deep::DeepAnalyzer;
use crate::error::{CartoError, CartoResult};
use crate::history::HistoryCollector;
use crate::llm::LlmGateway;
use crate::manifest::{hash_bytes, Manifest};
use crate::scanner;
use crate::sources::{FetchContext, SourceRegistry};
use crate::store::{MemoryClient, StorageAdapter};
use crate::types::{
    Artifact, Atom, FileHistory, Layer, Module, ModuleAnalysis, ScanResult, SystemSynthesis,
};

/// Progress hook: `(phase_name, done, total)`.
pub type ProgressFn = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

/// Log hook: `(level, message)` with level one of `info`/`warn`.
pub type LogFn = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Options for one indexing run.
#[derive(Default, Clone)]
pub struct RunOptions {
    /// Override the project name (defaults to the root basename).
    pub project: Option<String>,
    /// Process only files classified added/modified against the manifest.
    pub incremental: bool,
    /// Ignore the manifest, clear layers before writing, reprocess all.
    pub force: bool,
    /// Restrict phases 2-5 to one named module.
    pub module: Option<String>,
    /// Progress hook, called at each unit boundary.
    pub progress: Option<ProgressFn>,
    /// Log hook for human-readable lines.
    pub log: Option<LogFn>,
}

/// Result of an indexing run.
#[derive(Debug, Default)]
pub struct IndexReport {
    /// Project name.
    pub project: String,
    /// Modules that went through phases 2-4.
    pub modules: usize,
    /// Files chunked and analyzed this run.
    pub files_indexed: usize,
    /// Atoms produced this run.
    pub atoms_created: usize,
    /// Layers written to the store this run.
    pub layers_written: usize,
    /// Accumulated non-fatal errors.
    pub errors: Vec<CartoError>,
}

/// Per-module state threaded through phases 2-4.
struct ModuleWork {
    module: Module,
    /// Files this run actually processes (incremental mode filters).
    files: Vec<PathBuf>,
    /// Set when the module is in the run only because files were deleted
    /// from it; its layers are rebuilt without them.
    touched_by_removal: bool,
    atoms: Vec<Atom>,
    histories: Vec<FileHistory>,
    artifacts: Vec<Artifact>,
    analysis: Option<ModuleAnalysis>,
}

/// The indexing engine. Owns the gateway, the store adapter, the source
/// registry, and the history collector for the lifetime of a run series.
pub struct Indexer {
    config: CartoConfig,
    gateway: Arc<LlmGateway>,
    store: StorageAdapter,
    sources: SourceRegistry,
    history: HistoryCollector,
}

impl Indexer {
    /// Build an indexer from validated configuration, with the built-in
    /// artifact sources registered.
    pub fn new(config: CartoConfig) -> CartoResult<Self> {
        config.validate()?;

        let gateway = Arc::new(LlmGateway::new(&config.llm)?);
        let store = StorageAdapter::new(MemoryClient::new(&config.store)?);
        let history = HistoryCollector::new(config.history.clone());

        Ok(Self {
            config,
            gateway,
            store,
            sources: SourceRegistry::with_builtin(),
            history,
        })
    }

    /// Replace the source registry (callers register custom sources).
    pub fn set_sources(&mut self, sources: SourceRegistry) {
        self.sources = sources;
    }

    /// Shared gateway handle (callers persist rotated OAuth credentials
    /// from it after a run).
    pub fn gateway(&self) -> Arc<LlmGateway> {
        Arc::clone(&self.gateway)
    }

    /// Storage adapter handle for retrieval outside of indexing runs.
    pub fn store(&self) -> &StorageAdapter {
        &self.store
    }

    /// Run the five-phase pipeline.
    pub async fn run(
        &mut self,
        root: &Path,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> CartoResult<IndexReport> {
        let progress: ProgressFn = options
            .progress
            .clone()
            .unwrap_or_else(|| Arc::new(|_, _, _| {}));
        let log: LogFn = options.log.clone().unwrap_or_else(|| Arc::new(|_, _| {}));

        let mut report = IndexReport::default();

        // ---- Phase 1: scan (fatal on failure) ----
        progress("scan", 0, 1);
        let scan = scanner::scan_named(root, options.project.as_deref())?;
        progress("scan", 1, 1);
        report.project = scan.project.clone();
        log("info", &format!(
            "scanned {} files in {} modules",
            scan.files.len(),
            scan.modules.len()
        ));

        let modules = filter_modules(&scan, options.module.as_deref())?;

        // Source settings are per-project; configure before any fetch.
        match config::load_source_settings(&scan.root) {
            Ok(settings) => self.sources.configure(&settings),
            Err(e) => {
                log("warn", &e.to_string());
                report.errors.push(e);
            }
        }

        // Content hashes drive both classification and the manifest update.
        let mut hashes: HashMap<PathBuf, String> = HashMap::new();
        for file in &scan.files {
            match std::fs::read(scan.root.join(&file.path)) {
                Ok(bytes) => {
                    hashes.insert(file.path.clone(), hash_bytes(&bytes));
                }
                Err(e) => {
                    report.errors.push(CartoError::Chunk {
                        path: file.path.clone(),
                        message: format!("read failed: {e}"),
                    });
                }
            }
        }

        let mut manifest = match Manifest::load(&scan.root, &scan.project) {
            Ok(m) => m,
            Err(e) => {
                log("warn", &format!("{e}; starting from an empty manifest"));
                report.errors.push(e);
                Manifest::new(&scan.project)
            }
        };
        let classification = manifest.classify(&hashes);

        let process_filter: Option<HashSet<PathBuf>> = if options.incremental && !options.force {
            Some(
                classification
                    .added
                    .iter()
                    .chain(classification.modified.iter())
                    .cloned()
                    .collect(),
            )
        } else {
            None
        };

        let removed_set: HashSet<PathBuf> = classification.removed.iter().cloned().collect();

        // In incremental mode a module that only lost files still needs
        // its layers rebuilt without them. Modules are deepest-first, so
        // the first enclosing match is the owner.
        let mut removal_touched: HashSet<usize> = HashSet::new();
        if process_filter.is_some() {
            for removed in &classification.removed {
                let owner = modules.iter().position(|m| {
                    m.path
                        .strip_prefix(&scan.root)
                        .map(|dir| dir.as_os_str().is_empty() || removed.starts_with(dir))
                        .unwrap_or(false)
                });
                if let Some(i) = owner {
                    removal_touched.insert(i);
                }
            }
        }

        // Unmapped files stay tracked in the manifest but are never
        // chunked or summarized.
        let mut work: Vec<ModuleWork> = modules
            .into_iter()
            .enumerate()
            .map(|(i, module)| {
                let files: Vec<PathBuf> = module
                    .files
                    .iter()
                    .filter(|f| f.language != crate::types::Language::Unknown)
                    .map(|f| f.path.clone())
                    .filter(|path| {
                        process_filter
                            .as_ref()
                            .map_or(true, |set| set.contains(path))
                    })
                    .collect();
                ModuleWork {
                    module,
                    files,
                    touched_by_removal: removal_touched.contains(&i),
                    atoms: Vec::new(),
                    histories: Vec::new(),
                    artifacts: Vec::new(),
                    analysis: None,
                }
            })
            .filter(|w| !w.files.is_empty() || w.touched_by_removal)
            .collect();

        report.modules = work.len();
        if work.is_empty() {
            log("info", "nothing to index; refreshing manifest only");
        }

        let batch = Arc::new(Semaphore::new(self.config.batch_concurrent));

        // ---- Phase 2: chunk + atoms ----
        if !work.is_empty() {
            let analyzer = AtomAnalyzer::new(self.gateway(), self.config.batch_concurrent);
            let shared_errors: Mutex<Vec<CartoError>> = Mutex::new(Vec::new());
            let done = AtomicUsize::new(0);
            let total = work.len();

            let tasks = work.iter().map(|unit| {
                let batch = Arc::clone(&batch);
                let analyzer = &analyzer;
                let shared_errors = &shared_errors;
                let done = &done;
                let progress = &progress;
                let cancel = &cancel;
                let root = &scan.root;
                async move {
                    let _permit = acquire(&batch, cancel).await?;
                    let mut atoms = Vec::new();
                    let mut files_done = 0usize;

                    for path in &unit.files {
                        let content = match std::fs::read_to_string(root.join(path)) {
                            Ok(c) => c,
                            Err(e) => {
                                push_error(shared_errors, CartoError::Chunk {
                                    path: path.clone(),
                                    message: format!("read failed: {e}"),
                                });
                                continue;
                            }
                        };
                        let language = unit
                            .module
                            .files
                            .iter()
                            .find(|f| &f.path == path)
                            .map(|f| f.language)
                            .unwrap_or(crate::types::Language::Unknown);

                        let chunks = chunker::chunk_file(language, path, &content);
                        let (file_atoms, errors) = analyzer.analyze(&chunks, cancel).await?;
                        atoms.extend(file_atoms);
                        push_errors(shared_errors, errors);
                        files_done += 1;
                    }

                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    progress("atoms", finished, total);
                    Ok::<(Vec<Atom>, usize), CartoError>((atoms, files_done))
                }
            });

            let results = futures_util::future::join_all(tasks).await;
            for (unit, result) in work.iter_mut().zip(results) {
                let (atoms, files_done) = result?;
                report.files_indexed += files_done;
                report.atoms_created += atoms.len();
                unit.atoms = atoms;
            }
            report.errors.append(&mut drain(&shared_errors));
            log("info", &format!("{} atoms created", report.atoms_created));
        }

        // ---- Phase 3: history + artifacts ----
        let mut project_artifacts: Vec<Artifact> = Vec::new();
        if !work.is_empty() {
            let shared_errors: Mutex<Vec<CartoError>> = Mutex::new(Vec::new());
            let done = AtomicUsize::new(0);
            let total = work.len() + 1; // +1 for the project-scoped fetch

            let module_tasks = futures_util::future::join_all(work.iter().map(|unit| {
                let batch = Arc::clone(&batch);
                let shared_errors = &shared_errors;
                let done = &done;
                let progress = &progress;
                let cancel = &cancel;
                let scan = &scan;
                let history = &self.history;
                let sources = &self.sources;
                async move {
                    let _permit = acquire(&batch, cancel).await?;

                    let (histories, errors) =
                        history.collect(&scan.root, &unit.files, cancel).await?;
                    push_errors(shared_errors, errors);

                    let ctx = FetchContext {
                        root: &scan.root,
                        project: &scan.project,
                        module: Some(&unit.module),
                        cancel,
                    };
                    let (artifacts, errors) = sources.fetch_module(&ctx).await;
                    push_errors(shared_errors, errors);

                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    progress("history", finished, total);
                    Ok::<(Vec<FileHistory>, Vec<Artifact>), CartoError>((histories, artifacts))
                }
            }));

            let project_task = async {
                let ctx = FetchContext {
                    root: &scan.root,
                    project: &scan.project,
                    module: None,
                    cancel: &cancel,
                };
                let (artifacts, errors) = self.sources.fetch_project(&ctx).await;
                push_errors(&shared_errors, errors);
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                progress("history", finished, total);
                artifacts
            };

            let (module_results, fetched) = tokio::join!(module_tasks, project_task);
            project_artifacts = fetched;
            for (unit, result) in work.iter_mut().zip(module_results) {
                let (histories, artifacts) = result?;
                unit.histories = histories;
                unit.artifacts = artifacts;
            }
            report.errors.append(&mut drain(&shared_errors));
        }

        // Incremental fresh results only cover this run's files; fold the
        // stored state for each module's unchanged files back in so every
        // layer write reflects the full current module, and deep analysis
        // sees the whole module rather than this run's slice.
        if process_filter.is_some() && !options.force && !work.is_empty() {
            self.merge_prior_state(&scan.project, &mut work, &removed_set, &mut report, &cancel)
                .await?;
        }

        // ---- Phase 4: deep analysis ----
        let mut synthesis: Option<SystemSynthesis> = None;
        if !work.is_empty() {
            let deep = DeepAnalyzer::new(self.gateway());
            let shared_errors: Mutex<Vec<CartoError>> = Mutex::new(Vec::new());
            let done = AtomicUsize::new(0);
            let total = work.len() + 1; // +1 for the system synthesis

            let tasks = work.iter().map(|unit| {
                let batch = Arc::clone(&batch);
                let deep = &deep;
                let shared_errors = &shared_errors;
                let done = &done;
                let progress = &progress;
                let cancel = &cancel;
                async move {
                    let _permit = acquire(&batch, cancel).await?;

                    let analysis = if unit.atoms.is_empty() {
                        None
                    } else {
                        match deep
                            .analyze_module(
                                &unit.module.name,
                                &unit.atoms,
                                &unit.histories,
                                &unit.artifacts,
                                cancel,
                            )
                            .await
                        {
                            Ok(analysis) => Some(analysis),
                            Err(CartoError::Cancelled) => return Err(CartoError::Cancelled),
                            Err(e) => {
                                tracing::warn!(
                                    module = %unit.module.name,
                                    error = %e,
                                    "module analysis dropped"
                                );
                                push_error(shared_errors, e);
                                None
                            }
                        }
                    };

                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    progress("deep", finished, total);
                    Ok::<Option<ModuleAnalysis>, CartoError>(analysis)
                }
            });

            let results = futures_util::future::join_all(tasks).await;
            for (unit, result) in work.iter_mut().zip(results) {
                unit.analysis = result?;
            }
            report.errors.append(&mut drain(&shared_errors));

            let analyses: Vec<ModuleAnalysis> = work
                .iter()
                .filter_map(|unit| unit.analysis.clone())
                .collect();
            if analyses.is_empty() {
                log("warn", "no module analysis succeeded; skipping system synthesis");
            } else {
                match deep.synthesize_system(&analyses, &cancel).await {
                    Ok(result) => synthesis = Some(result),
                    Err(CartoError::Cancelled) => return Err(CartoError::Cancelled),
                    Err(e) => {
                        log("warn", &e.to_string());
                        report.errors.push(e);
                    }
                }
            }
            progress("deep", total, total);
        }

        // ---- Phase 5: store + manifest ----
        if cancel.is_cancelled() {
            return Err(CartoError::Cancelled);
        }

        // Modules whose manifest file disappeared: their subtree is gone,
        // so their layers are cleared. The sidecar's module map holds the
        // name the tags were written under; the directory name is the
        // fallback for sidecars that predate the map.
        let mut removed_modules: Vec<String> = Vec::new();
        for path in &classification.removed {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !scanner::is_manifest_file(name) {
                continue;
            }
            let module = manifest
                .module_for_manifest(path)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    path.parent()
                        .and_then(|d| d.file_name())
                        .and_then(|n| n.to_str())
                        .unwrap_or(&scan.project)
                        .to_string()
                });
            if !removed_modules.contains(&module) {
                removed_modules.push(module);
            }
        }

        self.store_phase(
            &scan,
            &options,
            &removed_modules,
            &mut work,
            project_artifacts,
            synthesis,
            &mut report,
            &progress,
            &log,
            &cancel,
        )
        .await?;

        for path in &classification.removed {
            manifest.remove_file(path);
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if scanner::is_manifest_file(name) {
                manifest.remove_module(path);
            }
        }
        // Every scanned file is tracked; unchanged entries keep their
        // original indexed-at timestamps. Module names are re-recorded so
        // a later run can clear the right tags after a manifest vanishes.
        for file in &scan.files {
            if let Some(hash) = hashes.get(&file.path) {
                manifest.record(&file.path, hash, file.size_bytes);
            }
        }
        for module in &scan.modules {
            if let Some(manifest_path) = &module.manifest {
                manifest.record_module(manifest_path, &module.name);
            }
        }
        if let Err(e) = manifest.save(&scan.root) {
            log("warn", &e.to_string());
            report.errors.push(e);
        }

        log("info", &format!(
            "run complete: {} modules, {} files, {} atoms, {} layers, {} errors",
            report.modules,
            report.files_indexed,
            report.atoms_created,
            report.layers_written,
            report.errors.len()
        ));
        Ok(report)
    }

    /// Fold stored atoms and histories for a module's unchanged files into
    /// this run's fresh results. Files reprocessed this run and files
    /// removed from disk are dropped from the prior state; fresh data wins
    /// on collision. A store failure degrades that module to a fresh-only
    /// write and is recorded.
    async fn merge_prior_state(
        &self,
        project: &str,
        work: &mut [ModuleWork],
        removed: &HashSet<PathBuf>,
        report: &mut IndexReport,
        cancel: &CancellationToken,
    ) -> CartoResult<()> {
        for unit in work.iter_mut() {
            let module = unit.module.name.clone();
            let mut exclude: HashSet<PathBuf> = unit.files.iter().cloned().collect();
            exclude.extend(removed.iter().cloned());

            match self
                .store
                .retrieve_layer(project, Some(module.as_str()), Layer::Atoms, cancel)
                .await
            {
                Ok(records) => {
                    let mut seen: HashSet<String> = unit.atoms.iter().map(Atom::id).collect();
                    for record in &records {
                        let Ok(prior) = serde_json::from_str::<Vec<Atom>>(&record.text) else {
                            tracing::debug!(module = %module, "stored atoms record unparseable, skipping");
                            continue;
                        };
                        for atom in prior {
                            if exclude.contains(&atom.file) || seen.contains(&atom.id()) {
                                continue;
                            }
                            seen.insert(atom.id());
                            unit.atoms.push(atom);
                        }
                    }
                    unit.atoms.sort_by(|a, b| {
                        a.file.cmp(&b.file).then(a.line_start.cmp(&b.line_start))
                    });
                }
                Err(CartoError::Cancelled) => return Err(CartoError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        module = %module,
                        error = %e,
                        "prior atoms unavailable, writing fresh state only"
                    );
                    report.errors.push(e);
                }
            }

            match self
                .store
                .retrieve_layer(project, Some(module.as_str()), Layer::History, cancel)
                .await
            {
                Ok(records) => {
                    let mut seen: HashSet<PathBuf> =
                        unit.histories.iter().map(|h| h.path.clone()).collect();
                    for record in &records {
                        let Ok(prior) = serde_json::from_str::<Vec<FileHistory>>(&record.text)
                        else {
                            tracing::debug!(module = %module, "stored history record unparseable, skipping");
                            continue;
                        };
                        for history in prior {
                            if exclude.contains(&history.path) || seen.contains(&history.path) {
                                continue;
                            }
                            seen.insert(history.path.clone());
                            unit.histories.push(history);
                        }
                    }
                    unit.histories.sort_by(|a, b| a.path.cmp(&b.path));
                }
                Err(CartoError::Cancelled) => return Err(CartoError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        module = %module,
                        error = %e,
                        "prior history unavailable, writing fresh state only"
                    );
                    report.errors.push(e);
                }
            }
        }

        Ok(())
    }

    /// Phase 5 proper: layer writes, with per-layer failures accumulated.
    #[allow(clippy::too_many_arguments)]
    async fn store_phase(
        &self,
        scan: &ScanResult,
        options: &RunOptions,
        removed_modules: &[String],
        work: &mut [ModuleWork],
        project_artifacts: Vec<Artifact>,
        synthesis: Option<SystemSynthesis>,
        report: &mut IndexReport,
        progress: &ProgressFn,
        log: &LogFn,
        cancel: &CancellationToken,
    ) -> CartoResult<()> {
        let total = work.len() * 5 + 2;
        let mut done = 0usize;
        progress("store", done, total);

        let nothing_to_write = work
            .iter()
            .all(|w| w.atoms.is_empty() && !w.touched_by_removal)
            && synthesis.is_none()
            && removed_modules.is_empty();
        if nothing_to_write {
            progress("store", total, total);
            return Ok(());
        }

        if !self.store.health(cancel).await {
            if cancel.is_cancelled() {
                return Err(CartoError::Cancelled);
            }
            let e = CartoError::Store {
                message: format!("memory service at {} is unhealthy", self.config.store.base_url),
            };
            log("warn", &e.to_string());
            report.errors.push(e);
            progress("store", total, total);
            return Ok(());
        }

        for module in removed_modules {
            log("info", &format!("module {module} removed, clearing its layers"));
            if let Err(e) = self.store.clear_module(&scan.project, module, cancel).await {
                if e.is_fatal() {
                    return Err(e);
                }
                report.errors.push(e);
            }
        }

        for unit in work.iter() {
            let module = unit.module.name.as_str();

            // force clears everything up front; a module that only lost
            // files and has nothing left gets the same treatment so stale
            // layers don't outlive their files.
            if options.force || (unit.touched_by_removal && unit.atoms.is_empty()) {
                if let Err(e) = self.store.clear_module(&scan.project, module, cancel).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    report.errors.push(e);
                }
            }

            let module_layers: [(Layer, Option<serde_json::Value>); 5] = [
                (Layer::Atoms, non_empty_json(&unit.atoms)?),
                (
                    Layer::History,
                    non_empty_json(
                        &unit
                            .histories
                            .iter()
                            .filter(|h| h.churn > 0)
                            .collect::<Vec<_>>(),
                    )?,
                ),
                (Layer::Signals, non_empty_json(&unit.artifacts)?),
                (
                    Layer::Wiring,
                    unit.analysis
                        .as_ref()
                        .map(|a| serde_json::to_value(&a.wiring))
                        .transpose()?,
                ),
                (
                    Layer::Zones,
                    unit.analysis
                        .as_ref()
                        .map(|a| serde_json::to_value(&a.zones))
                        .transpose()?,
                ),
            ];

            for (layer, payload) in module_layers {
                done += 1;
                let Some(payload) = payload else {
                    progress("store", done, total);
                    continue;
                };
                let text = serde_json::to_string_pretty(&payload)?;
                match self
                    .store
                    .write_text_layer(&scan.project, Some(module), layer, &text, cancel)
                    .await
                {
                    Ok(()) => report.layers_written += 1,
                    Err(CartoError::Cancelled) => return Err(CartoError::Cancelled),
                    Err(e) => {
                        log("warn", &e.to_string());
                        report.errors.push(e);
                    }
                }
                progress("store", done, total);
            }
        }

        // Project-wide layers under `_system`.
        if let Some(synthesis) = &synthesis {
            match self
                .store
                .write_text_layer(&scan.project, None, Layer::Blueprint, &synthesis.blueprint, cancel)
                .await
            {
                Ok(()) => report.layers_written += 1,
                Err(CartoError::Cancelled) => return Err(CartoError::Cancelled),
                Err(e) => {
                    log("warn", &e.to_string());
                    report.errors.push(e);
                }
            }
            done += 1;
            progress("store", done, total);

            match self
                .store
                .write_json_layer(&scan.project, None, Layer::Patterns, &synthesis.patterns, cancel)
                .await
            {
                Ok(()) => report.layers_written += 1,
                Err(CartoError::Cancelled) => return Err(CartoError::Cancelled),
                Err(e) => {
                    log("warn", &e.to_string());
                    report.errors.push(e);
                }
            }
            done += 1;
        }

        // Project-scoped artifacts belong to no module; store them under
        // the _system signals tag so they surface at the full tier.
        if !project_artifacts.is_empty() {
            match self
                .store
                .write_json_layer(&scan.project, None, Layer::Signals, &project_artifacts, cancel)
                .await
            {
                Ok(()) => report.layers_written += 1,
                Err(CartoError::Cancelled) => return Err(CartoError::Cancelled),
                Err(e) => {
                    log("warn", &e.to_string());
                    report.errors.push(e);
                }
            }
        }

        progress("store", total, total);
        Ok(())
    }
}

/// Apply the optional module filter.
fn filter_modules(scan: &ScanResult, filter: Option<&str>) -> CartoResult<Vec<Module>> {
    match filter {
        None => Ok(scan.modules.clone()),
        Some(name) => {
            let found: Vec<Module> = scan
                .modules
                .iter()
                .filter(|m| m.name == name)
                .cloned()
                .collect();
            if found.is_empty() {
                return Err(CartoError::Config {
                    details: format!("module filter {name:?} matches no detected module"),
                });
            }
            Ok(found)
        }
    }
}

/// Serialize to JSON unless the collection is empty.
fn non_empty_json<T: serde::Serialize>(value: &T) -> CartoResult<Option<serde_json::Value>> {
    let json = serde_json::to_value(value)?;
    let empty = json.as_array().map(Vec::is_empty).unwrap_or(false);
    Ok(if empty { None } else { Some(json) })
}

/// Acquire a batch permit, honoring cancellation.
async fn acquire(
    semaphore: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> CartoResult<tokio::sync::OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CartoError::Cancelled),
        permit = Arc::clone(semaphore).acquire_owned() => {
            permit.map_err(|_| CartoError::Internal("batch semaphore closed".into()))
        }
    }
}

fn push_error(errors: &Mutex<Vec<CartoError>>, error: CartoError) {
    if let Ok(mut guard) = errors.lock() {
        guard.push(error);
    }
}

fn push_errors(errors: &Mutex<Vec<CartoError>>, mut batch: Vec<CartoError>) {
    if let Ok(mut guard) = errors.lock() {
        guard.append(&mut batch);
    }
}

fn drain(errors: &Mutex<Vec<CartoError>>) -> Vec<CartoError> {
    errors.lock().map(|mut g| std::mem::take(&mut *g)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CartoConfig;

    fn config() -> CartoConfig {
        let mut config = CartoConfig::default();
        config.llm.api_key = Some("sk-test".into());
        config.store.base_url = "http://127.0.0.1:9".into();
        config.store.timeout_secs = 1;
        config
    }

    #[test]
    fn test_indexer_requires_valid_config() {
        let invalid = CartoConfig::default();
        assert!(Indexer::new(invalid).is_err());
        assert!(Indexer::new(config()).is_ok());
    }

    #[tokio::test]
    async fn test_run_on_empty_tree_saves_manifest_only() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut indexer = Indexer::new(config()).expect("indexer");

        let report = indexer
            .run(dir.path(), RunOptions::default(), CancellationToken::new())
            .await
            .expect("run");

        assert_eq!(report.files_indexed, 0);
        assert_eq!(report.atoms_created, 0);
        assert_eq!(report.layers_written, 0);
        let root = dir.path().canonicalize().expect("canonicalize");
        assert!(Manifest::path_for(&root).exists());
    }

    #[tokio::test]
    async fn test_module_filter_unknown_name_is_config_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join("main.go"), "package main\n").expect("write");

        let mut indexer = Indexer::new(config()).expect("indexer");
        let options = RunOptions {
            module: Some("no-such-module".into()),
            ..RunOptions::default()
        };
        let err = indexer
            .run(dir.path(), options, CancellationToken::new())
            .await
            .expect_err("should fail");
        assert!(matches!(err, CartoError::Config { .. }));
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal_scan_error() {
        let mut indexer = Indexer::new(config()).expect("indexer");
        let err = indexer
            .run(
                Path::new("/nonexistent/carto-pipeline-root"),
                RunOptions::default(),
                CancellationToken::new(),
            )
            .await
            .expect_err("should fail");
        assert!(matches!(err, CartoError::Scan { .. }));
    }

    #[test]
    fn test_non_empty_json() {
        let empty: Vec<String> = vec![];
        assert!(non_empty_json(&empty).expect("json").is_none());
        assert!(non_empty_json(&vec!["a"]).expect("json").is_some());
    }
}
