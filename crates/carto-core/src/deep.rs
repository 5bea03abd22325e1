//! Deep-tier analysis.
//!
//! One deep call per module turns atoms + histories + artifacts into
//! wiring edges and domain zones; one further call across all module
//! analyses produces the system blueprint and recurring patterns.
//!
//! Module prompts are budgeted: formatted atom lines are capped, so very
//! large modules summarize down rather than splitting into sub-modules.
//! When a module's reply cannot be parsed, that module simply contributes
//! no deep layers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{CartoError, CartoResult};
use crate::llm::{json, CompletionRequest, LlmGateway, ModelTier};
use crate::types::{Artifact, Atom, FileHistory, ModuleAnalysis, SystemSynthesis};

/// Character budget for the formatted atom section of a module prompt.
const ATOM_SECTION_BUDGET: usize = 24_000;

/// Completion budget for the structured module reply.
const MODULE_MAX_TOKENS: u32 = 4096;

/// Completion budget for the blueprint + patterns reply.
const SYSTEM_MAX_TOKENS: u32 = 4096;

const MODULE_SYSTEM_PROMPT: &str = "You are a software architect reverse-engineering one \
module of a codebase. Reply with a single JSON object and nothing else. Keys: \
\"module_intent\" (1-3 sentences), \"wiring\" (array of {\"from\", \"to\", \"reason\"} \
edges between atoms, where from/to are the exact atom identifiers given in the prompt), \
\"zones\" (array of {\"name\", \"intent\", \"files\"} business-domain groupings).";

const SYSTEM_SYSTEM_PROMPT: &str = "You are a software architect synthesizing a whole-system \
view from per-module analyses. Reply with a single JSON object and nothing else. Keys: \
\"blueprint\" (a narrative architectural overview, several paragraphs), \"patterns\" \
(array of {\"name\", \"description\", \"examples\"} recurring design patterns).";

/// Deep-tier analyzer. Per-module concurrency is bounded by the caller.
pub struct DeepAnalyzer {
    gateway: Arc<LlmGateway>,
}

impl DeepAnalyzer {
    /// Create an analyzer sharing the given gateway.
    pub fn new(gateway: Arc<LlmGateway>) -> Self {
        Self { gateway }
    }

    /// Synthesize wiring and zones for one module.
    pub async fn analyze_module(
        &self,
        module: &str,
        atoms: &[Atom],
        histories: &[FileHistory],
        artifacts: &[Artifact],
        cancel: &CancellationToken,
    ) -> CartoResult<ModuleAnalysis> {
        let request = CompletionRequest {
            system: MODULE_SYSTEM_PROMPT.into(),
            prompt: build_module_prompt(module, atoms, histories, artifacts),
            max_tokens: MODULE_MAX_TOKENS,
            tier: ModelTier::Deep,
        };

        let text = self.gateway.complete(&request, cancel).await?;
        let mut analysis: ModuleAnalysis = json::extract_into(&text).map_err(|e| {
            CartoError::JsonExtract {
                message: format!("module analysis for {module}: {e}"),
            }
        })?;
        analysis.module = module.to_string();

        tracing::debug!(
            module = %module,
            wiring = analysis.wiring.len(),
            zones = analysis.zones.len(),
            "module analysis complete"
        );
        Ok(analysis)
    }

    /// Synthesize the cross-module blueprint and patterns.
    pub async fn synthesize_system(
        &self,
        analyses: &[ModuleAnalysis],
        cancel: &CancellationToken,
    ) -> CartoResult<SystemSynthesis> {
        let request = CompletionRequest {
            system: SYSTEM_SYSTEM_PROMPT.into(),
            prompt: build_system_prompt(analyses),
            max_tokens: SYSTEM_MAX_TOKENS,
            tier: ModelTier::Deep,
        };

        let text = self.gateway.complete(&request, cancel).await?;
        json::extract_into(&text).map_err(|e| CartoError::JsonExtract {
            message: format!("system synthesis: {e}"),
        })
    }
}

/// Format the module prompt: atoms (budgeted), histories, artifacts.
fn build_module_prompt(
    module: &str,
    atoms: &[Atom],
    histories: &[FileHistory],
    artifacts: &[Artifact],
) -> String {
    let mut prompt = format!("Module `{module}`.\n\n## Atoms\n");

    let mut used = 0usize;
    let mut included = 0usize;
    for atom in atoms {
        let line = format!(
            "- {id} [{kind}] imports: [{imports}] exports: [{exports}] -- {summary}\n",
            id = atom.id(),
            kind = atom.kind.as_str(),
            imports = atom.imports.join(", "),
            exports = atom.exports.join(", "),
            summary = atom.summary,
        );
        if used + line.len() > ATOM_SECTION_BUDGET {
            break;
        }
        used += line.len();
        included += 1;
        prompt.push_str(&line);
    }
    if included < atoms.len() {
        tracing::debug!(
            module = %module,
            included,
            total = atoms.len(),
            "atom section capped for module prompt"
        );
        prompt.push_str(&format!(
            "(and {} more atoms omitted for space)\n",
            atoms.len() - included
        ));
    }

    prompt.push_str("\n## File history\n");
    for history in histories {
        if history.churn == 0 {
            continue;
        }
        prompt.push_str(&format!(
            "- {path}: {churn} recent commits by [{authors}]\n",
            path = history.path.display(),
            churn = history.churn,
            authors = history.authors.join(", "),
        ));
    }

    prompt.push_str("\n## Signals\n");
    for artifact in artifacts {
        prompt.push_str(&format!(
            "- [{source}] {title}\n",
            source = artifact.source,
            title = artifact.title,
        ));
    }

    prompt.push_str(
        "\nProduce the module intent, the wiring edges you can justify from imports/exports \
         and summaries, and the business-domain zones.",
    );
    prompt
}

/// Format the system prompt from every module's analysis.
fn build_system_prompt(analyses: &[ModuleAnalysis]) -> String {
    let mut prompt = String::from("Per-module analyses:\n\n");
    for analysis in analyses {
        prompt.push_str(&format!(
            "## Module `{name}`\nIntent: {intent}\nZones: [{zones}]\nWiring edges: {edges}\n\n",
            name = analysis.module,
            intent = analysis.module_intent,
            zones = analysis
                .zones
                .iter()
                .map(|z| z.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            edges = analysis.wiring.len(),
        ));
    }
    prompt.push_str(
        "Write the architectural blueprint for the whole system and name the recurring patterns.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkKind, Dependency, Zone};
    use std::path::PathBuf;

    fn atom(name: &str, summary: &str) -> Atom {
        Atom {
            name: name.into(),
            kind: ChunkKind::Function,
            file: PathBuf::from("src/a.go"),
            line_start: 1,
            line_end: 5,
            summary: summary.into(),
            clarified_code: String::new(),
            imports: vec!["fmt".into()],
            exports: vec![name.into()],
        }
    }

    #[test]
    fn test_module_prompt_carries_atom_ids() {
        let atoms = vec![atom("A", "does a"), atom("B", "does b")];
        let prompt = build_module_prompt("core", &atoms, &[], &[]);
        assert!(prompt.contains("src/a.go::A"));
        assert!(prompt.contains("src/a.go::B"));
        assert!(prompt.contains("Module `core`"));
    }

    #[test]
    fn test_module_prompt_caps_atom_section() {
        let big_summary = "x".repeat(1000);
        let atoms: Vec<Atom> = (0..100).map(|i| atom(&format!("f{i}"), &big_summary)).collect();
        let prompt = build_module_prompt("core", &atoms, &[], &[]);
        assert!(prompt.contains("more atoms omitted"));
        // Budget plus surrounding sections stays well under double budget.
        assert!(prompt.len() < ATOM_SECTION_BUDGET * 2);
    }

    #[test]
    fn test_module_prompt_skips_zero_churn_histories() {
        let histories = vec![
            FileHistory {
                path: PathBuf::from("hot.go"),
                churn: 3,
                authors: vec!["Jo".into()],
                commits: vec![],
            },
            FileHistory {
                path: PathBuf::from("cold.go"),
                ..FileHistory::default()
            },
        ];
        let prompt = build_module_prompt("core", &[], &histories, &[]);
        assert!(prompt.contains("hot.go"));
        assert!(!prompt.contains("cold.go"));
    }

    #[test]
    fn test_system_prompt_lists_modules() {
        let analyses = vec![ModuleAnalysis {
            module: "api".into(),
            module_intent: "serves requests".into(),
            wiring: vec![Dependency {
                from: "a::f".into(),
                to: "b::g".into(),
                reason: "calls".into(),
            }],
            zones: vec![Zone {
                name: "auth".into(),
                intent: "login".into(),
                files: vec![],
            }],
        }];
        let prompt = build_system_prompt(&analyses);
        assert!(prompt.contains("Module `api`"));
        assert!(prompt.contains("auth"));
        assert!(prompt.contains("Wiring edges: 1"));
    }
}
