//! Built-in git commit source.
//!
//! Module-scoped: for each module, recent commits touching the module
//! directory become `signal` artifacts. Commits whose subject references
//! a pull request additionally produce a PR artifact tagged `type=pr`.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;

use crate::error::{CartoError, CartoResult};
use crate::history;
use crate::types::{Artifact, ArtifactCategory, CommitRecord, SourceScope};

use super::{ArtifactSource, FetchContext};

/// Commit cap per module.
const DEFAULT_MAX_COMMITS: usize = 50;

/// Git commit artifact source.
pub struct GitSource {
    max_commits: usize,
}

impl GitSource {
    /// Create the source with defaults.
    pub fn new() -> Self {
        Self {
            max_commits: DEFAULT_MAX_COMMITS,
        }
    }
}

impl Default for GitSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactSource for GitSource {
    fn name(&self) -> &'static str {
        "git"
    }

    fn scope(&self) -> SourceScope {
        SourceScope::Module
    }

    fn configure(&mut self, settings: &HashMap<String, String>) -> CartoResult<()> {
        if let Some(raw) = settings.get("max_commits") {
            self.max_commits = raw.parse().map_err(|_| CartoError::Source {
                name: "git".into(),
                message: format!("max_commits must be a number, got {raw:?}"),
            })?;
        }
        Ok(())
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> CartoResult<Vec<Artifact>> {
        let module = ctx.module.ok_or_else(|| CartoError::Source {
            name: "git".into(),
            message: "git source is module-scoped but no module was given".into(),
        })?;

        // Scope the log to the module directory, relative to the root.
        let module_dir = module
            .path
            .strip_prefix(ctx.root)
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let pathspec = if module_dir.as_os_str().is_empty() {
            ".".into()
        } else {
            module_dir
        };

        let mut command = tokio::process::Command::new("git");
        command
            .arg("log")
            .arg(format!("--format={}", history::LOG_FORMAT))
            .arg(format!("-{}", self.max_commits))
            .arg("--")
            .arg(&pathspec)
            .current_dir(ctx.root)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(CartoError::Cancelled),
            output = command.output() => output.map_err(|e| CartoError::Source {
                name: "git".into(),
                message: format!("spawning git failed: {e}"),
            })?,
        };

        if !output.status.success() {
            // Not a repo is a normal condition, not a source failure.
            tracing::debug!(module = %module.name, "git log unavailable, no commit artifacts");
            return Ok(Vec::new());
        }

        let commits = history::parse_log_output(&String::from_utf8_lossy(&output.stdout));
        Ok(commits_to_artifacts(&module.name, &commits))
    }
}

/// Map commits to artifacts: one signal per commit, plus one `type=pr`
/// signal per referenced pull request.
fn commits_to_artifacts(module: &str, commits: &[CommitRecord]) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    let mut seen_prs: Vec<u64> = Vec::new();

    for commit in commits {
        artifacts.push(Artifact {
            source: "git".into(),
            category: ArtifactCategory::Signal,
            id: commit.hash.clone(),
            title: commit.message.clone(),
            body: format!("{} by {} on {}", commit.message, commit.author, commit.date),
            url: None,
            files: Vec::new(),
            module: Some(module.to_string()),
            date: Some(commit.date.clone()),
            author: Some(commit.author.clone()),
            tags: [("type".to_string(), "commit".to_string())].into(),
        });

        if let Some(pr) = commit.pr {
            if seen_prs.contains(&pr) {
                continue;
            }
            seen_prs.push(pr);
            artifacts.push(Artifact {
                source: "git".into(),
                category: ArtifactCategory::Signal,
                id: format!("pr-{pr}"),
                title: format!("PR #{pr}"),
                body: format!("Referenced by commit {}: {}", commit.hash, commit.message),
                url: None,
                files: Vec::new(),
                module: Some(module.to_string()),
                date: Some(commit.date.clone()),
                author: Some(commit.author.clone()),
                tags: [("type".to_string(), "pr".to_string())].into(),
            });
        }
    }

    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(hash: &str, subject: &str, pr: Option<u64>) -> CommitRecord {
        CommitRecord {
            hash: hash.into(),
            author: "Jo".into(),
            date: "2025-06-01T00:00:00Z".into(),
            message: subject.into(),
            pr,
        }
    }

    #[test]
    fn test_commit_artifacts_are_signals() {
        let artifacts = commits_to_artifacts("core", &[commit("abc", "feat: x", None)]);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].category, ArtifactCategory::Signal);
        assert_eq!(artifacts[0].module.as_deref(), Some("core"));
        assert_eq!(artifacts[0].tags.get("type").map(String::as_str), Some("commit"));
    }

    #[test]
    fn test_pr_reference_creates_tagged_artifact() {
        let artifacts = commits_to_artifacts(
            "core",
            &[commit("abc", "Merge pull request #42", Some(42))],
        );
        assert_eq!(artifacts.len(), 2);
        let pr = artifacts.iter().find(|a| a.id == "pr-42").expect("pr artifact");
        assert_eq!(pr.tags.get("type").map(String::as_str), Some("pr"));
        assert_eq!(pr.category, ArtifactCategory::Signal);
    }

    #[test]
    fn test_duplicate_pr_references_collapse() {
        let artifacts = commits_to_artifacts(
            "core",
            &[
                commit("a", "PR #7 part one", Some(7)),
                commit("b", "PR #7 part two", Some(7)),
            ],
        );
        let pr_count = artifacts.iter().filter(|a| a.id == "pr-7").count();
        assert_eq!(pr_count, 1);
    }

    #[test]
    fn test_configure_rejects_bad_number() {
        let mut source = GitSource::new();
        let mut settings = HashMap::new();
        settings.insert("max_commits".to_string(), "lots".to_string());
        assert!(source.configure(&settings).is_err());

        settings.insert("max_commits".to_string(), "10".to_string());
        assert!(source.configure(&settings).is_ok());
        assert_eq!(source.max_commits, 10);
    }
}
