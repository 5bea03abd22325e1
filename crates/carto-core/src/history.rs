//! Git history mining.
//!
//! Shells out to `git log --follow` per file with a terse field-delimited
//! format, bounded by a date window and a commit cap. Pull-request
//! references are lifted out of commit subjects, authors are
//! deduplicated, and the commit count doubles as a churn proxy.
//!
//! A root that is not a git working tree yields empty histories, not an
//! error. Subprocess failures for individual files are recorded and the
//! file is skipped.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::config::HistoryConfig;
use crate::error::{CartoError, CartoResult};
use crate::types::{CommitRecord, FileHistory};

/// Unit separator keeps subjects with `|` or tabs parseable.
const FIELD_SEP: char = '\u{1f}';
pub(crate) const LOG_FORMAT: &str = "%H%x1f%an%x1f%aI%x1f%s";

/// `PR #12`, `pull #12`, `pull request #12`, `merged ... #12`.
static PR_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:pr|pull(?:\s+request)?|merged?)\b[^#\n]{0,40}#(\d+)")
        .expect("static regex")
});

/// Per-file git log collector.
pub struct HistoryCollector {
    config: HistoryConfig,
}

impl HistoryCollector {
    /// Create a collector with the given window and cap.
    pub fn new(config: HistoryConfig) -> Self {
        Self { config }
    }

    /// Collect history for every file, in input order.
    ///
    /// Returns one `FileHistory` per input path (empty when the root is
    /// not a git tree or the file's log failed) plus the per-file errors
    /// for the run aggregate.
    pub async fn collect(
        &self,
        root: &Path,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> CartoResult<(Vec<FileHistory>, Vec<CartoError>)> {
        if !self.is_git_tree(root).await {
            tracing::debug!(root = %root.display(), "not a git working tree, skipping history");
            return Ok((
                files
                    .iter()
                    .map(|path| FileHistory {
                        path: path.clone(),
                        ..FileHistory::default()
                    })
                    .collect(),
                Vec::new(),
            ));
        }

        let since = (chrono::Utc::now() - chrono::Duration::days(self.config.window_days))
            .format("%Y-%m-%d")
            .to_string();

        let mut histories = Vec::with_capacity(files.len());
        let mut errors = Vec::new();

        for path in files {
            if cancel.is_cancelled() {
                return Err(CartoError::Cancelled);
            }

            match self.file_log(root, path, &since, cancel).await {
                Ok(commits) => histories.push(build_history(path, commits)),
                Err(CartoError::Cancelled) => return Err(CartoError::Cancelled),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "git log failed");
                    errors.push(e);
                    histories.push(FileHistory {
                        path: path.clone(),
                        ..FileHistory::default()
                    });
                }
            }
        }

        Ok((histories, errors))
    }

    /// `git rev-parse --is-inside-work-tree`, treating any failure
    /// (including a missing git binary) as "not a repo".
    async fn is_git_tree(&self, root: &Path) -> bool {
        let result = tokio::process::Command::new("git")
            .args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(root)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        matches!(result, Ok(status) if status.success())
    }

    /// Run the follow-rename log for one file.
    async fn file_log(
        &self,
        root: &Path,
        path: &Path,
        since: &str,
        cancel: &CancellationToken,
    ) -> CartoResult<Vec<CommitRecord>> {
        let mut command = tokio::process::Command::new("git");
        command
            .arg("log")
            .arg("--follow")
            .arg(format!("--format={LOG_FORMAT}"))
            .arg(format!("--since={since}"))
            .arg(format!("-{}", self.config.max_commits))
            .arg("--")
            .arg(path)
            .current_dir(root)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CartoError::Cancelled),
            output = command.output() => output.map_err(|e| CartoError::History {
                path: path.to_path_buf(),
                message: format!("spawning git failed: {e}"),
            })?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CartoError::History {
                path: path.to_path_buf(),
                message: format!("git log exited with {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(parse_log_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse terse log lines into commit records. Shared with the built-in
/// git artifact source, which uses the same log format.
pub(crate) fn parse_log_output(output: &str) -> Vec<CommitRecord> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.splitn(4, FIELD_SEP);
            let hash = fields.next()?.to_string();
            let author = fields.next()?.to_string();
            let date = fields.next()?.to_string();
            let message = fields.next().unwrap_or("").to_string();
            let pr = extract_pr_number(&message);
            Some(CommitRecord {
                hash,
                author,
                date,
                message,
                pr,
            })
        })
        .collect()
}

/// Pull the first PR reference out of a commit subject.
fn extract_pr_number(message: &str) -> Option<u64> {
    PR_REF
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Assemble a `FileHistory` from parsed commits.
fn build_history(path: &Path, commits: Vec<CommitRecord>) -> FileHistory {
    let mut authors: Vec<String> = Vec::new();
    for commit in &commits {
        if !authors.contains(&commit.author) {
            authors.push(commit.author.clone());
        }
    }

    FileHistory {
        path: path.to_path_buf(),
        churn: commits.len(),
        authors,
        commits,
    }
}
