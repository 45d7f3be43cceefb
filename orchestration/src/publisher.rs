//! Publishing accumulated changes as pull requests.
//!
//! One commit + one pull request per target repository partition. Failures
//! are collected in the [`PublishReport`], never raised: a failed publish does
//! not change the outcome of the agent loop that produced the files.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::accumulator::{AccumulatedFile, FileChangeSet, RepoPartition};
use crate::config::{EngineConfig, RepoRouting, RepoTarget};
use crate::parser::truncate_chars;
use crate::state::{AgentLoop, AgentLoopConfig};

/// Errors from the source-control host
#[derive(Debug, Error)]
pub enum SourceControlError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("No source-control token configured")]
    MissingToken,
}

/// Result type alias for source-control operations
pub type SourceControlResult<T> = Result<T, SourceControlError>;

/// Branch head after a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub branch: String,
    pub sha: String,
}

/// An opened pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

/// Pull request to open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub labels: Vec<String>,
}

/// Source-control host seam
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceControlHost: Send + Sync {
    /// Commit `files` to `branch`, creating it from `base_branch` if needed.
    async fn commit_files(
        &self,
        repo: &RepoTarget,
        base_branch: &str,
        branch: &str,
        files: &[AccumulatedFile],
        message: &str,
    ) -> SourceControlResult<CommitRef>;

    async fn create_pull_request(
        &self,
        repo: &RepoTarget,
        request: &NewPullRequest,
    ) -> SourceControlResult<PullRequestRef>;
}

/// Shared reference to a host
pub type SharedHost = Arc<dyn SourceControlHost>;

/// A pull request opened for one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedPullRequest {
    pub target: RepoTarget,
    pub branch: String,
    pub number: u64,
    pub url: String,
    pub files: usize,
}

/// Result of publishing all partitions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// In partition order
    pub opened: Vec<OpenedPullRequest>,
    /// One note per failed partition
    pub failures: Vec<String>,
}

impl PublishReport {
    /// The first successfully opened pull request
    pub fn primary(&self) -> Option<&OpenedPullRequest> {
        self.opened.first()
    }
}

/// Lowercase dash-separated slug, at most 40 characters.
fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
        if slug.len() >= 40 {
            break;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Branch name for a loop's changes: `{prefix}{short id}-{slug}`.
pub fn branch_name(prefix: &str, task: &AgentLoop) -> String {
    let short: String = task.id.chars().filter(|c| *c != '-').take(8).collect();
    let slug = slugify(&task.title);
    if slug.is_empty() {
        format!("{prefix}{short}")
    } else {
        format!("{prefix}{short}-{slug}")
    }
}

/// Commits and opens pull requests for accumulated changes
pub struct Publisher {
    host: SharedHost,
    routing: RepoRouting,
    branch_prefix: String,
    labels: Vec<String>,
    summary_chars: usize,
}

impl Publisher {
    pub fn new(host: SharedHost, config: &EngineConfig) -> Self {
        Self {
            host,
            routing: config.repositories.clone(),
            branch_prefix: config.branch_prefix.clone(),
            labels: config.pr_labels.clone(),
            summary_chars: config.summary_truncate_chars,
        }
    }

    fn pr_body(
        &self,
        task: &AgentLoop,
        partition: &RepoPartition,
        branch: &str,
        summary: &str,
    ) -> String {
        let changes = partition
            .files
            .iter()
            .map(|f| format!("- `{}` ({})", f.path, f.action))
            .collect::<Vec<_>>()
            .join("\n");
        let summary = if summary.trim().is_empty() {
            "_No summary provided._".to_string()
        } else {
            truncate_chars(summary.trim(), self.summary_chars)
        };
        format!(
            "## {title}\n\n**Repository:** {label}\n**Branch:** `{branch}`\n\n\
### Summary\n\n{summary}\n\n### Changes\n\n{changes}\n\n\
_Generated by agent loop `{id}`._",
            title = task.title,
            label = partition.target.display_label(),
            id = task.id,
        )
    }

    async fn publish_partition(
        &self,
        task: &AgentLoop,
        base_branch: &str,
        branch: &str,
        partition: &RepoPartition,
        summary: &str,
    ) -> Result<OpenedPullRequest, String> {
        if !partition.target.is_configured() {
            return Err("no target repository configured".to_string());
        }
        let repo = partition.target.full_name();

        let message = format!("agent-loop: {}", task.title);
        self.host
            .commit_files(&partition.target, base_branch, branch, &partition.files, &message)
            .await
            .map_err(|e| format!("commit to {repo} failed: {e}"))?;

        let request = NewPullRequest {
            title: task.title.clone(),
            body: self.pr_body(task, partition, branch, summary),
            head: branch.to_string(),
            base: base_branch.to_string(),
            labels: self.labels.clone(),
        };
        let pr = self
            .host
            .create_pull_request(&partition.target, &request)
            .await
            .map_err(|e| format!("pull request on {repo} failed: {e}"))?;

        Ok(OpenedPullRequest {
            target: partition.target.clone(),
            branch: branch.to_string(),
            number: pr.number,
            url: pr.url,
            files: partition.files.len(),
        })
    }

    /// Publish every non-empty partition of `files`.
    ///
    /// `latest_thinking` becomes the PR summary. A configured `target_repo`
    /// replaces the default repository; prefix overrides still apply.
    pub async fn publish(
        &self,
        task: &AgentLoop,
        loop_config: Option<&AgentLoopConfig>,
        files: &FileChangeSet,
        latest_thinking: &str,
    ) -> PublishReport {
        let mut report = PublishReport::default();
        if files.is_empty() {
            return report;
        }

        let routing = match loop_config
            .and_then(|c| c.target_repo.as_deref())
            .and_then(RepoTarget::parse)
        {
            Some(target) => {
                let label = self.routing.default.label.clone();
                self.routing.with_default(target.with_label(label))
            }
            None => self.routing.clone(),
        };
        let base_branch = loop_config
            .map(|c| c.base_branch.as_str())
            .filter(|b| !b.is_empty())
            .unwrap_or("main");
        let branch = branch_name(&self.branch_prefix, task);

        for partition in files.partition(&routing) {
            if partition.files.is_empty() {
                continue;
            }
            match self
                .publish_partition(task, base_branch, &branch, &partition, latest_thinking)
                .await
            {
                Ok(opened) => {
                    info!(
                        loop_id = %task.id,
                        repo = %opened.target.full_name(),
                        pr = opened.number,
                        files = opened.files,
                        "Pull request opened"
                    );
                    report.opened.push(opened);
                }
                Err(note) => {
                    warn!(loop_id = %task.id, error = %note, "Publish failed");
                    report.failures.push(note);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{FileAction, FileChange};
    use mockall::predicate::*;

    fn change(path: &str) -> FileChange {
        FileChange {
            path: path.into(),
            action: FileAction::Update,
            content: Some("x".into()),
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default().with_repositories(
            RepoRouting::new(RepoTarget::new("acme", "app").with_label("Desktop app"))
                .with_override("website", RepoTarget::new("acme", "site")),
        )
    }

    #[test]
    fn test_branch_name() {
        let mut task = AgentLoop::new("Add session search (fuzzy!)");
        task.id = "1234abcd-ef00-0000-0000-000000000000".into();
        assert_eq!(
            branch_name("agent-loop/", &task),
            "agent-loop/1234abcd-add-session-search-fuzzy"
        );
        task.title = "!!!".into();
        assert_eq!(branch_name("agent-loop/", &task), "agent-loop/1234abcd");
    }

    #[tokio::test]
    async fn test_publish_one_pr_per_partition() {
        let mut host = MockSourceControlHost::new();
        host.expect_commit_files()
            .times(2)
            .returning(|_, _, branch, _, _| {
                Ok(CommitRef {
                    branch: branch.to_string(),
                    sha: "abc".into(),
                })
            });
        host.expect_create_pull_request()
            .with(
                function(|repo: &RepoTarget| repo.name == "app"),
                function(|req: &NewPullRequest| {
                    req.body.contains("**Repository:** Desktop app")
                        && req.body.contains("- `src/a.ts` (update)")
                        && req.base == "main"
                        && req.labels == vec!["agent-loop".to_string()]
                }),
            )
            .times(1)
            .returning(|_, _| {
                Ok(PullRequestRef {
                    number: 7,
                    url: "https://github.com/acme/app/pull/7".into(),
                })
            });
        host.expect_create_pull_request()
            .with(function(|repo: &RepoTarget| repo.name == "site"), always())
            .times(1)
            .returning(|_, _| {
                Ok(PullRequestRef {
                    number: 3,
                    url: "https://github.com/acme/site/pull/3".into(),
                })
            });

        let publisher = Publisher::new(Arc::new(host), &config());
        let mut files = FileChangeSet::new();
        files.merge(&[change("src/a.ts"), change("website/index.html")]);
        let task = AgentLoop::new("Search");

        let report = publisher.publish(&task, None, &files, "did things").await;
        assert!(report.failures.is_empty());
        assert_eq!(report.opened.len(), 2);
        assert_eq!(report.primary().unwrap().number, 7);
    }

    #[tokio::test]
    async fn test_commit_failure_is_collected() {
        let mut host = MockSourceControlHost::new();
        host.expect_commit_files()
            .returning(|_, _, _, _, _| {
                Err(SourceControlError::Api {
                    status: 422,
                    message: "Reference already exists".into(),
                })
            });
        host.expect_create_pull_request().never();

        let publisher = Publisher::new(Arc::new(host), &config());
        let mut files = FileChangeSet::new();
        files.merge(&[change("src/a.ts")]);

        let report = publisher
            .publish(&AgentLoop::new("Search"), None, &files, "")
            .await;
        assert!(report.primary().is_none());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("Reference already exists"));
    }

    #[tokio::test]
    async fn test_target_repo_and_base_branch_from_loop_config() {
        let mut host = MockSourceControlHost::new();
        host.expect_commit_files()
            .with(
                function(|repo: &RepoTarget| repo.full_name() == "acme/fork"),
                eq("develop"),
                always(),
                function(|files: &[AccumulatedFile]| files.len() == 1),
                always(),
            )
            .times(1)
            .returning(|_, _, branch, _, _| {
                Ok(CommitRef {
                    branch: branch.to_string(),
                    sha: "def".into(),
                })
            });
        host.expect_create_pull_request()
            .times(1)
            .returning(|_, _| {
                Ok(PullRequestRef {
                    number: 1,
                    url: "u".into(),
                })
            });

        let publisher = Publisher::new(Arc::new(host), &config());
        let mut loop_config = AgentLoopConfig::new(3);
        loop_config.target_repo = Some("acme/fork".into());
        loop_config.base_branch = "develop".into();
        let mut files = FileChangeSet::new();
        files.merge(&[change("src/a.ts")]);

        let report = publisher
            .publish(&AgentLoop::new("Fork"), Some(&loop_config), &files, "")
            .await;
        assert_eq!(report.opened.len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_repository_fails_without_calls() {
        let mut host = MockSourceControlHost::new();
        host.expect_commit_files().never();
        let publisher = Publisher::new(Arc::new(host), &EngineConfig::default());
        let mut files = FileChangeSet::new();
        files.merge(&[change("a.ts")]);

        let report = publisher
            .publish(&AgentLoop::new("x"), None, &files, "")
            .await;
        assert_eq!(report.failures, vec!["no target repository configured"]);
    }

    #[tokio::test]
    async fn test_empty_change_set_publishes_nothing() {
        let host = MockSourceControlHost::new();
        let publisher = Publisher::new(Arc::new(host), &config());
        let report = publisher
            .publish(&AgentLoop::new("x"), None, &FileChangeSet::new(), "")
            .await;
        assert_eq!(report, PublishReport::default());
    }
}
