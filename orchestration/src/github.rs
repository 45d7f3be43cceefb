//! GitHub REST client: commits through the Git data API, pull requests, and
//! linked-issue lookup.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::accumulator::AccumulatedFile;
use crate::config::RepoTarget;
use crate::context::IssueLookup;
use crate::parser::FileAction;
use crate::publisher::{
    CommitRef, NewPullRequest, PullRequestRef, SourceControlError, SourceControlHost,
    SourceControlResult,
};

pub const GITHUB_API_URL: &str = "https://api.github.com";
const API_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = "orchestrator-worker";

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// Truncate an API error body and redact anything that looks like a credential.
fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "ghp_",
        "gho_",
        "ghu_",
        "github_pat_",
    ];

    let truncated: String = if body.chars().count() > MAX_ERROR_BODY_LEN {
        let head: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
        format!("{head}... (truncated)")
    } else {
        body.to_string()
    };

    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|p| lower.contains(p)) {
        return "(error details redacted - may contain sensitive data)".to_string();
    }
    truncated
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Human-readable message from a GitHub error response body.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_error) => {
            let detail = api_error
                .errors
                .first()
                .and_then(|e| e.message.clone())
                .unwrap_or_default();
            if detail.is_empty() {
                api_error.message
            } else {
                format!("{}: {}", api_error.message, detail)
            }
        }
        Err(_) => sanitize_error_body(body),
    }
}

/// Tree entries for a commit; deletes are entries with a null sha.
fn tree_entries(files: &[AccumulatedFile]) -> Vec<Value> {
    files
        .iter()
        .map(|f| match (f.action, &f.content) {
            (FileAction::Delete, _) | (_, None) => json!({
                "path": f.path,
                "mode": "100644",
                "type": "blob",
                "sha": Value::Null,
            }),
            (_, Some(content)) => json!({
                "path": f.path,
                "mode": "100644",
                "type": "blob",
                "content": content,
            }),
        })
        .collect()
}

/// GitHub API client
pub struct GitHubHost {
    api_base: String,
    token: Option<String>,
    /// Repository used for issue lookups
    issue_repo: Option<RepoTarget>,
    client: reqwest::Client,
}

impl GitHubHost {
    pub fn new(token: Option<String>) -> SourceControlResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .map_err(|e| SourceControlError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_base: GITHUB_API_URL.to_string(),
            token: token.filter(|t| !t.is_empty()),
            issue_repo: None,
            client,
        })
    }

    /// Point at a different API root (GitHub Enterprise, test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_issue_repo(mut self, repo: RepoTarget) -> Self {
        self.issue_repo = Some(repo);
        self
    }

    fn request(&self, method: Method, repo: &RepoTarget, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/repos/{}/{}/{}",
            self.api_base, repo.owner, repo.name, path
        );
        let mut builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder
    }

    /// Send and decode JSON; `Ok(None)` for 404.
    async fn send(&self, builder: RequestBuilder) -> SourceControlResult<Option<Value>> {
        let resp = builder
            .send()
            .await
            .map_err(|e| SourceControlError::Request(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceControlError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }
        resp.json::<Value>()
            .await
            .map(Some)
            .map_err(|e| SourceControlError::Request(format!("invalid JSON response: {e}")))
    }

    /// Like [`send`](Self::send) but a 404 is an error.
    async fn send_required(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> SourceControlResult<Value> {
        self.send(builder).await?.ok_or_else(|| SourceControlError::Api {
            status: 404,
            message: format!("{what} not found"),
        })
    }

    fn require_token(&self) -> SourceControlResult<()> {
        if self.token.is_none() {
            return Err(SourceControlError::MissingToken);
        }
        Ok(())
    }

    async fn branch_head(&self, repo: &RepoTarget, branch: &str) -> SourceControlResult<Option<String>> {
        let value = self
            .send(self.request(Method::GET, repo, &format!("git/ref/heads/{branch}")))
            .await?;
        Ok(value.and_then(|v| v["object"]["sha"].as_str().map(str::to_string)))
    }

    fn sha_field(value: &Value, field: &str) -> SourceControlResult<String> {
        value[field]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SourceControlError::Request(format!("response missing '{field}'")))
    }
}

#[async_trait]
impl SourceControlHost for GitHubHost {
    async fn commit_files(
        &self,
        repo: &RepoTarget,
        base_branch: &str,
        branch: &str,
        files: &[AccumulatedFile],
        message: &str,
    ) -> SourceControlResult<CommitRef> {
        self.require_token()?;

        let existing_head = self.branch_head(repo, branch).await?;
        let parent = match &existing_head {
            Some(sha) => sha.clone(),
            None => self
                .branch_head(repo, base_branch)
                .await?
                .ok_or_else(|| SourceControlError::Api {
                    status: 404,
                    message: format!("base branch '{base_branch}' not found"),
                })?,
        };

        let parent_commit = self
            .send_required(
                self.request(Method::GET, repo, &format!("git/commits/{parent}")),
                "parent commit",
            )
            .await?;
        let base_tree = parent_commit["tree"]["sha"]
            .as_str()
            .ok_or_else(|| SourceControlError::Request("commit has no tree".into()))?
            .to_string();

        let tree = self
            .send_required(
                self.request(Method::POST, repo, "git/trees").json(&json!({
                    "base_tree": base_tree,
                    "tree": tree_entries(files),
                })),
                "tree",
            )
            .await?;
        let tree_sha = Self::sha_field(&tree, "sha")?;

        let commit = self
            .send_required(
                self.request(Method::POST, repo, "git/commits").json(&json!({
                    "message": message,
                    "tree": tree_sha,
                    "parents": [parent],
                })),
                "commit",
            )
            .await?;
        let commit_sha = Self::sha_field(&commit, "sha")?;

        if existing_head.is_some() {
            self.send_required(
                self.request(Method::PATCH, repo, &format!("git/refs/heads/{branch}"))
                    .json(&json!({"sha": commit_sha, "force": false})),
                "branch ref",
            )
            .await?;
        } else {
            self.send_required(
                self.request(Method::POST, repo, "git/refs").json(&json!({
                    "ref": format!("refs/heads/{branch}"),
                    "sha": commit_sha,
                })),
                "branch ref",
            )
            .await?;
        }

        debug!(repo = %repo.full_name(), branch, sha = %commit_sha, files = files.len(), "Committed files");
        Ok(CommitRef {
            branch: branch.to_string(),
            sha: commit_sha,
        })
    }

    async fn create_pull_request(
        &self,
        repo: &RepoTarget,
        request: &NewPullRequest,
    ) -> SourceControlResult<PullRequestRef> {
        self.require_token()?;

        let pr = self
            .send_required(
                self.request(Method::POST, repo, "pulls").json(&json!({
                    "title": request.title,
                    "body": request.body,
                    "head": request.head,
                    "base": request.base,
                })),
                "repository",
            )
            .await?;

        let number = pr["number"]
            .as_u64()
            .ok_or_else(|| SourceControlError::Request("pull response missing 'number'".into()))?;
        let url = pr["html_url"].as_str().unwrap_or_default().to_string();

        if !request.labels.is_empty() {
            let labels = self
                .send(
                    self.request(Method::POST, repo, &format!("issues/{number}/labels"))
                        .json(&json!({"labels": request.labels})),
                )
                .await;
            if let Err(e) = labels {
                warn!(repo = %repo.full_name(), pr = number, error = %e, "Failed to label pull request");
            }
        }

        Ok(PullRequestRef { number, url })
    }
}

#[async_trait]
impl IssueLookup for GitHubHost {
    async fn issue_body(&self, number: u64) -> Option<String> {
        let repo = self.issue_repo.as_ref()?;
        match self
            .send(self.request(Method::GET, repo, &format!("issues/{number}")))
            .await
        {
            Ok(Some(issue)) => issue["body"]
                .as_str()
                .map(str::to_string)
                .filter(|b| !b.trim().is_empty()),
            Ok(None) => None,
            Err(e) => {
                warn!(issue = number, error = %e, "Issue lookup failed");
                None
            }
        }
    }
}
