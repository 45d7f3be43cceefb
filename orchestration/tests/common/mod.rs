//! Shared fakes for the engine integration tests: a scripted reasoning
//! adapter, a recording source-control host and a collecting notifier.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use orchestration::accumulator::AccumulatedFile;
use orchestration::config::{EngineConfig, PacingConfig, RepoRouting, RepoTarget};
use orchestration::notify::{WorkflowEvent, WorkflowNotifier};
use orchestration::publisher::{
    CommitRef, NewPullRequest, PullRequestRef, SourceControlError, SourceControlHost,
    SourceControlResult,
};
use orchestration::reasoning::{
    Completion, ReasoningAdapter, ReasoningError, ReasoningRequest, ReasoningResult,
};

type Handler = dyn Fn(&ReasoningRequest) -> ReasoningResult<String> + Send + Sync;

/// Answers every call through a handler and records the request.
pub struct ScriptedReasoning {
    handler: Box<Handler>,
    calls: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedReasoning {
    pub fn new(
        handler: impl Fn(&ReasoningRequest) -> ReasoningResult<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Replies in order, one per call; errors once the script runs out.
    pub fn sequence(replies: Vec<ReasoningResult<String>>) -> Arc<Self> {
        let replies = Mutex::new(replies.into_iter());
        Self::new(move |_| {
            replies
                .lock()
                .unwrap()
                .next()
                .unwrap_or_else(|| Err(ReasoningError::Request("script exhausted".into())))
        })
    }

    pub fn calls(&self) -> Vec<ReasoningRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, activity: &str) -> Vec<ReasoningRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.activity == activity)
            .collect()
    }
}

#[async_trait]
impl ReasoningAdapter for ScriptedReasoning {
    async fn invoke(&self, request: ReasoningRequest) -> ReasoningResult<Completion> {
        let reply = (self.handler)(&request);
        let model = request.options.model.clone().unwrap_or_default();
        self.calls.lock().unwrap().push(request);
        reply.map(|content| Completion {
            content,
            model,
            input_tokens: 100,
            output_tokens: 50,
        })
    }
}

/// Agent name carried in the correlation tag (`{record id}:{agent}`).
pub fn agent_of(request: &ReasoningRequest) -> String {
    request
        .options
        .correlation
        .as_deref()
        .and_then(|c| c.split_once(':'))
        .map(|(_, agent)| agent.to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct RecordedCommit {
    pub repo: String,
    pub base_branch: String,
    pub branch: String,
    pub files: Vec<AccumulatedFile>,
}

/// Records commits and pull requests; optionally fails commits to one repo.
#[derive(Default)]
pub struct RecordingHost {
    pub commits: Mutex<Vec<RecordedCommit>>,
    pub pulls: Mutex<Vec<(String, NewPullRequest)>>,
    pub fail_repo: Option<String>,
}

impl RecordingHost {
    pub fn failing_for(repo: &str) -> Self {
        Self {
            fail_repo: Some(repo.to_string()),
            ..Self::default()
        }
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        self.commits.lock().unwrap().clone()
    }

    pub fn pulls(&self) -> Vec<(String, NewPullRequest)> {
        self.pulls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceControlHost for RecordingHost {
    async fn commit_files(
        &self,
        repo: &RepoTarget,
        base_branch: &str,
        branch: &str,
        files: &[AccumulatedFile],
        _message: &str,
    ) -> SourceControlResult<CommitRef> {
        if self.fail_repo.as_deref() == Some(repo.full_name().as_str()) {
            return Err(SourceControlError::Api {
                status: 422,
                message: "Reference update failed".into(),
            });
        }
        self.commits.lock().unwrap().push(RecordedCommit {
            repo: repo.full_name(),
            base_branch: base_branch.to_string(),
            branch: branch.to_string(),
            files: files.to_vec(),
        });
        Ok(CommitRef {
            branch: branch.to_string(),
            sha: "abc123".into(),
        })
    }

    async fn create_pull_request(
        &self,
        repo: &RepoTarget,
        request: &NewPullRequest,
    ) -> SourceControlResult<PullRequestRef> {
        let mut pulls = self.pulls.lock().unwrap();
        pulls.push((repo.full_name(), request.clone()));
        let number = pulls.len() as u64 + 40;
        Ok(PullRequestRef {
            number,
            url: format!("https://github.com/{}/pull/{number}", repo.full_name()),
        })
    }
}

/// Collects every event
#[derive(Default)]
pub struct CollectingNotifier {
    pub events: Mutex<Vec<WorkflowEvent>>,
}

impl CollectingNotifier {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

#[async_trait]
impl WorkflowNotifier for CollectingNotifier {
    async fn notify(&self, event: WorkflowEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Engine config with no pacing and a single default repository.
pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_pacing(PacingConfig::none())
        .with_repositories(RepoRouting::new(
            RepoTarget::new("acme", "app").with_label("App"),
        ))
}

/// A well-formed proposal body
pub fn proposal_text(agent: &str) -> String {
    format!(
        "## Approach\n\n{agent} suggests a plan.\n\n\
**Strengths**: Clear.\n**Risks**: Some.\n**Effort**: Two days."
    )
}

/// A well-formed agent loop iteration
pub fn iteration_text(status: &str, files: &[(&str, &str)]) -> String {
    let mut blocks = String::new();
    for (path, content) in files {
        blocks.push_str(&format!("```file:{path}\n{content}\n```\n\n"));
    }
    format!(
        "### Thinking\nWorking through the task.\n\n### Action\nEditing files.\n\n{blocks}\
### Observation\nLooks right.\n\n### Status\n**{status}**\n"
    )
}
