//! Agent loop engine — queued → running → (think/act/observe)×N → outcome.
//!
//! [`AgentLoopEngine::advance`] runs exactly one iteration from persisted
//! state. The conversation and the accumulated file set are both rebuilt from
//! the stored iterations, so a loop can be resumed by any worker after a
//! restart. Cancellation is observed by re-reading the record at the top of
//! every iteration and again before anything is written after a reasoning
//! call.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::conversation::Conversation;
use crate::accumulator::FileChangeSet;
use crate::config::{pause, EngineConfig};
use crate::context::{
    push_target_item, ContextProvider, ContextSections, IssueLookup, NoIssueLookup, StaticContext,
};
use crate::error::{EngineError, EngineResult};
use crate::notify::{NoopNotifier, SharedNotifier, WorkflowEvent};
use crate::parser::{parse_iteration, LoopSignal};
use crate::prompts;
use crate::publisher::{PublishReport, Publisher, SharedHost};
use crate::reasoning::{InvokeOptions, ReasoningRequest, SharedReasoning};
use crate::roster::implementer;
use crate::state::{
    new_id, AgentIteration, AgentLoop, AgentLoopConfig, AgentLoopStatus, DeliberationStatus,
    IterationPhase, SharedStore, StoreError, TokenUsage,
};

/// How many times `cancel` retries on a version conflict
const CANCEL_ATTEMPTS: usize = 3;

/// How a loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Done,
    Blocked(String),
    Exhausted,
}

/// Drives agent loops stored in a [`SharedStore`]
pub struct AgentLoopEngine {
    store: SharedStore,
    reasoning: SharedReasoning,
    context: Arc<dyn ContextProvider>,
    issues: Arc<dyn IssueLookup>,
    notifier: SharedNotifier,
    publisher: Option<Publisher>,
    config: EngineConfig,
}

impl AgentLoopEngine {
    pub fn new(store: SharedStore, reasoning: SharedReasoning, config: EngineConfig) -> Self {
        Self {
            store,
            reasoning,
            context: Arc::new(StaticContext(String::new())),
            issues: Arc::new(NoIssueLookup),
            notifier: Arc::new(NoopNotifier),
            publisher: None,
            config,
        }
    }

    pub fn with_context(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = context;
        self
    }

    pub fn with_issue_lookup(mut self, issues: Arc<dyn IssueLookup>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Publish finished loops through `host`.
    pub fn with_host(mut self, host: SharedHost) -> Self {
        self.publisher = Some(Publisher::new(host, &self.config));
        self
    }

    /// Persist a new loop in `queued`.
    pub async fn create(&self, agent_loop: AgentLoop) -> EngineResult<AgentLoop> {
        self.store.create_agent_loop(&agent_loop).await?;
        info!(loop_id = %agent_loop.id, title = %agent_loop.title, "Agent loop created");
        Ok(agent_loop)
    }

    // =========================================================================
    // Entry points (never propagate errors)
    // =========================================================================

    /// Run iterations until the loop reaches a terminal status.
    pub async fn run(&self, id: &str) -> AgentLoopStatus {
        loop {
            let status = self.advance(id).await;
            if status.is_terminal() {
                return status;
            }
            pause(self.config.pacing.inter_iteration()).await;
        }
    }

    /// Run one iteration (or finalize a loop whose last iteration ended it).
    pub async fn advance(&self, id: &str) -> AgentLoopStatus {
        match self.try_advance(id).await {
            Ok(status) => status,
            Err(e) => self.mark_failed(id, &e).await,
        }
    }

    /// Stop a loop. Terminal loops are left unchanged.
    pub async fn cancel(&self, id: &str) -> EngineResult<AgentLoopStatus> {
        let mut last_conflict = None;
        for _ in 0..CANCEL_ATTEMPTS {
            let mut record = self.store.get_agent_loop(id).await?;
            if record.status.is_terminal() {
                return Ok(record.status);
            }
            record.status = AgentLoopStatus::Cancelled;
            record.completed_at = Some(Utc::now());
            match self.store.update_agent_loop(&record).await {
                Ok(_) => {
                    info!(loop_id = %id, "Agent loop cancelled");
                    return Ok(AgentLoopStatus::Cancelled);
                }
                Err(e @ StoreError::Conflict { .. }) => {
                    debug!(loop_id = %id, "Cancel raced with a writer; retrying");
                    last_conflict = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_conflict
            .map(EngineError::from)
            .unwrap_or_else(|| EngineError::MissingRecord(format!("agent loop {id}"))))
    }

    /// Like [`advance`](Self::advance) but returns the error instead of
    /// recording it.
    pub async fn try_advance(&self, id: &str) -> EngineResult<AgentLoopStatus> {
        let mut record = self.store.get_agent_loop(id).await?;
        if record.status.is_terminal() {
            return Ok(record.status);
        }
        if record.status == AgentLoopStatus::Queued {
            record.status = AgentLoopStatus::Running;
            record.started_at = Some(Utc::now());
            record = self.store.update_agent_loop(&record).await?;
            info!(loop_id = %id, "Agent loop started");
        }

        let loop_config = self.loop_config(&record).await?;
        let mut iterations = self.store.list_iterations(id).await?;

        // A crash between the final iteration and the outcome write leaves
        // the deciding iteration persisted; finish from it.
        if let Some(last) = iterations.last() {
            if last.phase == IterationPhase::Complete {
                let report = parse_iteration(&last.response).into_inner();
                let outcome = match report.signal {
                    LoopSignal::Blocked => Outcome::Blocked(report.blocked_reason.unwrap_or_default()),
                    _ => Outcome::Done,
                };
                return self.conclude(id, outcome, &loop_config, &iterations).await;
            }
        }
        let done = iterations.iter().map(|it| it.number).max().unwrap_or(0);
        if done >= loop_config.max_iterations {
            return self
                .conclude(id, Outcome::Exhausted, &loop_config, &iterations)
                .await;
        }
        let number = done + 1;

        let agent = implementer();
        let system_prompt = prompts::agent_loop_system_prompt(&agent, &loop_config);
        let context = self.build_context(&record, &loop_config).await?;
        let seed = prompts::agent_loop_seed(&record.title, &context, loop_config.max_iterations);
        let mut conversation = Conversation::rebuild(seed, &iterations, loop_config.max_iterations);
        conversation.trim_to_budget(self.config.conversation_budget_chars);

        debug!(
            loop_id = %id,
            iteration = number,
            messages = conversation.len(),
            chars = conversation.serialized_len(),
            prompt_version = prompts::PROMPT_VERSION,
            "Invoking implementer"
        );
        let started = Instant::now();
        let result = self
            .reasoning
            .invoke(ReasoningRequest {
                activity: "agent_loop.iteration".to_string(),
                system_prompt,
                messages: conversation.into_messages(),
                options: InvokeOptions {
                    max_output_tokens: self.config.max_output_tokens,
                    model: Some(agent.model.clone()),
                    correlation: Some(format!("{id}:{number}")),
                },
            })
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        // Cancelled while the call was in flight: write nothing more.
        let current = self.store.get_agent_loop(id).await?;
        if current.status.is_terminal() {
            info!(loop_id = %id, status = %current.status, "Loop ended during iteration; discarding result");
            return Ok(current.status);
        }

        let completion = match result {
            Ok(completion) => completion,
            Err(e) => {
                warn!(loop_id = %id, iteration = number, error = %e, "Iteration failed");
                self.store
                    .create_iteration(&AgentIteration {
                        id: new_id(),
                        loop_id: id.to_string(),
                        number,
                        phase: IterationPhase::Error,
                        thinking: String::new(),
                        action: String::new(),
                        observation: String::new(),
                        files_changed: Vec::new(),
                        response: String::new(),
                        error: Some(e.to_string()),
                        usage: TokenUsage::default(),
                        duration_ms,
                        created_at: Utc::now(),
                    })
                    .await?;
                if number >= loop_config.max_iterations {
                    iterations = self.store.list_iterations(id).await?;
                    return self
                        .conclude(id, Outcome::Exhausted, &loop_config, &iterations)
                        .await;
                }
                return Ok(AgentLoopStatus::Running);
            }
        };

        let parsed = parse_iteration(&completion.content);
        if parsed.is_malformed() {
            debug!(loop_id = %id, iteration = number, "Response had no protocol sections");
        }
        let report = parsed.into_inner();
        let usage = completion.usage();
        let phase = match report.signal {
            LoopSignal::Continue => IterationPhase::Thinking,
            LoopSignal::Done | LoopSignal::Blocked => IterationPhase::Complete,
        };
        let iteration = AgentIteration {
            id: new_id(),
            loop_id: id.to_string(),
            number,
            phase,
            thinking: report.thinking.clone(),
            action: report.action.clone(),
            observation: report.observation.clone(),
            files_changed: report.files_changed.clone(),
            response: completion.content,
            error: None,
            usage,
            duration_ms,
            created_at: Utc::now(),
        };
        self.store.create_iteration(&iteration).await?;

        let mut current = current;
        current.usage.add(usage);
        self.store.update_agent_loop(&current).await?;
        info!(
            loop_id = %id,
            iteration = number,
            signal = ?report.signal,
            files = report.files_changed.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            duration_ms,
            "Iteration recorded"
        );

        iterations.push(iteration);
        match report.signal {
            LoopSignal::Done => {
                self.conclude(id, Outcome::Done, &loop_config, &iterations)
                    .await
            }
            LoopSignal::Blocked => {
                let reason = report.blocked_reason.unwrap_or_default();
                self.conclude(id, Outcome::Blocked(reason), &loop_config, &iterations)
                    .await
            }
            LoopSignal::Continue if number >= loop_config.max_iterations => {
                self.conclude(id, Outcome::Exhausted, &loop_config, &iterations)
                    .await
            }
            LoopSignal::Continue => Ok(AgentLoopStatus::Running),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn loop_config(&self, record: &AgentLoop) -> EngineResult<AgentLoopConfig> {
        match &record.config_id {
            Some(config_id) => match self.store.get_loop_config(config_id).await {
                Ok(config) => Ok(config),
                Err(StoreError::NotFound { .. }) => Err(EngineError::MissingRecord(format!(
                    "agent loop config {config_id}"
                ))),
                Err(e) => Err(e.into()),
            },
            None => Ok(AgentLoopConfig::new(self.config.default_max_iterations)),
        }
    }

    async fn build_context(
        &self,
        record: &AgentLoop,
        loop_config: &AgentLoopConfig,
    ) -> EngineResult<String> {
        let mut sections = ContextSections::new();
        push_target_item(
            &mut sections,
            self.store.as_ref(),
            self.issues.as_ref(),
            record.target_item_id.as_deref(),
        )
        .await?;

        if let Some(deliberation_id) = &record.deliberation_id {
            match self.store.get_deliberation(deliberation_id).await {
                Ok(d) if d.status == DeliberationStatus::Decided => {
                    sections.push("Prior Decision Summary", d.summary.unwrap_or_default());
                    sections.push("Prior Decision", d.decision.unwrap_or_default());
                }
                Ok(d) => {
                    warn!(loop_id = %record.id, deliberation_id = %d.id, status = %d.status, "Linked deliberation is not decided; ignoring it");
                }
                Err(StoreError::NotFound { .. }) => {
                    warn!(loop_id = %record.id, deliberation_id = %deliberation_id, "Linked deliberation not found");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let bullets = |paths: &[String]| {
            paths
                .iter()
                .map(|p| format!("- `{p}`"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        sections.push("Allowed Paths", bullets(&loop_config.allowed_paths));
        sections.push(
            "Forbidden Paths (never modify)",
            bullets(&loop_config.forbidden_paths),
        );
        sections.push("Instructions", record.instructions.clone());
        if let Some(feedback) = record.feedback.as_deref().filter(|f| !f.trim().is_empty()) {
            sections.push("Previous Attempt", prompts::feedback_section(feedback));
        }
        sections.push("Codebase Context", self.context.get_context().await);
        Ok(sections.render())
    }

    /// Thinking of the latest successful iteration
    fn latest_thinking(iterations: &[AgentIteration]) -> String {
        iterations
            .iter()
            .filter(|it| it.phase != IterationPhase::Error)
            .max_by_key(|it| it.number)
            .map(|it| it.thinking.clone())
            .unwrap_or_default()
    }

    /// Record the outcome, publishing accumulated files on success.
    async fn conclude(
        &self,
        id: &str,
        outcome: Outcome,
        loop_config: &AgentLoopConfig,
        iterations: &[AgentIteration],
    ) -> EngineResult<AgentLoopStatus> {
        let files = FileChangeSet::from_iterations(iterations);
        let (status, error) = match &outcome {
            Outcome::Done => (AgentLoopStatus::AwaitingReview, None),
            Outcome::Blocked(reason) => {
                let reason = if reason.trim().is_empty() {
                    "no reason given"
                } else {
                    reason.trim()
                };
                (AgentLoopStatus::Failed, Some(format!("Agent blocked: {reason}")))
            }
            Outcome::Exhausted if !files.is_empty() => (AgentLoopStatus::Completed, None),
            Outcome::Exhausted => (
                AgentLoopStatus::Failed,
                Some(format!(
                    "Reached {} iterations without producing any file changes",
                    loop_config.max_iterations
                )),
            ),
        };

        let mut record = self.store.get_agent_loop(id).await?;
        if record.status.is_terminal() {
            return Ok(record.status);
        }

        let report = if status.is_success() && !files.is_empty() {
            match &self.publisher {
                Some(publisher) => {
                    publisher
                        .publish(
                            &record,
                            Some(loop_config),
                            &files,
                            &Self::latest_thinking(iterations),
                        )
                        .await
                }
                None => {
                    info!(loop_id = %id, files = files.len(), "No source-control host configured; skipping publish");
                    PublishReport::default()
                }
            }
        } else {
            PublishReport::default()
        };

        // Publishing can take a while; pick up any concurrent write.
        if !report.opened.is_empty() || !report.failures.is_empty() {
            record = self.store.get_agent_loop(id).await?;
            if record.status.is_terminal() {
                return Ok(record.status);
            }
        }

        record.status = status;
        record.completed_at = Some(Utc::now());
        if let Some(error) = &error {
            record.append_error(error);
        }
        if let Some(primary) = report.primary() {
            record.pr_number = Some(primary.number);
            record.pr_url = Some(primary.url.clone());
            record.branch = Some(primary.branch.clone());
        }
        for failure in &report.failures {
            record.append_error(&format!("Publish failed: {failure}"));
        }
        let record = self.store.update_agent_loop(&record).await?;
        info!(
            loop_id = %id,
            status = %record.status,
            files = files.len(),
            pull_requests = report.opened.len(),
            input_tokens = record.usage.input_tokens,
            output_tokens = record.usage.output_tokens,
            "Agent loop finished"
        );

        for opened in &report.opened {
            self.notifier
                .notify(WorkflowEvent::PullRequestOpened {
                    loop_id: record.id.clone(),
                    repo: opened.target.full_name(),
                    number: opened.number,
                    url: opened.url.clone(),
                })
                .await;
        }
        let event = if status.is_success() {
            WorkflowEvent::AgentLoopFinished {
                id: record.id.clone(),
                title: record.title.clone(),
                status: status.to_string(),
                files: files.len(),
            }
        } else {
            WorkflowEvent::AgentLoopFailed {
                id: record.id.clone(),
                title: record.title.clone(),
                error: error.unwrap_or_default(),
            }
        };
        self.notifier.notify(event).await;
        Ok(status)
    }

    /// Record a fatal error. Best-effort; terminal loops are left alone.
    async fn mark_failed(&self, id: &str, error: &EngineError) -> AgentLoopStatus {
        warn!(loop_id = %id, error = %error, "Agent loop failed");
        let mut record = match self.store.get_agent_loop(id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(loop_id = %id, error = %e, "Could not load agent loop to record failure");
                return AgentLoopStatus::Failed;
            }
        };
        if record.status.is_terminal() {
            return record.status;
        }

        record.status = AgentLoopStatus::Failed;
        record.append_error(&error.to_string());
        record.completed_at = Some(Utc::now());
        if let Err(e) = self.store.update_agent_loop(&record).await {
            warn!(loop_id = %id, error = %e, "Could not record agent loop failure");
        }
        self.notifier
            .notify(WorkflowEvent::AgentLoopFailed {
                id: record.id.clone(),
                title: record.title.clone(),
                error: error.to_string(),
            })
            .await;
        AgentLoopStatus::Failed
    }
}
