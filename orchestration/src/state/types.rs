//! Core record types for workflow persistence
//!
//! These types are stored by a [`WorkflowStore`](super::WorkflowStore) and are
//! the durable source of truth for resuming deliberations and agent loops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for any persisted record
pub type RecordId = String;

/// Generate a fresh record id
pub fn new_id() -> RecordId {
    uuid::Uuid::new_v4().to_string()
}

/// Kind of workflow, used to select the agent roster and proposal prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Deliberation over how to implement a work item
    ImplementationPlan,
    /// Deliberation reviewing the architecture around a work item
    ArchitectureReview,
    /// Single-agent think/act/observe loop
    AgentLoop,
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImplementationPlan => write!(f, "implementation_plan"),
            Self::ArchitectureReview => write!(f, "architecture_review"),
            Self::AgentLoop => write!(f, "agent_loop"),
        }
    }
}

/// Input/output token counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A story/epic-like work item that workflows can target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    /// Linked issue number on the source-control host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,
}

// =============================================================================
// Deliberation records
// =============================================================================

/// Phase of a deliberation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliberationStatus {
    Proposing,
    Debating,
    Voting,
    Decided,
    Failed,
}

impl DeliberationStatus {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Decided | Self::Failed)
    }

    /// Valid transitions from this phase. Any active phase may fail.
    pub fn valid_transitions(self) -> &'static [DeliberationStatus] {
        match self {
            Self::Proposing => &[Self::Debating, Self::Failed],
            Self::Debating => &[Self::Voting, Self::Failed],
            Self::Voting => &[Self::Decided, Self::Failed],
            Self::Decided | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(self, to: DeliberationStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl std::fmt::Display for DeliberationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposing => write!(f, "proposing"),
            Self::Debating => write!(f, "debating"),
            Self::Voting => write!(f, "voting"),
            Self::Decided => write!(f, "decided"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A multi-agent deliberation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliberation {
    pub id: RecordId,
    pub kind: WorkflowKind,
    pub title: String,
    /// Free-text custom instructions from the requester
    #[serde(default)]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_item_id: Option<RecordId>,
    pub status: DeliberationStatus,
    /// Synthesized decision document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    /// Short bulleted executive summary (empty if generation failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Name of the winning agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_proposal_id: Option<RecordId>,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version, bumped by the store on every update
    #[serde(default)]
    pub version: u64,
}

impl Deliberation {
    /// Create a queued deliberation (status `proposing`, not yet started)
    pub fn new(kind: WorkflowKind, title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            kind,
            title: title.into(),
            instructions: String::new(),
            target_item_id: None,
            status: DeliberationStatus::Proposing,
            decision: None,
            summary: None,
            winner: None,
            winning_proposal_id: None,
            usage: TokenUsage::default(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            version: 0,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_target_item(mut self, item_id: impl Into<String>) -> Self {
        self.target_item_id = Some(item_id.into());
        self
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} | kind={} | tokens={}",
            self.status,
            self.title,
            self.kind,
            self.usage.total()
        )
    }
}

/// One agent's proposal within a deliberation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: RecordId,
    pub deliberation_id: RecordId,
    pub agent_name: String,
    pub model: String,
    pub content: String,
    pub strengths: String,
    pub risks: String,
    pub effort: String,
    #[serde(default)]
    pub usage: TokenUsage,
    pub created_at: DateTime<Utc>,
}

/// One agent's critique for a debate round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateEntry {
    pub id: RecordId,
    pub deliberation_id: RecordId,
    /// Round number (1 or 2)
    pub round: u32,
    pub agent_name: String,
    pub content: String,
    /// Proposal ids this entry was conditioned on
    pub references: Vec<RecordId>,
    pub created_at: DateTime<Utc>,
}

/// One agent's vote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: RecordId,
    pub deliberation_id: RecordId,
    pub agent_name: String,
    /// Agent name the vote was cast for (never equal to `agent_name`)
    pub voted_for: String,
    /// Resolved proposal of the voted-for agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<RecordId>,
    pub reasoning: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Agent loop records
// =============================================================================

/// Status of an agent loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentLoopStatus {
    Queued,
    Running,
    AwaitingReview,
    Completed,
    Failed,
    Cancelled,
}

impl AgentLoopStatus {
    /// Whether the engine is done with this loop.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }

    /// Whether the loop produced an implementation worth publishing.
    pub fn is_success(self) -> bool {
        matches!(self, Self::AwaitingReview | Self::Completed)
    }
}

impl std::fmt::Display for AgentLoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::AwaitingReview => write!(f, "awaiting_review"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A single-agent implementation loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoop {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_item_id: Option<RecordId>,
    /// Prior deliberation whose decision guides this loop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliberation_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<RecordId>,
    pub status: AgentLoopStatus,
    /// What went wrong in a previous attempt, fed back into the seed prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl AgentLoop {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            instructions: String::new(),
            target_item_id: None,
            deliberation_id: None,
            config_id: None,
            status: AgentLoopStatus::Queued,
            feedback: None,
            usage: TokenUsage::default(),
            error: None,
            pr_number: None,
            pr_url: None,
            branch: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            version: 0,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_target_item(mut self, item_id: impl Into<String>) -> Self {
        self.target_item_id = Some(item_id.into());
        self
    }

    pub fn with_deliberation(mut self, deliberation_id: impl Into<String>) -> Self {
        self.deliberation_id = Some(deliberation_id.into());
        self
    }

    pub fn with_config(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = Some(config_id.into());
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    /// Append a note to the error field without discarding earlier notes.
    pub fn append_error(&mut self, note: &str) {
        match self.error.as_mut() {
            Some(existing) if !existing.is_empty() => {
                existing.push('\n');
                existing.push_str(note);
            }
            _ => self.error = Some(note.to_string()),
        }
    }
}

/// Phase recorded on an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationPhase {
    /// The agent is still working (status CONTINUE)
    Thinking,
    /// The agent declared DONE or BLOCKED
    Complete,
    /// The reasoning call failed
    Error,
}

/// One think/act/observe iteration of an agent loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIteration {
    pub id: RecordId,
    pub loop_id: RecordId,
    /// Iteration number (1-indexed)
    pub number: u32,
    pub phase: IterationPhase,
    #[serde(default)]
    pub thinking: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub observation: String,
    #[serde(default)]
    pub files_changed: Vec<String>,
    /// Raw model response; file changes are re-derived from it on resume
    #[serde(default)]
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub usage: TokenUsage,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Reusable agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    pub id: RecordId,
    pub max_iterations: u32,
    #[serde(default)]
    pub require_tests: bool,
    #[serde(default)]
    pub require_build: bool,
    /// Repository in `owner/name` form; `None` uses the engine default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_repo: Option<String>,
    pub base_branch: String,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default)]
    pub forbidden_paths: Vec<String>,
    #[serde(default)]
    pub extra_system_prompt: String,
}

impl AgentLoopConfig {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            id: new_id(),
            max_iterations,
            require_tests: false,
            require_build: false,
            target_repo: None,
            base_branch: "main".to_string(),
            allowed_paths: Vec::new(),
            forbidden_paths: Vec::new(),
            extra_system_prompt: String::new(),
        }
    }
}

/// Reference to an active workflow, as listed for schedulers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ActiveWorkflow {
    Deliberation(RecordId),
    AgentLoop(RecordId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliberation_transitions() {
        use DeliberationStatus::*;
        assert!(Proposing.can_transition_to(Debating));
        assert!(Debating.can_transition_to(Voting));
        assert!(Voting.can_transition_to(Decided));
        assert!(Voting.can_transition_to(Failed));
        assert!(!Proposing.can_transition_to(Voting));
        assert!(!Decided.can_transition_to(Failed));
        assert!(Decided.is_terminal());
        assert!(!Debating.is_terminal());
    }

    #[test]
    fn test_agent_loop_status_terminality() {
        assert!(!AgentLoopStatus::Queued.is_terminal());
        assert!(!AgentLoopStatus::Running.is_terminal());
        assert!(AgentLoopStatus::AwaitingReview.is_terminal());
        assert!(AgentLoopStatus::Cancelled.is_terminal());
        assert!(AgentLoopStatus::Completed.is_success());
        assert!(!AgentLoopStatus::Failed.is_success());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&AgentLoopStatus::AwaitingReview).unwrap();
        assert_eq!(json, "\"awaiting_review\"");
        assert_eq!(AgentLoopStatus::AwaitingReview.to_string(), "awaiting_review");
    }

    #[test]
    fn test_append_error_keeps_previous_notes() {
        let mut task = AgentLoop::new("Add SSH key rotation");
        task.append_error("publish failed for app");
        task.append_error("publish failed for web");
        assert_eq!(
            task.error.as_deref(),
            Some("publish failed for app\npublish failed for web")
        );
    }

    #[test]
    fn test_token_usage_add() {
        let mut usage = TokenUsage::default();
        usage.add(TokenUsage::new(100, 20));
        usage.add(TokenUsage::new(5, 5));
        assert_eq!(usage, TokenUsage::new(105, 25));
        assert_eq!(usage.total(), 130);
    }
}
