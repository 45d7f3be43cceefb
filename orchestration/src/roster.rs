//! Agent roster
//!
//! Static registry from workflow kind to the ordered agents that take part.
//! Order matters: agents are invoked sequentially in roster order in every
//! phase, and the vote tally breaks ties by insertion order.

use serde::{Deserialize, Serialize};

use crate::state::WorkflowKind;

/// Point of view an agent argues from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    Architecture,
    Security,
    Pragmatism,
    Performance,
    Implementation,
}

impl Perspective {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Architecture => "System structure, boundaries, long-term maintainability",
            Self::Security => "Threat surface, secrets handling, data integrity",
            Self::Pragmatism => "Smallest change that ships, delivery risk, effort",
            Self::Performance => "Latency, memory, rendering and I/O cost",
            Self::Implementation => "Writing working code changes end to end",
        }
    }
}

impl std::fmt::Display for Perspective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Architecture => write!(f, "architecture"),
            Self::Security => write!(f, "security"),
            Self::Pragmatism => write!(f, "pragmatism"),
            Self::Performance => write!(f, "performance"),
            Self::Implementation => write!(f, "implementation"),
        }
    }
}

/// One participating agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub name: String,
    /// Preferred model, passed through to the reasoning adapter
    pub model: String,
    pub perspective: Perspective,
    pub system_prompt: String,
}

impl AgentIdentity {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        perspective: Perspective,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            perspective,
            system_prompt: system_prompt.into(),
        }
    }
}

const ARCHITECT_PROMPT: &str = "You are the Architect on an engineering council. \
You evaluate work in terms of module boundaries, data flow, coupling and how the \
change will age. Prefer designs that fit the existing structure of the codebase. \
Be concrete: name files, types and interfaces.";

const SECURITY_PROMPT: &str = "You are the Security Analyst on an engineering council. \
You look for ways a change can leak secrets, widen attack surface, corrupt data or \
bypass authorization. Every recommendation must say what it protects against.";

const PRAGMATIST_PROMPT: &str = "You are the Pragmatist on an engineering council. \
You care about shipping: the smallest change that solves the problem, realistic effort \
estimates, and avoiding work that does not pay for itself. Call out over-engineering.";

const PERFORMANCE_PROMPT: &str = "You are the Performance Engineer on an engineering council. \
You reason about latency, memory use, rendering cost and I/O patterns. Quantify where \
you can and point at the hot paths a change touches.";

const IMPLEMENTER_PROMPT: &str = "You are a senior software engineer implementing a task \
directly in the codebase. You write complete, working files, keep changes focused on the \
task, and follow the conventions already present in the repository.";

fn architect() -> AgentIdentity {
    AgentIdentity::new(
        "Architect",
        "claude-opus-4-5",
        Perspective::Architecture,
        ARCHITECT_PROMPT,
    )
}

fn security_analyst() -> AgentIdentity {
    AgentIdentity::new(
        "Security Analyst",
        "gpt-5.2",
        Perspective::Security,
        SECURITY_PROMPT,
    )
}

fn pragmatist() -> AgentIdentity {
    AgentIdentity::new(
        "Pragmatist",
        "gemini-3-pro",
        Perspective::Pragmatism,
        PRAGMATIST_PROMPT,
    )
}

fn performance_engineer() -> AgentIdentity {
    AgentIdentity::new(
        "Performance Engineer",
        "gemini-3-pro",
        Perspective::Performance,
        PERFORMANCE_PROMPT,
    )
}

/// The implementer used by agent loops
pub fn implementer() -> AgentIdentity {
    AgentIdentity::new(
        "Implementer",
        "claude-sonnet-4-5",
        Perspective::Implementation,
        IMPLEMENTER_PROMPT,
    )
}

/// Ordered agents for a workflow kind.
pub fn roster_for(kind: WorkflowKind) -> Vec<AgentIdentity> {
    match kind {
        WorkflowKind::ImplementationPlan => vec![architect(), security_analyst(), pragmatist()],
        WorkflowKind::ArchitectureReview => {
            vec![architect(), security_analyst(), performance_engineer()]
        }
        WorkflowKind::AgentLoop => vec![implementer()],
    }
}
