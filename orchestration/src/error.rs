//! Engine error types

use thiserror::Error;

use crate::publisher::SourceControlError;
use crate::reasoning::ReasoningError;
use crate::state::StoreError;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while driving a workflow.
///
/// These never escape the public entry points (`start`, `advance`, `run`):
/// they are recorded on the workflow record as `status = failed` plus message.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    #[error(transparent)]
    SourceControl(#[from] SourceControlError),

    #[error("All agents failed during {phase}")]
    AllAgentsFailed { phase: String },

    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Missing record: {0}")]
    MissingRecord(String),
}

impl EngineError {
    pub fn all_failed(phase: impl std::fmt::Display) -> Self {
        Self::AllAgentsFailed {
            phase: phase.to_string(),
        }
    }

    /// Stale write: another writer advanced the record first.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}
