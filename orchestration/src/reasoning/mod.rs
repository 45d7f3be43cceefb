//! Reasoning service adapter
//!
//! Every LLM call the engines make goes through [`ReasoningAdapter::invoke`].
//! The adapter owns its own timeout; the engines impose no extra deadline.

pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::TokenUsage;

pub use openai::OpenAiCompatibleAdapter;

/// Errors from reasoning calls
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited: retry after {0:?}")]
    RateLimited(Option<Duration>),

    #[error("Provider error ({status}): {body}")]
    Provider { status: u16, body: String },

    #[error("Response parse error: {0}")]
    Parse(String),
}

/// Result type for reasoning calls
pub type ReasoningResult<T> = Result<T, ReasoningError>;

/// Speaker of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeOptions {
    /// Upper bound on generated tokens
    pub max_output_tokens: u32,
    /// Preferred model; `None` lets the adapter pick its default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Correlation context for logs (workflow id, agent, round...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
}

/// A reasoning request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningRequest {
    /// Activity label, e.g. `deliberation.proposal`
    pub activity: String,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub options: InvokeOptions,
}

impl ReasoningRequest {
    /// Single-turn request with one user message.
    pub fn single(
        activity: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        options: InvokeOptions,
    ) -> Self {
        Self {
            activity: activity.into(),
            system_prompt: system_prompt.into(),
            messages: vec![ChatMessage::user(user_prompt)],
            options,
        }
    }
}

/// Generated text plus accounting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Completion {
    pub fn usage(&self) -> TokenUsage {
        TokenUsage::new(self.input_tokens, self.output_tokens)
    }
}

/// Trait for the external reasoning service
#[async_trait]
pub trait ReasoningAdapter: Send + Sync {
    async fn invoke(&self, request: ReasoningRequest) -> ReasoningResult<Completion>;
}

/// Shared reference to an adapter
pub type SharedReasoning = Arc<dyn ReasoningAdapter>;
