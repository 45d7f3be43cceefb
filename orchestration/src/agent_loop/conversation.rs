//! Agent loop conversation: rebuilt from persisted iterations, trimmed to a
//! character budget.

use tracing::debug;

use crate::prompts::{continuation_prompt, retry_prompt};
use crate::reasoning::{ChatMessage, Role};
use crate::state::{AgentIteration, IterationPhase};

/// Alternating user/assistant messages starting with the seed prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(seed)],
        }
    }

    /// Seed plus every persisted iteration, in order.
    ///
    /// A successful iteration contributes its response and, if the agent
    /// asked to continue, the continuation prompt. A failed one adds a retry
    /// note to the pending user turn.
    pub fn rebuild(seed: impl Into<String>, iterations: &[AgentIteration], max_iterations: u32) -> Self {
        let mut ordered: Vec<&AgentIteration> = iterations.iter().collect();
        ordered.sort_by_key(|it| it.number);

        let mut conversation = Self::new(seed);
        for iteration in ordered {
            match iteration.phase {
                IterationPhase::Error => {
                    let error = iteration.error.as_deref().unwrap_or("unknown error");
                    conversation.push_user(retry_prompt(error));
                }
                IterationPhase::Thinking => {
                    conversation.push_assistant(iteration.response.clone());
                    conversation.push_user(continuation_prompt(iteration.number + 1, max_iterations));
                }
                IterationPhase::Complete => {
                    conversation.push_assistant(iteration.response.clone());
                }
            }
        }
        conversation
    }

    /// Append a user turn, merging into a trailing user message so roles
    /// keep alternating.
    pub fn push_user(&mut self, content: impl Into<String>) {
        let content = content.into();
        match self.messages.last_mut() {
            Some(last) if last.role == Role::User => {
                last.content.push_str("\n\n");
                last.content.push_str(&content);
            }
            _ => self.messages.push(ChatMessage::user(content)),
        }
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Length of the JSON-serialized message list.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(&self.messages)
            .map(|s| s.len())
            .unwrap_or_else(|_| self.messages.iter().map(|m| m.content.len()).sum())
    }

    /// Drop the oldest assistant/user pair after the seed until the
    /// conversation fits `budget` or only the seed and latest exchange remain.
    /// Returns the number of pairs dropped.
    pub fn trim_to_budget(&mut self, budget: usize) -> usize {
        let mut dropped = 0;
        while self.serialized_len() > budget && self.messages.len() > 3 {
            self.messages.drain(1..3);
            dropped += 1;
        }
        if dropped > 0 {
            debug!(
                dropped_pairs = dropped,
                remaining = self.messages.len(),
                chars = self.serialized_len(),
                "Conversation trimmed"
            );
        }
        dropped
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
