//! Iterative agent loops
//!
//! A single implementer agent works through think/act/observe iterations.
//! File changes are proposed as fenced blocks in each response, folded
//! across iterations, and published as a pull request per target repository
//! once the agent reports `DONE`.

pub mod conversation;
pub mod engine;

pub use conversation::Conversation;
pub use engine::AgentLoopEngine;
