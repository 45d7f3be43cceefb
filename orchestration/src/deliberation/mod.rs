//! Multi-agent deliberation
//!
//! Every roster agent proposes, critiques the proposals over two debate
//! rounds, and votes for another agent's proposal. The winning proposal is
//! synthesized into a decision document plus a short executive summary.

pub mod engine;
pub mod tally;

pub use engine::{DeliberationEngine, DEBATE_ROUNDS};
pub use tally::{tally_votes, Tally};
