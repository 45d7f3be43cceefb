//! Multi-agent orchestration engine
//!
//! Two persisted workflow families share one store and one reasoning seam:
//!
//! - **Deliberation**: a roster of agents proposes, debates for two rounds,
//!   votes, and the winning proposal is synthesized into a decision plus an
//!   executive summary.
//! - **Agent loop**: one implementer iterates (think → act → observe) until
//!   it reports `DONE`, `BLOCKED`, or runs out of iterations. Accumulated file
//!   changes become one pull request per target repository.
//!
//! Every phase transition is written to the [`state::WorkflowStore`] before
//! the next phase starts, so `advance` is idempotent and any worker can pick
//! up a workflow after a crash.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use orchestration::{DeliberationEngine, EngineConfig, MemoryStore};
//! use orchestration::reasoning::OpenAiCompatibleAdapter;
//! use orchestration::state::{Deliberation, WorkflowKind};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let reasoning = Arc::new(OpenAiCompatibleAdapter::new(
//!     "http://localhost:8080/v1",
//!     None,
//!     "default",
//!     std::time::Duration::from_secs(120),
//! )?);
//! let engine = DeliberationEngine::new(MemoryStore::new().shared(), reasoning, EngineConfig::default());
//! let record = engine
//!     .create(Deliberation::new(WorkflowKind::ImplementationPlan, "Add rate limiting"))
//!     .await?;
//! engine.run_to_completion(&record.id).await;
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod agent_loop;
pub mod config;
pub mod context;
pub mod deliberation;
pub mod error;
pub mod github;
pub mod notify;
pub mod parser;
pub mod prompts;
pub mod publisher;
pub mod reasoning;
pub mod roster;
pub mod state;

pub use accumulator::{AccumulatedFile, FileChangeSet, RepoPartition};
pub use agent_loop::{AgentLoopEngine, Conversation};
pub use config::{EngineConfig, PacingConfig, RepoRouting, RepoTarget};
pub use context::{
    CachedContextProvider, ContextProvider, ContextSource, IssueLookup, RepoSnapshotSource,
    StaticContext,
};
pub use deliberation::{tally_votes, DeliberationEngine, Tally, DEBATE_ROUNDS};
pub use error::{EngineError, EngineResult};
pub use github::GitHubHost;
pub use notify::{NoopNotifier, WebhookNotifier, WorkflowEvent, WorkflowNotifier};
pub use publisher::{PublishReport, Publisher, SourceControlError, SourceControlHost};
pub use reasoning::{ReasoningAdapter, ReasoningError, ReasoningRequest};
pub use state::{JsonFileStore, MemoryStore, SharedStore, StoreError, WorkflowStore};
