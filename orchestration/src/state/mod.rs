//! Workflow persistence
//!
//! Records describing deliberations, agent loops and everything they produce.
//! The engines treat the store as the durable source of truth, so any phase
//! can be resumed from what is persisted here.
//!
//! - `deliberations`, `proposals`, `debate_entries`, `votes`
//! - `agent_loops`, `iterations`, `loop_configs`
//! - `work_items` targeted by either workflow
//!
//! # Usage
//!
//! ```ignore
//! use orchestration::state::{Deliberation, MemoryStore, WorkflowKind, WorkflowStore};
//!
//! let store = MemoryStore::new().shared();
//! let deliberation = Deliberation::new(WorkflowKind::ImplementationPlan, "SFTP resume");
//! store.create_deliberation(&deliberation).await?;
//! ```

pub mod file_store;
pub mod store;
pub mod types;

pub use file_store::JsonFileStore;
pub use store::{MemoryStore, SharedStore, StoreData, StoreError, StoreResult, WorkflowStore};
pub use types::*;
