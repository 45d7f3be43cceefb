//! Workflow store seam and the in-memory implementation
//!
//! The store is the only shared mutable resource. Workflow records carry a
//! `version` column: `update_*` succeeds only when the caller's version
//! matches the stored one, so two engine instances can never silently
//! interleave writes on the same workflow id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::types::*;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("Version conflict on {id}: expected {expected}, found {found}")]
    Conflict {
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a store
pub type SharedStore = Arc<dyn WorkflowStore>;

/// Persistence operations the engines rely on.
///
/// Listing operations return records in creation order.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get_deliberation(&self, id: &str) -> StoreResult<Deliberation>;
    async fn create_deliberation(&self, record: &Deliberation) -> StoreResult<()>;
    /// Write `record` if its version is current; returns the stored copy with the bumped version.
    async fn update_deliberation(&self, record: &Deliberation) -> StoreResult<Deliberation>;

    async fn create_proposal(&self, proposal: &Proposal) -> StoreResult<()>;
    async fn list_proposals(&self, deliberation_id: &str) -> StoreResult<Vec<Proposal>>;

    async fn create_debate_entry(&self, entry: &DebateEntry) -> StoreResult<()>;
    async fn list_debate_entries(
        &self,
        deliberation_id: &str,
        round: Option<u32>,
    ) -> StoreResult<Vec<DebateEntry>>;

    async fn create_vote(&self, vote: &Vote) -> StoreResult<()>;
    async fn list_votes(&self, deliberation_id: &str) -> StoreResult<Vec<Vote>>;

    async fn get_agent_loop(&self, id: &str) -> StoreResult<AgentLoop>;
    async fn create_agent_loop(&self, record: &AgentLoop) -> StoreResult<()>;
    async fn update_agent_loop(&self, record: &AgentLoop) -> StoreResult<AgentLoop>;

    async fn create_iteration(&self, iteration: &AgentIteration) -> StoreResult<()>;
    /// Iterations of a loop ordered by iteration number.
    async fn list_iterations(&self, loop_id: &str) -> StoreResult<Vec<AgentIteration>>;

    async fn get_loop_config(&self, id: &str) -> StoreResult<AgentLoopConfig>;
    async fn put_loop_config(&self, config: &AgentLoopConfig) -> StoreResult<()>;

    async fn get_work_item(&self, id: &str) -> StoreResult<WorkItem>;
    async fn put_work_item(&self, item: &WorkItem) -> StoreResult<()>;

    /// Workflows whose status is still active, oldest first.
    async fn list_active(&self) -> StoreResult<Vec<ActiveWorkflow>>;
}

/// Plain data behind both store implementations.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    deliberations: HashMap<RecordId, Deliberation>,
    #[serde(default)]
    proposals: Vec<Proposal>,
    #[serde(default)]
    debate_entries: Vec<DebateEntry>,
    #[serde(default)]
    votes: Vec<Vote>,
    #[serde(default)]
    agent_loops: HashMap<RecordId, AgentLoop>,
    #[serde(default)]
    iterations: Vec<AgentIteration>,
    #[serde(default)]
    loop_configs: HashMap<RecordId, AgentLoopConfig>,
    #[serde(default)]
    work_items: HashMap<RecordId, WorkItem>,
}

impl StoreData {
    pub(crate) fn get_deliberation(&self, id: &str) -> StoreResult<Deliberation> {
        self.deliberations
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("deliberation", id))
    }

    pub(crate) fn create_deliberation(&mut self, record: &Deliberation) -> StoreResult<()> {
        if self.deliberations.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists {
                kind: "deliberation",
                id: record.id.clone(),
            });
        }
        self.deliberations.insert(record.id.clone(), record.clone());
        Ok(())
    }

    pub(crate) fn update_deliberation(&mut self, record: &Deliberation) -> StoreResult<Deliberation> {
        let existing = self
            .deliberations
            .get_mut(&record.id)
            .ok_or_else(|| not_found("deliberation", &record.id))?;
        check_version(&record.id, record.version, existing.version)?;
        let mut updated = record.clone();
        updated.version += 1;
        *existing = updated.clone();
        Ok(updated)
    }

    pub(crate) fn create_proposal(&mut self, proposal: &Proposal) -> StoreResult<()> {
        self.proposals.push(proposal.clone());
        Ok(())
    }

    pub(crate) fn list_proposals(&self, deliberation_id: &str) -> Vec<Proposal> {
        self.proposals
            .iter()
            .filter(|p| p.deliberation_id == deliberation_id)
            .cloned()
            .collect()
    }

    pub(crate) fn create_debate_entry(&mut self, entry: &DebateEntry) -> StoreResult<()> {
        self.debate_entries.push(entry.clone());
        Ok(())
    }

    pub(crate) fn list_debate_entries(
        &self,
        deliberation_id: &str,
        round: Option<u32>,
    ) -> Vec<DebateEntry> {
        self.debate_entries
            .iter()
            .filter(|e| e.deliberation_id == deliberation_id)
            .filter(|e| match round {
                Some(r) => e.round == r,
                None => true,
            })
            .cloned()
            .collect()
    }

    pub(crate) fn create_vote(&mut self, vote: &Vote) -> StoreResult<()> {
        self.votes.push(vote.clone());
        Ok(())
    }

    pub(crate) fn list_votes(&self, deliberation_id: &str) -> Vec<Vote> {
        self.votes
            .iter()
            .filter(|v| v.deliberation_id == deliberation_id)
            .cloned()
            .collect()
    }

    pub(crate) fn get_agent_loop(&self, id: &str) -> StoreResult<AgentLoop> {
        self.agent_loops
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("agent loop", id))
    }

    pub(crate) fn create_agent_loop(&mut self, record: &AgentLoop) -> StoreResult<()> {
        if self.agent_loops.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists {
                kind: "agent loop",
                id: record.id.clone(),
            });
        }
        self.agent_loops.insert(record.id.clone(), record.clone());
        Ok(())
    }

    pub(crate) fn update_agent_loop(&mut self, record: &AgentLoop) -> StoreResult<AgentLoop> {
        let existing = self
            .agent_loops
            .get_mut(&record.id)
            .ok_or_else(|| not_found("agent loop", &record.id))?;
        check_version(&record.id, record.version, existing.version)?;
        let mut updated = record.clone();
        updated.version += 1;
        *existing = updated.clone();
        Ok(updated)
    }

    pub(crate) fn create_iteration(&mut self, iteration: &AgentIteration) -> StoreResult<()> {
        self.iterations.push(iteration.clone());
        Ok(())
    }

    pub(crate) fn list_iterations(&self, loop_id: &str) -> Vec<AgentIteration> {
        let mut iterations: Vec<AgentIteration> = self
            .iterations
            .iter()
            .filter(|i| i.loop_id == loop_id)
            .cloned()
            .collect();
        iterations.sort_by_key(|i| i.number);
        iterations
    }

    pub(crate) fn get_loop_config(&self, id: &str) -> StoreResult<AgentLoopConfig> {
        self.loop_configs
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("loop config", id))
    }

    pub(crate) fn put_loop_config(&mut self, config: &AgentLoopConfig) -> StoreResult<()> {
        self.loop_configs.insert(config.id.clone(), config.clone());
        Ok(())
    }

    pub(crate) fn get_work_item(&self, id: &str) -> StoreResult<WorkItem> {
        self.work_items
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("work item", id))
    }

    pub(crate) fn put_work_item(&mut self, item: &WorkItem) -> StoreResult<()> {
        self.work_items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    pub(crate) fn list_active(&self) -> Vec<ActiveWorkflow> {
        let mut active: Vec<(chrono::DateTime<chrono::Utc>, ActiveWorkflow)> = self
            .deliberations
            .values()
            .filter(|d| !d.status.is_terminal())
            .map(|d| (d.created_at, ActiveWorkflow::Deliberation(d.id.clone())))
            .chain(
                self.agent_loops
                    .values()
                    .filter(|l| !l.status.is_terminal())
                    .map(|l| (l.created_at, ActiveWorkflow::AgentLoop(l.id.clone()))),
            )
            .collect();
        active.sort_by(|a, b| a.0.cmp(&b.0));
        active.into_iter().map(|(_, w)| w).collect()
    }
}

fn not_found(kind: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn check_version(id: &str, expected: u64, found: u64) -> StoreResult<()> {
    if expected != found {
        return Err(StoreError::Conflict {
            id: id.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// In-memory store, suitable for embedding and tests
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedStore {
        Arc::new(self)
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn get_deliberation(&self, id: &str) -> StoreResult<Deliberation> {
        self.data.read().await.get_deliberation(id)
    }

    async fn create_deliberation(&self, record: &Deliberation) -> StoreResult<()> {
        self.data.write().await.create_deliberation(record)
    }

    async fn update_deliberation(&self, record: &Deliberation) -> StoreResult<Deliberation> {
        self.data.write().await.update_deliberation(record)
    }

    async fn create_proposal(&self, proposal: &Proposal) -> StoreResult<()> {
        self.data.write().await.create_proposal(proposal)
    }

    async fn list_proposals(&self, deliberation_id: &str) -> StoreResult<Vec<Proposal>> {
        Ok(self.data.read().await.list_proposals(deliberation_id))
    }

    async fn create_debate_entry(&self, entry: &DebateEntry) -> StoreResult<()> {
        self.data.write().await.create_debate_entry(entry)
    }

    async fn list_debate_entries(
        &self,
        deliberation_id: &str,
        round: Option<u32>,
    ) -> StoreResult<Vec<DebateEntry>> {
        Ok(self
            .data
            .read()
            .await
            .list_debate_entries(deliberation_id, round))
    }

    async fn create_vote(&self, vote: &Vote) -> StoreResult<()> {
        self.data.write().await.create_vote(vote)
    }

    async fn list_votes(&self, deliberation_id: &str) -> StoreResult<Vec<Vote>> {
        Ok(self.data.read().await.list_votes(deliberation_id))
    }

    async fn get_agent_loop(&self, id: &str) -> StoreResult<AgentLoop> {
        self.data.read().await.get_agent_loop(id)
    }

    async fn create_agent_loop(&self, record: &AgentLoop) -> StoreResult<()> {
        self.data.write().await.create_agent_loop(record)
    }

    async fn update_agent_loop(&self, record: &AgentLoop) -> StoreResult<AgentLoop> {
        self.data.write().await.update_agent_loop(record)
    }

    async fn create_iteration(&self, iteration: &AgentIteration) -> StoreResult<()> {
        self.data.write().await.create_iteration(iteration)
    }

    async fn list_iterations(&self, loop_id: &str) -> StoreResult<Vec<AgentIteration>> {
        Ok(self.data.read().await.list_iterations(loop_id))
    }

    async fn get_loop_config(&self, id: &str) -> StoreResult<AgentLoopConfig> {
        self.data.read().await.get_loop_config(id)
    }

    async fn put_loop_config(&self, config: &AgentLoopConfig) -> StoreResult<()> {
        self.data.write().await.put_loop_config(config)
    }

    async fn get_work_item(&self, id: &str) -> StoreResult<WorkItem> {
        self.data.read().await.get_work_item(id)
    }

    async fn put_work_item(&self, item: &WorkItem) -> StoreResult<()> {
        self.data.write().await.put_work_item(item)
    }

    async fn list_active(&self) -> StoreResult<Vec<ActiveWorkflow>> {
        Ok(self.data.read().await.list_active())
    }
}
