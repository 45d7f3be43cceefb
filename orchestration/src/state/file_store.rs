//! JSON snapshot store — survives process restarts.
//!
//! Holds the same [`StoreData`] as [`MemoryStore`](super::MemoryStore) and
//! rewrites a versioned snapshot after every mutation (temp file + rename, so
//! a crash mid-write leaves the previous snapshot intact).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::store::{SharedStore, StoreData, StoreError, StoreResult, WorkflowStore};
use super::types::*;

/// On-disk envelope around the store data.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    /// Schema version for forward compatibility.
    version: u32,
    data: StoreData,
}

impl Snapshot {
    /// Current schema version.
    const CURRENT_VERSION: u32 = 1;
}

/// File-backed workflow store
pub struct JsonFileStore {
    path: PathBuf,
    data: RwLock<StoreData>,
}

impl JsonFileStore {
    /// Open the snapshot at `path`, starting empty if it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(json) => {
                let snapshot: Snapshot = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                if snapshot.version > Snapshot::CURRENT_VERSION {
                    return Err(StoreError::Serialization(format!(
                        "snapshot version {} is newer than supported {}",
                        snapshot.version,
                        Snapshot::CURRENT_VERSION
                    )));
                }
                snapshot.data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedStore {
        Arc::new(self)
    }

    /// Get the snapshot path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, data: &StoreData) -> StoreResult<()> {
        let snapshot = Snapshot {
            version: Snapshot::CURRENT_VERSION,
            data: data.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = json.len(), "Store snapshot written");
        Ok(())
    }

    /// Apply a mutation under the write lock and persist the result.
    ///
    /// The change is made on a copy and only becomes visible once the
    /// snapshot is on disk.
    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut StoreData) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut data = self.data.write().await;
        let mut next = data.clone();
        let out = op(&mut next)?;
        self.persist(&next).await?;
        *data = next;
        Ok(out)
    }
}

#[async_trait]
impl WorkflowStore for JsonFileStore {
    async fn get_deliberation(&self, id: &str) -> StoreResult<Deliberation> {
        self.data.read().await.get_deliberation(id)
    }

    async fn create_deliberation(&self, record: &Deliberation) -> StoreResult<()> {
        self.mutate(|d| d.create_deliberation(record)).await
    }

    async fn update_deliberation(&self, record: &Deliberation) -> StoreResult<Deliberation> {
        self.mutate(|d| d.update_deliberation(record)).await
    }

    async fn create_proposal(&self, proposal: &Proposal) -> StoreResult<()> {
        self.mutate(|d| d.create_proposal(proposal)).await
    }

    async fn list_proposals(&self, deliberation_id: &str) -> StoreResult<Vec<Proposal>> {
        Ok(self.data.read().await.list_proposals(deliberation_id))
    }

    async fn create_debate_entry(&self, entry: &DebateEntry) -> StoreResult<()> {
        self.mutate(|d| d.create_debate_entry(entry)).await
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
        self.mutate(|d| d.create_vote(vote)).await
    }

    async fn list_votes(&self, deliberation_id: &str) -> StoreResult<Vec<Vote>> {
        Ok(self.data.read().await.list_votes(deliberation_id))
    }

    async fn get_agent_loop(&self, id: &str) -> StoreResult<AgentLoop> {
        self.data.read().await.get_agent_loop(id)
    }

    async fn create_agent_loop(&self, record: &AgentLoop) -> StoreResult<()> {
        self.mutate(|d| d.create_agent_loop(record)).await
    }

    async fn update_agent_loop(&self, record: &AgentLoop) -> StoreResult<AgentLoop> {
        self.mutate(|d| d.update_agent_loop(record)).await
    }

    async fn create_iteration(&self, iteration: &AgentIteration) -> StoreResult<()> {
        self.mutate(|d| d.create_iteration(iteration)).await
    }

    async fn list_iterations(&self, loop_id: &str) -> StoreResult<Vec<AgentIteration>> {
        Ok(self.data.read().await.list_iterations(loop_id))
    }

    async fn get_loop_config(&self, id: &str) -> StoreResult<AgentLoopConfig> {
        self.data.read().await.get_loop_config(id)
    }

    async fn put_loop_config(&self, config: &AgentLoopConfig) -> StoreResult<()> {
        self.mutate(|d| d.put_loop_config(config)).await
    }

    async fn get_work_item(&self, id: &str) -> StoreResult<WorkItem> {
        self.data.read().await.get_work_item(id)
    }

    async fn put_work_item(&self, item: &WorkItem) -> StoreResult<()> {
        self.mutate(|d| d.put_work_item(item)).await
    }

    async fn list_active(&self) -> StoreResult<Vec<ActiveWorkflow>> {
        Ok(self.data.read().await.list_active())
    }
}
