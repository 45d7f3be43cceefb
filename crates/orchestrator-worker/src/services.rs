//! Builds the store and both engines from a [`WorkerConfig`].

use std::sync::Arc;

use anyhow::{Context, Result};
use orchestration::context::{CachedContextProvider, ContextProvider, IssueLookup, RepoSnapshotSource};
use orchestration::notify::{NoopNotifier, SharedNotifier, WebhookNotifier};
use orchestration::reasoning::{OpenAiCompatibleAdapter, SharedReasoning};
use orchestration::state::{JsonFileStore, MemoryStore, SharedStore};
use orchestration::{AgentLoopEngine, DeliberationEngine, GitHubHost};
use tracing::{info, warn};

use crate::config::WorkerConfig;

/// Everything the CLI and scheduler need
#[derive(Clone)]
pub struct Services {
    pub store: SharedStore,
    pub deliberations: Arc<DeliberationEngine>,
    pub loops: Arc<AgentLoopEngine>,
}

impl Services {
    pub async fn build(config: &WorkerConfig) -> Result<Self> {
        let store: SharedStore = match &config.store_path {
            Some(path) => {
                let store = JsonFileStore::open(path.clone())
                    .await
                    .with_context(|| format!("Failed to open state file {}", path.display()))?;
                info!(path = %path.display(), "Using JSON file store");
                store.shared()
            }
            None => {
                warn!("No store path configured; state is kept in memory only");
                MemoryStore::new().shared()
            }
        };

        let reasoning: SharedReasoning = Arc::new(
            OpenAiCompatibleAdapter::new(
                config.llm.url.clone(),
                config.llm.api_key.clone(),
                config.llm.model.clone(),
                config.llm.timeout(),
            )
            .context("Failed to build reasoning client")?,
        );

        Self::from_parts(config, store, reasoning)
    }

    /// Wire engines around an existing store and reasoning adapter.
    pub fn from_parts(
        config: &WorkerConfig,
        store: SharedStore,
        reasoning: SharedReasoning,
    ) -> Result<Self> {
        let notifier: SharedNotifier = match &config.notify_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
            None => Arc::new(NoopNotifier),
        };

        let mut deliberations =
            DeliberationEngine::new(store.clone(), reasoning.clone(), config.engine.clone())
                .with_notifier(notifier.clone());
        let mut loops = AgentLoopEngine::new(store.clone(), reasoning, config.engine.clone())
            .with_notifier(notifier);

        if let Some(root) = &config.repo_root {
            let context: Arc<dyn ContextProvider> =
                Arc::new(CachedContextProvider::new(RepoSnapshotSource::new(root)));
            deliberations = deliberations.with_context(context.clone());
            loops = loops.with_context(context);
            info!(root = %root.display(), "Codebase context enabled");
        }

        match &config.github_token {
            Some(token) => {
                let host = Arc::new(
                    GitHubHost::new(Some(token.clone()))
                        .context("Failed to build GitHub client")?
                        .with_issue_repo(config.issue_repo()),
                );
                let issues: Arc<dyn IssueLookup> = host.clone();
                deliberations = deliberations.with_issue_lookup(issues.clone());
                loops = loops.with_issue_lookup(issues).with_host(host);
            }
            None => warn!("GITHUB_TOKEN not set; agent loop results will not be published"),
        }

        Ok(Self {
            store,
            deliberations: Arc::new(deliberations),
            loops: Arc::new(loops),
        })
    }
}
