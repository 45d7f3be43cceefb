//! Fire-and-forget workflow notifications.
//!
//! Engines emit a [`WorkflowEvent`] on terminal outcomes and opened pull
//! requests. Delivery failures are logged and dropped; they never affect the
//! workflow.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::RecordId;

/// Something worth telling a human about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum WorkflowEvent {
    DeliberationDecided {
        id: RecordId,
        title: String,
        winner: Option<String>,
        summary: String,
    },
    DeliberationFailed {
        id: RecordId,
        title: String,
        error: String,
    },
    AgentLoopFinished {
        id: RecordId,
        title: String,
        status: String,
        files: usize,
    },
    AgentLoopFailed {
        id: RecordId,
        title: String,
        error: String,
    },
    PullRequestOpened {
        loop_id: RecordId,
        repo: String,
        number: u64,
        url: String,
    },
}

impl WorkflowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeliberationDecided { .. } => "deliberation-decided",
            Self::DeliberationFailed { .. } => "deliberation-failed",
            Self::AgentLoopFinished { .. } => "agent-loop-finished",
            Self::AgentLoopFailed { .. } => "agent-loop-failed",
            Self::PullRequestOpened { .. } => "pull-request-opened",
        }
    }
}

/// Notification sink
#[async_trait]
pub trait WorkflowNotifier: Send + Sync {
    /// Deliver `event`; must not fail.
    async fn notify(&self, event: WorkflowEvent);
}

/// Shared reference to a notifier
pub type SharedNotifier = Arc<dyn WorkflowNotifier>;

/// Discards every event
pub struct NoopNotifier;

#[async_trait]
impl WorkflowNotifier for NoopNotifier {
    async fn notify(&self, event: WorkflowEvent) {
        debug!(event = event.name(), "Notification dropped (no notifier configured)");
    }
}

/// POSTs each event as JSON to a webhook
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl WorkflowNotifier for WebhookNotifier {
    async fn notify(&self, event: WorkflowEvent) {
        let name = event.name();
        match self.client.post(&self.url).json(&event).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(event = name, "Notification delivered");
            }
            Ok(resp) => {
                warn!(event = name, status = resp.status().as_u16(), "Notification rejected");
            }
            Err(e) => {
                warn!(event = name, error = %e, "Notification failed");
            }
        }
    }
}
