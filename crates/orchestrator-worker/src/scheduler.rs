//! Polling scheduler.
//!
//! Each pass lists active workflows and advances every one of them once.
//! Different workflows advance concurrently; a single workflow is only ever
//! advanced by one task per pass.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use orchestration::state::ActiveWorkflow;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::services::Services;

/// Outcome of one scheduler pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub advanced: usize,
    /// Workflows that reached a terminal status during this pass
    pub finished: usize,
}

pub struct Scheduler {
    services: Services,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(services: Services, poll_interval: Duration) -> Self {
        Self {
            services,
            poll_interval,
        }
    }

    /// Advance every active workflow once.
    pub async fn tick(&self) -> Result<TickReport> {
        let active = self
            .services
            .store
            .list_active()
            .await
            .context("Failed to list active workflows")?;
        if active.is_empty() {
            debug!("No active workflows");
            return Ok(TickReport::default());
        }

        let mut tasks = JoinSet::new();
        for workflow in active {
            let services = self.services.clone();
            tasks.spawn(async move {
                match workflow {
                    ActiveWorkflow::Deliberation(id) => {
                        let status = services.deliberations.advance(&id).await;
                        debug!(deliberation_id = %id, status = %status, "Advanced deliberation");
                        status.is_terminal()
                    }
                    ActiveWorkflow::AgentLoop(id) => {
                        let status = services.loops.advance(&id).await;
                        debug!(loop_id = %id, status = %status, "Advanced agent loop");
                        status.is_terminal()
                    }
                }
            });
        }

        let mut report = TickReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(terminal) => {
                    report.advanced += 1;
                    if terminal {
                        report.finished += 1;
                    }
                }
                Err(e) => warn!(error = %e, "Advance task panicked"),
            }
        }
        info!(
            advanced = report.advanced,
            finished = report.finished,
            "Scheduler pass complete"
        );
        Ok(report)
    }

    /// Poll until `shutdown` resolves. A pass in progress always finishes.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(poll_interval = ?self.poll_interval, "Scheduler started");
        loop {
            if let Err(e) = self.tick().await {
                warn!(error = %e, "Scheduler pass failed");
            }
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested; scheduler stopping");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
