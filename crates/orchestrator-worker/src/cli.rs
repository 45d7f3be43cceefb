//! Command-line interface.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use orchestration::state::{
    AgentLoop, AgentLoopConfig, Deliberation, StoreError, WorkflowKind, WorkflowStore,
};
use serde_json::json;
use tracing::info;

use crate::config::WorkerConfig;
use crate::scheduler::Scheduler;
use crate::services::Services;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Worker configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// JSON state file (overrides ORCH_STORE_PATH and the config file)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeliberationKind {
    ImplementationPlan,
    ArchitectureReview,
}

impl From<DeliberationKind> for WorkflowKind {
    fn from(kind: DeliberationKind) -> Self {
        match kind {
            DeliberationKind::ImplementationPlan => WorkflowKind::ImplementationPlan,
            DeliberationKind::ArchitectureReview => WorkflowKind::ArchitectureReview,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a deliberation
    Deliberate {
        #[arg(long)]
        title: String,
        #[arg(long, value_enum, default_value = "implementation-plan")]
        kind: DeliberationKind,
        #[arg(long, default_value = "")]
        instructions: String,
        /// Work item the deliberation is about
        #[arg(long)]
        item: Option<String>,
        /// Run to completion instead of leaving it for `work`
        #[arg(long, default_value_t = false)]
        wait: bool,
    },
    /// Create an agent loop
    Implement {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        instructions: String,
        #[arg(long)]
        item: Option<String>,
        /// Decided deliberation whose decision guides the work
        #[arg(long)]
        deliberation: Option<String>,
        /// Reviewer feedback from a previous attempt
        #[arg(long)]
        feedback: Option<String>,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// `owner/name` overriding the default repository
        #[arg(long)]
        repo: Option<String>,
        #[arg(long, default_value = "main")]
        base_branch: String,
        #[arg(long = "allow")]
        allowed_paths: Vec<String>,
        #[arg(long = "forbid")]
        forbidden_paths: Vec<String>,
        #[arg(long, default_value_t = false)]
        wait: bool,
    },
    /// Advance a workflow by one step
    Advance { id: String },
    /// Cancel an agent loop
    Cancel { id: String },
    /// Print a workflow record as JSON
    Status { id: String },
    /// Poll the store and advance active workflows until interrupted
    Work,
}

/// Load configuration, with `--store` taking precedence.
pub fn load_config(args: &Args) -> Result<WorkerConfig> {
    let mut config = WorkerConfig::load(args.config.as_deref())?;
    if let Some(store) = &args.store {
        config.store_path = Some(store.clone());
    }
    Ok(config)
}

/// Which family a record id belongs to
enum Found {
    Deliberation(Deliberation),
    AgentLoop(AgentLoop),
}

async fn find(store: &dyn WorkflowStore, id: &str) -> Result<Found> {
    match store.get_deliberation(id).await {
        Ok(d) => return Ok(Found::Deliberation(d)),
        Err(StoreError::NotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }
    match store.get_agent_loop(id).await {
        Ok(l) => Ok(Found::AgentLoop(l)),
        Err(StoreError::NotFound { .. }) => bail!("No deliberation or agent loop with id {id}"),
        Err(e) => Err(e.into()),
    }
}

/// Run one command; returns what should be printed.
pub async fn execute(command: Command, config: &WorkerConfig, services: &Services) -> Result<String> {
    match command {
        Command::Deliberate {
            title,
            kind,
            instructions,
            item,
            wait,
        } => {
            let mut record = Deliberation::new(kind.into(), title).with_instructions(instructions);
            if let Some(item) = item {
                record = record.with_target_item(item);
            }
            let record = services.deliberations.create(record).await?;
            if wait {
                let status = services.deliberations.run_to_completion(&record.id).await;
                return Ok(json!({ "id": record.id, "status": status.to_string() }).to_string());
            }
            Ok(json!({ "id": record.id, "status": record.status.to_string() }).to_string())
        }
        Command::Implement {
            title,
            instructions,
            item,
            deliberation,
            feedback,
            max_iterations,
            repo,
            base_branch,
            allowed_paths,
            forbidden_paths,
            wait,
        } => {
            let mut loop_config = AgentLoopConfig::new(
                max_iterations.unwrap_or(config.engine.default_max_iterations),
            );
            loop_config.target_repo = repo;
            loop_config.base_branch = base_branch;
            loop_config.allowed_paths = allowed_paths;
            loop_config.forbidden_paths = forbidden_paths;
            services
                .store
                .put_loop_config(&loop_config)
                .await
                .context("Failed to store loop config")?;

            let mut record = AgentLoop::new(title)
                .with_instructions(instructions)
                .with_config(loop_config.id.clone());
            if let Some(item) = item {
                record = record.with_target_item(item);
            }
            if let Some(deliberation) = deliberation {
                record = record.with_deliberation(deliberation);
            }
            if let Some(feedback) = feedback {
                record = record.with_feedback(feedback);
            }
            let record = services.loops.create(record).await?;
            if wait {
                let status = services.loops.run(&record.id).await;
                return Ok(json!({ "id": record.id, "status": status.to_string() }).to_string());
            }
            Ok(json!({ "id": record.id, "status": record.status.to_string() }).to_string())
        }
        Command::Advance { id } => {
            let status = match find(services.store.as_ref(), &id).await? {
                Found::Deliberation(_) => services.deliberations.advance(&id).await.to_string(),
                Found::AgentLoop(_) => services.loops.advance(&id).await.to_string(),
            };
            Ok(json!({ "id": id, "status": status }).to_string())
        }
        Command::Cancel { id } => {
            let status = services.loops.cancel(&id).await?;
            Ok(json!({ "id": id, "status": status.to_string() }).to_string())
        }
        Command::Status { id } => {
            let value = match find(services.store.as_ref(), &id).await? {
                Found::Deliberation(d) => {
                    let proposals = services.store.list_proposals(&id).await?;
                    let votes = services.store.list_votes(&id).await?;
                    json!({ "deliberation": d, "proposals": proposals.len(), "votes": votes })
                }
                Found::AgentLoop(l) => {
                    let iterations = services.store.list_iterations(&id).await?;
                    json!({ "agent_loop": l, "iterations": iterations.len() })
                }
            };
            Ok(serde_json::to_string_pretty(&value)?)
        }
        Command::Work => {
            let scheduler = Scheduler::new(services.clone(), config.poll_interval());
            scheduler
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::warn!(error = %e, "Failed to listen for ctrl-c");
                        std::future::pending::<()>().await;
                    }
                })
                .await;
            info!("Worker stopped");
            Ok(String::new())
        }
    }
}
