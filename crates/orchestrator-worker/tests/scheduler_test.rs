//! Scheduler and CLI commands against an in-memory store and a canned
//! reasoning adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orchestration::config::PacingConfig;
use orchestration::reasoning::{Completion, ReasoningAdapter, ReasoningRequest, ReasoningResult};
use orchestration::state::{
    AgentLoop, AgentLoopStatus, Deliberation, DeliberationStatus, MemoryStore, WorkflowKind,
    WorkflowStore,
};
use orchestrator_worker::cli::{execute, Command, DeliberationKind};
use orchestrator_worker::{Scheduler, Services, WorkerConfig};

/// Answers each activity with a well-formed canned response.
struct CannedReasoning;

#[async_trait]
impl ReasoningAdapter for CannedReasoning {
    async fn invoke(&self, request: ReasoningRequest) -> ReasoningResult<Completion> {
        let content = match request.activity.as_str() {
            "deliberation.proposal" => {
                "Plan.\n\n**Strengths**: simple\n**Risks**: few\n**Effort**: a day".to_string()
            }
            "deliberation.vote" => "**Vote**: Architect\n**Reasoning**: best".to_string(),
            "agent_loop.iteration" => "### Thinking\nDone already.\n\n### Action\nNothing.\n\n\
### Status\n**CONTINUE**\n"
                .to_string(),
            _ => "Looks good.".to_string(),
        };
        Ok(Completion {
            content,
            model: "canned".into(),
            input_tokens: 10,
            output_tokens: 5,
        })
    }
}

fn services() -> (WorkerConfig, Services) {
    let mut config = WorkerConfig::default();
    config.engine = config.engine.with_pacing(PacingConfig::none());
    config.engine.default_max_iterations = 2;
    let services = Services::from_parts(
        &config,
        MemoryStore::new().shared(),
        Arc::new(CannedReasoning),
    )
    .unwrap();
    (config, services)
}

#[tokio::test]
async fn test_tick_advances_every_active_workflow_until_idle() {
    let (_, services) = services();
    let deliberation = services
        .deliberations
        .create(Deliberation::new(WorkflowKind::ImplementationPlan, "Plan it"))
        .await
        .unwrap();
    let agent_loop = services.loops.create(AgentLoop::new("Do it")).await.unwrap();

    let scheduler = Scheduler::new(services.clone(), Duration::from_secs(1));
    let first = scheduler.tick().await.unwrap();
    assert_eq!(first.advanced, 2);

    let mut passes = 1;
    while scheduler.tick().await.unwrap().advanced > 0 {
        passes += 1;
        assert!(passes < 10, "scheduler never went idle");
    }

    let d = services.store.get_deliberation(&deliberation.id).await.unwrap();
    assert_eq!(d.status, DeliberationStatus::Decided);
    // Two CONTINUE iterations and no files: exhausted without changes.
    let l = services.store.get_agent_loop(&agent_loop.id).await.unwrap();
    assert_eq!(l.status, AgentLoopStatus::Failed);
    assert!(services.store.list_active().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown() {
    let (_, services) = services();
    let scheduler = Scheduler::new(services, Duration::from_secs(30));
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        scheduler
            .run(async {
                let _ = rx.await;
            })
            .await;
    });
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert!(!handle.is_finished());

    tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_cli_deliberate_wait_and_status() {
    let (config, services) = services();
    let out = execute(
        Command::Deliberate {
            title: "Pick a queue".into(),
            kind: DeliberationKind::ArchitectureReview,
            instructions: String::new(),
            item: None,
            wait: true,
        },
        &config,
        &services,
    )
    .await
    .unwrap();
    let created: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(created["status"], "decided");

    let id = created["id"].as_str().unwrap().to_string();
    let status = execute(Command::Status { id }, &config, &services)
        .await
        .unwrap();
    let status: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(status["proposals"], 3);
    assert_eq!(status["deliberation"]["kind"], "architecture_review");
}

#[tokio::test]
async fn test_cli_implement_then_cancel() {
    let (config, services) = services();
    let out = execute(
        Command::Implement {
            title: "Refactor".into(),
            instructions: "Split the module".into(),
            item: None,
            deliberation: None,
            feedback: None,
            max_iterations: Some(5),
            repo: Some("acme/app".into()),
            base_branch: "main".into(),
            allowed_paths: vec!["src/".into()],
            forbidden_paths: Vec::new(),
            wait: false,
        },
        &config,
        &services,
    )
    .await
    .unwrap();
    let created: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(created["status"], "queued");
    let id = created["id"].as_str().unwrap().to_string();

    let record = services.store.get_agent_loop(&id).await.unwrap();
    let loop_config = services
        .store
        .get_loop_config(record.config_id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(loop_config.max_iterations, 5);
    assert_eq!(loop_config.allowed_paths, vec!["src/".to_string()]);

    let out = execute(Command::Cancel { id: id.clone() }, &config, &services)
        .await
        .unwrap();
    assert!(out.contains("cancelled"));

    let err = execute(Command::Advance { id: "nope".into() }, &config, &services)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No deliberation or agent loop"));
}
