//! Agent loop engine end to end: scripted implementer, recording host.

mod common;

use std::sync::Arc;

use common::{iteration_text, test_config, CollectingNotifier, RecordingHost, ScriptedReasoning};
use orchestration::config::{RepoRouting, RepoTarget};
use orchestration::reasoning::{
    Completion, ReasoningAdapter, ReasoningError, ReasoningRequest, ReasoningResult, Role,
};
use orchestration::state::{
    AgentLoop, AgentLoopConfig, AgentLoopStatus, Deliberation, DeliberationStatus,
    IterationPhase, JsonFileStore, MemoryStore, SharedStore, WorkflowKind, WorkflowStore,
};
use orchestration::{AgentLoopEngine, EngineConfig};

fn build_engine(
    store: SharedStore,
    reasoning: Arc<ScriptedReasoning>,
    host: Arc<RecordingHost>,
) -> AgentLoopEngine {
    AgentLoopEngine::new(store, reasoning, test_config()).with_host(host)
}

async fn with_config(store: &SharedStore, config: AgentLoopConfig, title: &str) -> AgentLoop {
    store.put_loop_config(&config).await.unwrap();
    AgentLoop::new(title).with_config(config.id.clone())
}

// ── Outcomes ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_done_publishes_latest_content_and_awaits_review() {
    let store = MemoryStore::new().shared();
    let host = Arc::new(RecordingHost::default());
    let notifier = Arc::new(CollectingNotifier::default());
    let reasoning = ScriptedReasoning::sequence(vec![
        Ok(iteration_text("CONTINUE", &[("a.ts", "X")])),
        Ok(iteration_text("DONE", &[("a.ts", "Y")])),
    ]);
    let engine = build_engine(store.clone(), reasoning.clone(), host.clone())
        .with_notifier(notifier.clone());

    let record = engine
        .create(AgentLoop::new("Update greeting"))
        .await
        .unwrap();
    let status = engine.run(&record.id).await;
    assert_eq!(status, AgentLoopStatus::AwaitingReview);

    let commits = host.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].repo, "acme/app");
    assert_eq!(commits[0].base_branch, "main");
    assert_eq!(commits[0].files.len(), 1);
    assert_eq!(commits[0].files[0].path, "a.ts");
    assert_eq!(commits[0].files[0].content.as_deref().map(str::trim), Some("Y"));
    assert!(commits[0].branch.starts_with("agent-loop/"));

    let finished = store.get_agent_loop(&record.id).await.unwrap();
    assert_eq!(finished.pr_number, Some(41));
    assert_eq!(finished.pr_url.as_deref(), Some("https://github.com/acme/app/pull/41"));
    assert_eq!(finished.branch.as_deref(), Some(commits[0].branch.as_str()));
    assert!(finished.error.is_none());
    assert_eq!(finished.usage.input_tokens, 200);

    let iterations = store.list_iterations(&record.id).await.unwrap();
    assert_eq!(iterations.len(), 2);
    assert_eq!(iterations[0].phase, IterationPhase::Thinking);
    assert_eq!(iterations[1].phase, IterationPhase::Complete);
    assert_eq!(iterations[1].files_changed, vec!["a.ts".to_string()]);

    // Second call carries the first answer and a continuation prompt.
    let second = &reasoning.calls()[1];
    let roles: Vec<Role> = second.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    assert!(second.messages[2].content.contains("iteration 2 of 10"));

    assert_eq!(
        notifier.names(),
        vec!["pull-request-opened", "agent-loop-finished"]
    );
}

#[tokio::test]
async fn test_blocked_fails_with_reason() {
    let store = MemoryStore::new().shared();
    let host = Arc::new(RecordingHost::default());
    let reasoning = ScriptedReasoning::sequence(vec![Ok(
        "### Thinking\nI need credentials.\n\n### Action\nNone.\n\n### Status\n**BLOCKED** \
the deploy key is missing\n"
            .to_string(),
    )]);
    let engine = build_engine(store.clone(), reasoning, host.clone());

    let record = engine.create(AgentLoop::new("Deploy")).await.unwrap();
    assert_eq!(engine.run(&record.id).await, AgentLoopStatus::Failed);

    let failed = store.get_agent_loop(&record.id).await.unwrap();
    let error = failed.error.unwrap();
    assert!(error.starts_with("Agent blocked:"), "{error}");
    assert!(error.contains("deploy key is missing"));
    assert!(host.commits().is_empty());
}

#[tokio::test]
async fn test_max_iterations_with_files_completes() {
    let store = MemoryStore::new().shared();
    let host = Arc::new(RecordingHost::default());
    let reasoning = ScriptedReasoning::new(|_| Ok(iteration_text("CONTINUE", &[("src/lib.rs", "fn a() {}")])));
    let engine = build_engine(store.clone(), reasoning.clone(), host.clone());

    let record = with_config(&store, AgentLoopConfig::new(3), "Endless").await;
    let record = engine.create(record).await.unwrap();
    assert_eq!(engine.run(&record.id).await, AgentLoopStatus::Completed);
    assert_eq!(reasoning.calls().len(), 3);
    assert_eq!(store.list_iterations(&record.id).await.unwrap().len(), 3);
    assert_eq!(host.commits().len(), 1);
}

#[tokio::test]
async fn test_max_iterations_without_files_fails() {
    let store = MemoryStore::new().shared();
    let host = Arc::new(RecordingHost::default());
    let reasoning = ScriptedReasoning::new(|_| Ok(iteration_text("CONTINUE", &[])));
    let engine = build_engine(store.clone(), reasoning, host.clone());

    let record = with_config(&store, AgentLoopConfig::new(2), "Idle").await;
    let record = engine.create(record).await.unwrap();
    assert_eq!(engine.run(&record.id).await, AgentLoopStatus::Failed);
    let failed = store.get_agent_loop(&record.id).await.unwrap();
    assert!(failed.error.unwrap().contains("without producing any file changes"));
    assert!(host.commits().is_empty());
}

#[tokio::test]
async fn test_failed_call_is_recorded_and_retried() {
    let store = MemoryStore::new().shared();
    let host = Arc::new(RecordingHost::default());
    let reasoning = ScriptedReasoning::sequence(vec![
        Err(ReasoningError::Timeout(std::time::Duration::from_secs(120))),
        Ok(iteration_text("DONE", &[("a.ts", "Z")])),
    ]);
    let engine = build_engine(store.clone(), reasoning.clone(), host);

    let record = engine.create(AgentLoop::new("Flaky")).await.unwrap();
    assert_eq!(engine.advance(&record.id).await, AgentLoopStatus::Running);
    assert_eq!(engine.advance(&record.id).await, AgentLoopStatus::AwaitingReview);

    let iterations = store.list_iterations(&record.id).await.unwrap();
    assert_eq!(iterations[0].phase, IterationPhase::Error);
    assert!(iterations[0].error.as_deref().unwrap().contains("timed out"));
    assert_eq!(iterations[1].number, 2);

    let retry = &reasoning.calls()[1];
    assert_eq!(retry.messages.len(), 1);
    assert!(retry.messages[0].content.contains("failed with an error"));
}

// ── Cancellation ───────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_stops_the_loop() {
    let store = MemoryStore::new().shared();
    let host = Arc::new(RecordingHost::default());
    let reasoning = ScriptedReasoning::new(|_| Ok(iteration_text("CONTINUE", &[("a.ts", "X")])));
    let engine = build_engine(store.clone(), reasoning.clone(), host.clone());

    let record = engine.create(AgentLoop::new("Cancel me")).await.unwrap();
    assert_eq!(engine.advance(&record.id).await, AgentLoopStatus::Running);
    assert_eq!(engine.cancel(&record.id).await.unwrap(), AgentLoopStatus::Cancelled);

    assert_eq!(engine.advance(&record.id).await, AgentLoopStatus::Cancelled);
    assert_eq!(reasoning.calls().len(), 1);
    assert!(host.commits().is_empty());
    // Cancelling again leaves the terminal status alone.
    assert_eq!(engine.cancel(&record.id).await.unwrap(), AgentLoopStatus::Cancelled);
}

/// Cancels the loop from "another worker" while the call is in flight.
struct CancellingReasoning {
    store: SharedStore,
    loop_id: std::sync::Mutex<Option<String>>,
}

#[async_trait::async_trait]
impl ReasoningAdapter for CancellingReasoning {
    async fn invoke(&self, _request: ReasoningRequest) -> ReasoningResult<Completion> {
        let id = self.loop_id.lock().unwrap().clone();
        if let Some(id) = id {
            let mut record = self.store.get_agent_loop(&id).await.unwrap();
            record.status = AgentLoopStatus::Cancelled;
            self.store.update_agent_loop(&record).await.unwrap();
        }
        Ok(Completion {
            content: iteration_text("DONE", &[("a.ts", "X")]),
            model: "test".into(),
            input_tokens: 1,
            output_tokens: 1,
        })
    }
}

#[tokio::test]
async fn test_cancel_during_call_discards_result() {
    let store = MemoryStore::new().shared();
    let host = Arc::new(RecordingHost::default());
    let reasoning = Arc::new(CancellingReasoning {
        store: store.clone(),
        loop_id: std::sync::Mutex::new(None),
    });
    let engine = AgentLoopEngine::new(store.clone(), reasoning.clone(), test_config())
        .with_host(host.clone());

    let record = engine.create(AgentLoop::new("Race")).await.unwrap();
    *reasoning.loop_id.lock().unwrap() = Some(record.id.clone());

    assert_eq!(engine.advance(&record.id).await, AgentLoopStatus::Cancelled);
    assert!(store.list_iterations(&record.id).await.unwrap().is_empty());
    assert!(host.commits().is_empty());
}

// ── Publishing ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_publish_failure_is_not_fatal() {
    let store = MemoryStore::new().shared();
    let host = Arc::new(RecordingHost::failing_for("acme/app"));
    let reasoning = ScriptedReasoning::sequence(vec![Ok(iteration_text("DONE", &[("a.ts", "Y")]))]);
    let engine = build_engine(store.clone(), reasoning, host);

    let record = engine.create(AgentLoop::new("Unlucky")).await.unwrap();
    assert_eq!(engine.run(&record.id).await, AgentLoopStatus::AwaitingReview);

    let finished = store.get_agent_loop(&record.id).await.unwrap();
    assert!(finished.pr_number.is_none());
    assert!(finished.error.unwrap().contains("Publish failed"));
}

#[tokio::test]
async fn test_changes_split_across_routed_repositories() {
    let store = MemoryStore::new().shared();
    let host = Arc::new(RecordingHost::default());
    let config: EngineConfig = test_config().with_repositories(
        RepoRouting::new(RepoTarget::new("acme", "app"))
            .with_override("services/billing", RepoTarget::new("acme", "billing")),
    );
    let reasoning = ScriptedReasoning::sequence(vec![Ok(iteration_text(
        "DONE",
        &[("web/index.ts", "a"), ("services/billing/src/main.rs", "b")],
    ))]);
    let engine = AgentLoopEngine::new(store.clone(), reasoning, config).with_host(host.clone());

    let record = engine.create(AgentLoop::new("Cross-repo")).await.unwrap();
    assert_eq!(engine.run(&record.id).await, AgentLoopStatus::AwaitingReview);

    let commits = host.commits();
    assert_eq!(commits.len(), 2);
    let billing = commits.iter().find(|c| c.repo == "acme/billing").unwrap();
    assert_eq!(billing.files[0].path, "src/main.rs");
    let finished = store.get_agent_loop(&record.id).await.unwrap();
    assert!(finished.pr_number.is_some());
}

#[tokio::test]
async fn test_target_repo_and_base_branch_from_loop_config() {
    let store = MemoryStore::new().shared();
    let host = Arc::new(RecordingHost::default());
    let reasoning = ScriptedReasoning::sequence(vec![Ok(iteration_text("DONE", &[("a.ts", "Y")]))]);
    let engine = build_engine(store.clone(), reasoning, host.clone());

    let mut config = AgentLoopConfig::new(5);
    config.target_repo = Some("acme/other".into());
    config.base_branch = "develop".into();
    let record = with_config(&store, config, "Elsewhere").await;
    let record = engine.create(record).await.unwrap();
    engine.run(&record.id).await;

    let commits = host.commits();
    assert_eq!(commits[0].repo, "acme/other");
    assert_eq!(commits[0].base_branch, "develop");
}

// ── Context ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_seed_includes_prior_decision_and_feedback() {
    let store = MemoryStore::new().shared();
    let mut decided = Deliberation::new(WorkflowKind::ImplementationPlan, "Plan");
    decided.status = DeliberationStatus::Decided;
    decided.decision = Some("Use a token bucket.".into());
    decided.summary = Some("Token bucket.".into());
    store.create_deliberation(&decided).await.unwrap();

    let reasoning = ScriptedReasoning::sequence(vec![Ok(iteration_text("DONE", &[]))]);
    let engine = build_engine(store.clone(), reasoning.clone(), Arc::new(RecordingHost::default()));
    let record = engine
        .create(
            AgentLoop::new("Implement plan")
                .with_deliberation(decided.id.clone())
                .with_feedback("Tests were missing."),
        )
        .await
        .unwrap();
    engine.run(&record.id).await;

    let seed = &reasoning.calls()[0].messages[0].content;
    assert!(seed.contains("Use a token bucket."));
    assert!(seed.contains("Tests were missing."));
}

#[tokio::test]
async fn test_missing_config_record_fails_the_loop() {
    let store = MemoryStore::new().shared();
    let reasoning = ScriptedReasoning::sequence(vec![]);
    let engine = build_engine(store.clone(), reasoning.clone(), Arc::new(RecordingHost::default()));

    let record = engine
        .create(AgentLoop::new("Orphan").with_config("does-not-exist"))
        .await
        .unwrap();
    assert_eq!(engine.run(&record.id).await, AgentLoopStatus::Failed);
    assert!(reasoning.calls().is_empty());
}

// ── Resume ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_resume_rebuilds_files_from_persisted_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let record = {
        let store = JsonFileStore::open(&path).await.unwrap().shared();
        let reasoning =
            ScriptedReasoning::sequence(vec![Ok(iteration_text("CONTINUE", &[("a.ts", "X"), ("b.ts", "B")]))]);
        let engine = build_engine(store, reasoning, Arc::new(RecordingHost::default()));
        let record = engine.create(AgentLoop::new("Resume")).await.unwrap();
        assert_eq!(engine.advance(&record.id).await, AgentLoopStatus::Running);
        record
    };

    let store = JsonFileStore::open(&path).await.unwrap().shared();
    let host = Arc::new(RecordingHost::default());
    let reasoning = ScriptedReasoning::sequence(vec![Ok(iteration_text("DONE", &[("a.ts", "Y")]))]);
    let engine = build_engine(store.clone(), reasoning.clone(), host.clone());
    assert_eq!(engine.run(&record.id).await, AgentLoopStatus::AwaitingReview);

    // History from the first worker was replayed into the conversation.
    assert_eq!(reasoning.calls()[0].messages.len(), 3);
    let files = &host.commits()[0].files;
    assert_eq!(files.len(), 2);
    let a = files.iter().find(|f| f.path == "a.ts").unwrap();
    assert_eq!(a.content.as_deref().map(str::trim), Some("Y"));
}

#[tokio::test]
async fn test_resume_after_final_iteration_does_not_invoke_again() {
    let store = MemoryStore::new().shared();
    let host = Arc::new(RecordingHost::default());
    let reasoning = ScriptedReasoning::sequence(vec![Ok(iteration_text("DONE", &[("a.ts", "Y")]))]);
    let engine = build_engine(store.clone(), reasoning.clone(), host.clone());
    let record = engine.create(AgentLoop::new("Crash")).await.unwrap();
    assert_eq!(engine.run(&record.id).await, AgentLoopStatus::AwaitingReview);

    // Simulate a crash before the outcome write.
    let mut stale = store.get_agent_loop(&record.id).await.unwrap();
    stale.status = AgentLoopStatus::Running;
    stale.pr_number = None;
    store.update_agent_loop(&stale).await.unwrap();

    assert_eq!(engine.advance(&record.id).await, AgentLoopStatus::AwaitingReview);
    assert_eq!(reasoning.calls().len(), 1);
}
