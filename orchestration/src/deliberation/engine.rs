//! Deliberation engine — proposing → debating → voting → decided.
//!
//! Each call to [`DeliberationEngine::advance`] performs the one phase
//! transition implied by the persisted status. Phases are resumable: agents
//! that already have a record for the phase are skipped, so a crashed or
//! repeated `advance` never duplicates proposals, debate entries or votes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::tally::tally_votes;
use crate::config::{pause, EngineConfig};
use crate::context::{
    push_target_item, ContextProvider, ContextSections, IssueLookup, NoIssueLookup, StaticContext,
};
use crate::error::{EngineError, EngineResult};
use crate::notify::{NoopNotifier, SharedNotifier, WorkflowEvent};
use crate::parser::{parse_proposal, parse_vote, ParsedResponse};
use crate::prompts;
use crate::reasoning::{
    Completion, InvokeOptions, ReasoningRequest, ReasoningResult, SharedReasoning,
};
use crate::roster::{roster_for, AgentIdentity};
use crate::state::{
    new_id, DebateEntry, Deliberation, DeliberationStatus, Proposal, SharedStore, TokenUsage,
    Vote,
};

/// Number of debate rounds
pub const DEBATE_ROUNDS: u32 = 2;

/// Agent name used for synthesis and summary calls
const FACILITATOR: &str = "Facilitator";

/// Drives deliberations stored in a [`SharedStore`]
pub struct DeliberationEngine {
    store: SharedStore,
    reasoning: SharedReasoning,
    context: Arc<dyn ContextProvider>,
    issues: Arc<dyn IssueLookup>,
    notifier: SharedNotifier,
    config: EngineConfig,
}

impl DeliberationEngine {
    pub fn new(store: SharedStore, reasoning: SharedReasoning, config: EngineConfig) -> Self {
        Self {
            store,
            reasoning,
            context: Arc::new(StaticContext(String::new())),
            issues: Arc::new(NoIssueLookup),
            notifier: Arc::new(NoopNotifier),
            config,
        }
    }

    pub fn with_context(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = context;
        self
    }

    pub fn with_issue_lookup(mut self, issues: Arc<dyn IssueLookup>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Persist a new deliberation in `proposing`.
    pub async fn create(&self, deliberation: Deliberation) -> EngineResult<Deliberation> {
        self.store.create_deliberation(&deliberation).await?;
        info!(
            deliberation_id = %deliberation.id,
            kind = %deliberation.kind,
            title = %deliberation.title,
            "Deliberation created"
        );
        Ok(deliberation)
    }

    // =========================================================================
    // Entry points (never propagate errors)
    // =========================================================================

    /// Run the proposing phase; leaves the deliberation in `debating` (or
    /// `failed`). A deliberation past proposing is returned unchanged.
    pub async fn start(&self, id: &str) -> DeliberationStatus {
        let result = match self.store.get_deliberation(id).await {
            Ok(d) if d.status == DeliberationStatus::Proposing => self.run_proposing(d).await,
            Ok(d) => Ok(d.status),
            Err(e) => Err(e.into()),
        };
        self.settle(id, result).await
    }

    /// Perform the next phase transition from the persisted status.
    pub async fn advance(&self, id: &str) -> DeliberationStatus {
        let result = self.try_advance(id).await;
        self.settle(id, result).await
    }

    /// Advance until decided or failed.
    pub async fn run_to_completion(&self, id: &str) -> DeliberationStatus {
        loop {
            let status = self.advance(id).await;
            if status.is_terminal() {
                return status;
            }
            pause(self.config.pacing.inter_phase()).await;
        }
    }

    /// Like [`advance`](Self::advance) but returns the error instead of
    /// recording it.
    pub async fn try_advance(&self, id: &str) -> EngineResult<DeliberationStatus> {
        let deliberation = self.store.get_deliberation(id).await?;
        match deliberation.status {
            DeliberationStatus::Proposing => self.run_proposing(deliberation).await,
            DeliberationStatus::Debating => self.run_debate(deliberation).await,
            DeliberationStatus::Voting => self.run_voting(deliberation).await,
            status @ (DeliberationStatus::Decided | DeliberationStatus::Failed) => Ok(status),
        }
    }

    async fn settle(
        &self,
        id: &str,
        result: EngineResult<DeliberationStatus>,
    ) -> DeliberationStatus {
        match result {
            Ok(status) => status,
            Err(e) => self.mark_failed(id, &e).await,
        }
    }

    /// Record a fatal error. Best-effort: a deliberation that is already
    /// terminal, or a store that cannot be written, is left as is.
    async fn mark_failed(&self, id: &str, error: &EngineError) -> DeliberationStatus {
        warn!(deliberation_id = %id, error = %error, "Deliberation failed");
        let mut record = match self.store.get_deliberation(id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(deliberation_id = %id, error = %e, "Could not load deliberation to record failure");
                return DeliberationStatus::Failed;
            }
        };
        if record.status.is_terminal() {
            return record.status;
        }

        record.status = DeliberationStatus::Failed;
        record.error = Some(error.to_string());
        record.completed_at = Some(Utc::now());
        if let Err(e) = self.store.update_deliberation(&record).await {
            warn!(deliberation_id = %id, error = %e, "Could not record deliberation failure");
        }
        self.notifier
            .notify(WorkflowEvent::DeliberationFailed {
                id: record.id.clone(),
                title: record.title.clone(),
                error: error.to_string(),
            })
            .await;
        DeliberationStatus::Failed
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    async fn invoke(
        &self,
        activity: &str,
        deliberation: &Deliberation,
        agent_name: &str,
        model: &str,
        system_prompt: &str,
        prompt: String,
        max_output_tokens: u32,
    ) -> ReasoningResult<Completion> {
        debug!(
            deliberation_id = %deliberation.id,
            agent = agent_name,
            activity,
            prompt_chars = prompt.len(),
            prompt_version = prompts::PROMPT_VERSION,
            "Invoking agent"
        );
        self.reasoning
            .invoke(ReasoningRequest::single(
                activity,
                system_prompt,
                prompt,
                InvokeOptions {
                    max_output_tokens,
                    model: Some(model.to_string()),
                    correlation: Some(format!("{}:{agent_name}", deliberation.id)),
                },
            ))
            .await
    }

    async fn build_context(&self, deliberation: &Deliberation) -> EngineResult<String> {
        let mut sections = ContextSections::new();
        sections.push("Request", deliberation.title.clone());
        push_target_item(
            &mut sections,
            self.store.as_ref(),
            self.issues.as_ref(),
            deliberation.target_item_id.as_deref(),
        )
        .await?;
        sections.push("Instructions", deliberation.instructions.clone());
        sections.push("Codebase Context", self.context.get_context().await);
        Ok(sections.render())
    }

    /// Move to `to`, adding `usage`, and persist. Re-reads the record so
    /// the version check covers the whole phase.
    async fn transition(
        &self,
        id: &str,
        to: DeliberationStatus,
        usage: TokenUsage,
        apply: impl FnOnce(&mut Deliberation),
    ) -> EngineResult<Deliberation> {
        let mut record = self.store.get_deliberation(id).await?;
        if !record.status.can_transition_to(to) {
            return Err(EngineError::IllegalTransition {
                from: record.status.to_string(),
                to: to.to_string(),
            });
        }
        record.status = to;
        record.usage.add(usage);
        apply(&mut record);
        let updated = self.store.update_deliberation(&record).await?;
        info!(
            deliberation_id = %id,
            phase = %to,
            input_tokens = updated.usage.input_tokens,
            output_tokens = updated.usage.output_tokens,
            "Deliberation advanced"
        );
        Ok(updated)
    }

    /// Roster agents that produced a proposal, in roster order.
    fn participants(deliberation: &Deliberation, proposals: &[Proposal]) -> Vec<AgentIdentity> {
        roster_for(deliberation.kind)
            .into_iter()
            .filter(|agent| proposals.iter().any(|p| p.agent_name == agent.name))
            .collect()
    }

    // =========================================================================
    // Phases
    // =========================================================================

    async fn run_proposing(&self, deliberation: Deliberation) -> EngineResult<DeliberationStatus> {
        let id = deliberation.id.clone();
        if deliberation.started_at.is_none() {
            let mut started = deliberation.clone();
            started.started_at = Some(Utc::now());
            self.store.update_deliberation(&started).await?;
        }
        info!(deliberation_id = %id, kind = %deliberation.kind, "Proposing phase started");

        let context = self.build_context(&deliberation).await?;
        let prompt = prompts::proposal_prompt(deliberation.kind, &context);
        let existing = self.store.list_proposals(&id).await?;
        let mut usage = TokenUsage::default();
        let mut produced = existing.len();
        let mut called = false;

        for agent in roster_for(deliberation.kind) {
            if existing.iter().any(|p| p.agent_name == agent.name) {
                debug!(deliberation_id = %id, agent = %agent.name, "Proposal exists; skipping");
                continue;
            }
            if called {
                pause(self.config.pacing.inter_call()).await;
            }
            called = true;

            let completion = match self
                .invoke(
                    "deliberation.proposal",
                    &deliberation,
                    &agent.name,
                    &agent.model,
                    &agent.system_prompt,
                    prompt.clone(),
                    self.config.max_output_tokens,
                )
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    warn!(deliberation_id = %id, agent = %agent.name, error = %e, "Proposal failed");
                    continue;
                }
            };

            let parsed = parse_proposal(&completion.content);
            if parsed.is_malformed() {
                debug!(deliberation_id = %id, agent = %agent.name, "Proposal without labeled fields");
            }
            let fields = parsed.into_inner();
            usage.add(completion.usage());
            self.store
                .create_proposal(&Proposal {
                    id: new_id(),
                    deliberation_id: id.clone(),
                    agent_name: agent.name.clone(),
                    model: completion.model.clone(),
                    content: completion.content,
                    strengths: fields.strengths,
                    risks: fields.risks,
                    effort: fields.effort,
                    usage: TokenUsage::new(completion.input_tokens, completion.output_tokens),
                    created_at: Utc::now(),
                })
                .await?;
            produced += 1;
            info!(deliberation_id = %id, agent = %agent.name, "Proposal recorded");
        }

        if produced == 0 {
            return Err(EngineError::all_failed("proposing"));
        }

        self.transition(&id, DeliberationStatus::Debating, usage, |_| {})
            .await
            .map(|d| d.status)
    }

    async fn run_debate(&self, deliberation: Deliberation) -> EngineResult<DeliberationStatus> {
        let id = deliberation.id.clone();
        let proposals = self.store.list_proposals(&id).await?;
        let references: Vec<String> = proposals.iter().map(|p| p.id.clone()).collect();
        let participants = Self::participants(&deliberation, &proposals);
        let mut usage = TokenUsage::default();

        for round in 1..=DEBATE_ROUNDS {
            if round > 1 {
                pause(self.config.pacing.inter_phase()).await;
            }
            info!(deliberation_id = %id, round, "Debate round started");

            let existing = self.store.list_debate_entries(&id, Some(round)).await?;
            let previous = if round > 1 {
                self.store.list_debate_entries(&id, Some(round - 1)).await?
            } else {
                Vec::new()
            };
            let mut produced = existing.len();
            let mut called = false;

            for agent in &participants {
                if existing.iter().any(|e| e.agent_name == agent.name) {
                    continue;
                }
                if called {
                    pause(self.config.pacing.inter_call()).await;
                }
                called = true;

                let prompt = if round == 1 {
                    prompts::debate_round_one_prompt(&agent.name, &proposals)
                } else {
                    prompts::debate_round_two_prompt(&agent.name, &proposals, &previous)
                };
                match self
                    .invoke(
                        "deliberation.debate",
                        &deliberation,
                        &agent.name,
                        &agent.model,
                        &agent.system_prompt,
                        prompt,
                        self.config.max_output_tokens,
                    )
                    .await
                {
                    Ok(completion) => {
                        usage.add(completion.usage());
                        self.store
                            .create_debate_entry(&DebateEntry {
                                id: new_id(),
                                deliberation_id: id.clone(),
                                round,
                                agent_name: agent.name.clone(),
                                content: completion.content,
                                references: references.clone(),
                                created_at: Utc::now(),
                            })
                            .await?;
                        produced += 1;
                    }
                    Err(e) => {
                        warn!(deliberation_id = %id, agent = %agent.name, round, error = %e, "Debate entry failed");
                    }
                }
            }

            if produced == 0 {
                return Err(EngineError::all_failed(format!("debate round {round}")));
            }
        }

        self.transition(&id, DeliberationStatus::Voting, usage, |_| {})
            .await
            .map(|d| d.status)
    }

    async fn run_voting(&self, deliberation: Deliberation) -> EngineResult<DeliberationStatus> {
        let id = deliberation.id.clone();
        let proposals = self.store.list_proposals(&id).await?;
        let debate = self.store.list_debate_entries(&id, None).await?;
        let participants = Self::participants(&deliberation, &proposals);
        let candidates: Vec<String> = proposals.iter().map(|p| p.agent_name.clone()).collect();
        let existing = self.store.list_votes(&id).await?;
        let mut usage = TokenUsage::default();
        let mut called = false;

        info!(deliberation_id = %id, voters = participants.len(), "Voting started");
        for agent in &participants {
            if existing.iter().any(|v| v.agent_name == agent.name) {
                continue;
            }
            if !candidates.iter().any(|c| *c != agent.name) {
                debug!(deliberation_id = %id, agent = %agent.name, "No eligible candidate; not voting");
                continue;
            }
            if called {
                pause(self.config.pacing.inter_call()).await;
            }
            called = true;

            let prompt = prompts::vote_prompt(&agent.name, &proposals, &debate, &candidates);
            let completion = match self
                .invoke(
                    "deliberation.vote",
                    &deliberation,
                    &agent.name,
                    &agent.model,
                    &agent.system_prompt,
                    prompt,
                    self.config.max_output_tokens,
                )
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    warn!(deliberation_id = %id, agent = %agent.name, error = %e, "Vote failed");
                    continue;
                }
            };
            usage.add(completion.usage());

            let Some(parsed) = parse_vote(&completion.content, &agent.name, &candidates) else {
                continue;
            };
            if let ParsedResponse::Malformed { reason, .. } = &parsed {
                debug!(deliberation_id = %id, agent = %agent.name, reason = %reason, "Vote fell back to first eligible");
            }
            let choice = parsed.into_inner();
            let proposal_id = proposals
                .iter()
                .find(|p| p.agent_name == choice.target)
                .map(|p| p.id.clone());
            self.store
                .create_vote(&Vote {
                    id: new_id(),
                    deliberation_id: id.clone(),
                    agent_name: agent.name.clone(),
                    voted_for: choice.target.clone(),
                    proposal_id,
                    reasoning: choice.reasoning,
                    created_at: Utc::now(),
                })
                .await?;
            info!(deliberation_id = %id, agent = %agent.name, voted_for = %choice.target, "Vote recorded");
        }

        let votes = self.store.list_votes(&id).await?;
        let winner = match tally_votes(&votes).winner {
            Some(winner) => winner,
            // A lone proposer has nobody to vote for; its proposal stands.
            None if proposals.len() == 1 => proposals[0].agent_name.clone(),
            None => return Err(EngineError::all_failed("voting")),
        };
        let winning_proposal_id = proposals
            .iter()
            .find(|p| p.agent_name == winner)
            .map(|p| p.id.clone());
        info!(deliberation_id = %id, winner = %winner, votes = votes.len(), "Votes tallied");

        pause(self.config.pacing.inter_phase()).await;
        let context = self.build_context(&deliberation).await?;
        let facilitator_model = roster_for(deliberation.kind)
            .first()
            .map(|a| a.model.clone())
            .unwrap_or_default();
        let synthesis = self
            .invoke(
                "deliberation.synthesis",
                &deliberation,
                FACILITATOR,
                &facilitator_model,
                prompts::SYNTHESIS_SYSTEM_PROMPT,
                prompts::synthesis_prompt(
                    &deliberation.title,
                    &context,
                    &proposals,
                    &debate,
                    &votes,
                    &winner,
                ),
                self.config.synthesis_max_tokens,
            )
            .await?;
        usage.add(synthesis.usage());

        pause(self.config.pacing.inter_call()).await;
        let summary = match self
            .invoke(
                "deliberation.summary",
                &deliberation,
                FACILITATOR,
                &facilitator_model,
                prompts::SUMMARY_SYSTEM_PROMPT,
                prompts::executive_summary_prompt(&deliberation.title, &synthesis.content),
                self.config.summary_max_tokens,
            )
            .await
        {
            Ok(completion) => {
                usage.add(completion.usage());
                completion.content.trim().to_string()
            }
            Err(e) => {
                warn!(deliberation_id = %id, error = %e, "Executive summary failed; continuing without it");
                String::new()
            }
        };

        let decision = synthesis.content;
        let decided = self
            .transition(&id, DeliberationStatus::Decided, usage, |d| {
                d.decision = Some(decision);
                d.summary = Some(summary.clone());
                d.winner = Some(winner.clone());
                d.winning_proposal_id = winning_proposal_id;
                d.completed_at = Some(Utc::now());
            })
            .await?;

        self.notifier
            .notify(WorkflowEvent::DeliberationDecided {
                id: decided.id.clone(),
                title: decided.title.clone(),
                winner: decided.winner.clone(),
                summary,
            })
            .await;
        Ok(decided.status)
    }
}
