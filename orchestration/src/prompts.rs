//! Prompt builders for both workflow families.
//!
//! The response format requested here is the contract [`crate::parser`] reads
//! back: `**Strengths**:` style labels for proposals and votes, and the
//! `### Thinking` / `### Action` / `### Files Changed` / `### Status` sections
//! with `file:` / `new:` / `delete:` fences for agent loops. Change both sides
//! together.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever wording changes so logs
//! can tie a response to the prompt that produced it.

use crate::roster::AgentIdentity;
use crate::state::{AgentLoopConfig, DebateEntry, Proposal, Vote, WorkflowKind};

/// Prompt version. Bump on any wording change.
pub const PROMPT_VERSION: &str = "1.3.0";

// =============================================================================
// Deliberation
// =============================================================================

const PROPOSAL_FORMAT: &str = "\
Structure your answer as markdown. After the body of the proposal, finish with \
exactly these labeled lines:

**Strengths**: why this approach is a good fit
**Risks**: what could go wrong and how to mitigate it
**Effort**: rough size (hours or days) and what dominates it";

/// Proposal prompt for one agent, selected by workflow kind.
pub fn proposal_prompt(kind: WorkflowKind, context: &str) -> String {
    let ask = match kind {
        WorkflowKind::ArchitectureReview => {
            "Review the architecture relevant to the request below. Identify structural \
problems, explain their impact, and propose the changes you would make, in priority order."
        }
        WorkflowKind::ImplementationPlan | WorkflowKind::AgentLoop => {
            "Propose an implementation plan for the request below. Name the files and modules \
to change, the order of work, and how the result will be verified."
        }
    };

    let mut prompt = format!("{ask}\n\n");
    if !context.is_empty() {
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }
    prompt.push_str(PROPOSAL_FORMAT);
    prompt
}

fn render_proposals(proposals: &[Proposal]) -> String {
    proposals
        .iter()
        .map(|p| {
            format!(
                "### Proposal from {} (id: {})\n\n{}",
                p.agent_name,
                p.id,
                p.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn render_debate(entries: &[DebateEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            format!(
                "### {} (round {})\n\n{}",
                e.agent_name,
                e.round,
                e.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Round 1: critique every proposal, including your own.
pub fn debate_round_one_prompt(agent_name: &str, proposals: &[Proposal]) -> String {
    format!(
        "You are {agent_name}. These proposals were submitted independently:\n\n{}\n\n\
Critique them. For each proposal state:\n\
**Agreement**: what you agree with\n\
**Concerns**: what worries you and why\n\
**Suggestions**: concrete improvements\n\n\
Finish with **Overall Assessment**: which direction the group should take.",
        render_proposals(proposals)
    )
}

/// Round 2: respond to the round-1 critiques with a final position.
pub fn debate_round_two_prompt(
    agent_name: &str,
    proposals: &[Proposal],
    round_one: &[DebateEntry],
) -> String {
    format!(
        "You are {agent_name}. Proposals:\n\n{}\n\n## Round 1 critiques\n\n{}\n\n\
Considering the critiques above, give your **Updated Position**: what you now recommend, \
what you changed your mind about, and which concerns remain unresolved.",
        render_proposals(proposals),
        render_debate(round_one)
    )
}

/// Vote among the other agents' proposals.
pub fn vote_prompt(
    agent_name: &str,
    proposals: &[Proposal],
    debate: &[DebateEntry],
    candidates: &[String],
) -> String {
    let eligible: Vec<&str> = candidates
        .iter()
        .map(String::as_str)
        .filter(|c| !c.eq_ignore_ascii_case(agent_name))
        .collect();
    format!(
        "You are {agent_name}. Proposals:\n\n{}\n\n## Debate\n\n{}\n\n\
Vote for the single best proposal. You may not vote for your own. \
Eligible agents: {}.\n\n\
Answer with exactly:\n\
**Vote**: <agent name>\n\
**Reasoning**: why this proposal should be adopted",
        render_proposals(proposals),
        render_debate(debate),
        eligible.join(", ")
    )
}

pub const SYNTHESIS_SYSTEM_PROMPT: &str = "\
You are the facilitator of an engineering council. You write the final decision \
document after proposals, debate and a vote. You are neutral: you integrate the \
strongest points from every participant while building on the winning proposal.";

/// Synthesis: one decision document from the whole deliberation.
pub fn synthesis_prompt(
    title: &str,
    context: &str,
    proposals: &[Proposal],
    debate: &[DebateEntry],
    votes: &[Vote],
    winner: &str,
) -> String {
    let tally = votes
        .iter()
        .map(|v| format!("- {} voted for {}", v.agent_name, v.voted_for))
        .collect::<Vec<_>>()
        .join("\n");
    let mut prompt = format!("# {title}\n\n");
    if !context.is_empty() {
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!(
        "## Proposals\n\n{}\n\n## Debate\n\n{}\n\n## Votes\n\n{tally}\n\n\
The winning proposal is from **{winner}**.\n\n\
Write the final decision document in markdown with these sections: \
## Decision, ## Rationale, ## Implementation Plan (numbered steps naming files), \
## Risks and Mitigations, ## Dissenting Views.",
        render_proposals(proposals),
        render_debate(debate)
    ));
    prompt
}

pub const SUMMARY_SYSTEM_PROMPT: &str = "\
You write executive summaries for engineering leads. Be brief and specific.";

/// Executive summary of a decision document.
pub fn executive_summary_prompt(title: &str, decision: &str) -> String {
    format!(
        "Summarize the decision below for \"{title}\" in 5 to 8 markdown bullets. Cover: \
the decision itself, the main risks, where the council agreed, concrete action items, \
and open questions if any remain. No preamble.\n\n{decision}"
    )
}

// =============================================================================
// Agent loop
// =============================================================================

const LOOP_PROTOCOL: &str = "\
## Working protocol

You work in iterations. In every response use exactly these sections:

### Thinking
What you know, what you will do in this iteration, and why.

### Action
The file changes for this iteration as fenced blocks. Use one block per file and \
always write the COMPLETE file content:

```file:path/to/existing/file.ts
<entire new content>
```

```new:path/to/new/file.ts
<entire content>
```

```delete:path/to/removed/file.ts
```

### Files Changed
A bullet list of every path you touched in this iteration.

### Status
Exactly one of:
- **CONTINUE** — more iterations are needed
- **DONE** — the task is complete
- **BLOCKED** — you cannot proceed; explain why on the same line

Paths are relative to the repository root. Later blocks for the same path replace \
earlier ones, so you can refine a file in a later iteration by emitting it again.";

/// System prompt for an agent loop run.
pub fn agent_loop_system_prompt(agent: &AgentIdentity, config: &AgentLoopConfig) -> String {
    let mut prompt = format!("{}\n\n{LOOP_PROTOCOL}", agent.system_prompt);

    let mut requirements = Vec::new();
    if config.require_tests {
        requirements.push("Add or update tests covering the change.");
    }
    if config.require_build {
        requirements.push("The project must still build; do not leave dangling references.");
    }
    if !requirements.is_empty() {
        prompt.push_str("\n\n## Requirements\n");
        for r in requirements {
            prompt.push_str("\n- ");
            prompt.push_str(r);
        }
    }

    if !config.extra_system_prompt.trim().is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(config.extra_system_prompt.trim());
    }
    prompt
}

/// First user message of an agent loop conversation.
pub fn agent_loop_seed(title: &str, context: &str, max_iterations: u32) -> String {
    let mut seed = format!("# Task: {title}\n\n");
    if !context.is_empty() {
        seed.push_str(context);
        seed.push_str("\n\n");
    }
    seed.push_str(&format!(
        "You have at most {max_iterations} iterations. Begin with iteration 1."
    ));
    seed
}

/// Section describing why the previous attempt failed.
pub fn feedback_section(feedback: &str) -> String {
    format!(
        "A previous attempt at this task failed. Avoid repeating it:\n\n{}",
        feedback.trim()
    )
}

/// User turn after a CONTINUE response.
pub fn continuation_prompt(next_iteration: u32, max_iterations: u32) -> String {
    let remaining = max_iterations.saturating_sub(next_iteration) + 1;
    format!(
        "Continue with iteration {next_iteration} of {max_iterations} ({remaining} remaining). \
Use the same sections. Respond **DONE** once the task is complete."
    )
}

/// Note appended after an iteration that failed to produce a response.
pub fn retry_prompt(error: &str) -> String {
    format!(
        "The previous iteration failed with an error: {error}\n\
Retry, using the same response sections."
    )
}
