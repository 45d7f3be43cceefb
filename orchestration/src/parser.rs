//! Response parsing — free text from the reasoning service into structured results.
//!
//! Model output follows the markdown conventions requested in [`crate::prompts`],
//! but nothing guarantees it. Every extractor here degrades to a default instead
//! of failing: missing sections are `""`, a missing status is `Continue`, and
//! fences with an unknown tag are skipped.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Fenced block tagged `file:`, `new:` or `delete:` followed by a path.
static FILE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(file|new|delete):([^\s`]+)[^\n`]*(?:\n(.*?))?```")
        .expect("FILE_BLOCK_RE regex should compile")
});

static BOLD_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\*\*\s*(CONTINUE|DONE|BLOCKED)\s*\*\*")
        .expect("BOLD_STATUS_RE regex should compile")
});

/// Unbolded token: uppercase only, and only at the start of a status line.
static PLAIN_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*[-*]?\s*(CONTINUE|DONE|BLOCKED)\b")
        .expect("PLAIN_STATUS_RE regex should compile")
});

/// Any bold span, used to terminate a labeled section.
static BOLD_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*[^*\n]+\*\*").expect("BOLD_SPAN_RE regex should compile"));

static MARKDOWN_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*#{1,6}\s").expect("MARKDOWN_HEADING_RE regex should compile")
});

/// Outcome of parsing model output.
///
/// `Malformed` still carries a usable value built from per-field defaults, so
/// callers never branch on errors, only on how much to trust the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResponse<T> {
    Parsed(T),
    Malformed { fallback: T, reason: String },
}

impl<T> ParsedResponse<T> {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Parsed(v) => v,
            Self::Malformed { fallback, .. } => fallback,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Parsed(v) => v,
            Self::Malformed { fallback, .. } => fallback,
        }
    }
}

// =============================================================================
// Generic extraction
// =============================================================================

/// Title of a markdown heading line, without the leading hashes.
fn heading_title(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// If `title` names `heading`, return whatever trails it on the same line.
fn match_heading<'a>(title: &'a str, heading: &str) -> Option<&'a str> {
    let head = title.get(..heading.len())?;
    if !head.eq_ignore_ascii_case(heading) {
        return None;
    }
    let rest = &title[heading.len()..];
    if rest.starts_with(|c: char| c.is_alphanumeric()) {
        return None;
    }
    Some(rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace()))
}

/// Body of the markdown section titled `heading` (any heading level,
/// case-insensitive), up to the next heading outside a code fence.
pub fn extract_section(text: &str, heading: &str) -> String {
    let mut in_fence = false;
    let mut capturing = false;
    let mut body: Vec<&str> = Vec::new();

    for line in text.lines() {
        if !in_fence {
            if let Some(title) = heading_title(line) {
                if capturing {
                    break;
                }
                if let Some(trailing) = match_heading(title, heading) {
                    capturing = true;
                    if !trailing.is_empty() {
                        body.push(trailing);
                    }
                    continue;
                }
            }
        }
        // A one-line block such as ```delete:path``` opens and closes itself.
        if line.trim_start().starts_with("```") && line.matches("```").count() % 2 == 1 {
            in_fence = !in_fence;
        }
        if capturing {
            body.push(line);
        }
    }

    body.join("\n").trim().to_string()
}

fn label_regex(label: &str) -> Option<Regex> {
    let pattern = format!(
        r"(?i)\*\*\s*{label}\s*:?\s*\*\*\s*:?",
        label = regex::escape(label)
    );
    Regex::new(&pattern).ok()
}

/// Text following `**Label**:` to the end of that line, markup included.
fn labeled_line<'a>(text: &'a str, label: &str) -> &'a str {
    let Some(m) = label_regex(label).and_then(|re| re.find(text)) else {
        return "";
    };
    let rest = &text[m.end()..];
    rest.lines().next().unwrap_or_default().trim()
}

/// Text following `**Label**:` up to the next bold span or heading.
pub fn extract_labeled_section(text: &str, label: &str) -> String {
    let Some(m) = label_regex(label).and_then(|re| re.find(text)) else {
        return String::new();
    };

    let rest = &text[m.end()..];
    let bold_end = BOLD_SPAN_RE.find(rest).map(|b| b.start());
    let heading_end = MARKDOWN_HEADING_RE.find(rest).map(|h| h.start());
    let end = match (bold_end, heading_end) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => rest.len(),
    };
    rest[..end].trim().to_string()
}

/// Truncate to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

// =============================================================================
// File change blocks
// =============================================================================

/// What an emitted block does to its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A file change extracted from one response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub action: FileAction,
    /// Full new content; `None` for deletes
    pub content: Option<String>,
}

/// Extract every `file:` / `new:` / `delete:` fenced block, in order.
pub fn extract_file_changes(text: &str) -> Vec<FileChange> {
    FILE_BLOCK_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let tag = caps.get(1)?.as_str();
            let path = caps.get(2)?.as_str().trim().trim_start_matches("./");
            if path.is_empty() {
                return None;
            }
            let body = caps.get(3).map(|b| b.as_str()).unwrap_or_default();
            let (action, content) = match tag {
                "file" => (FileAction::Update, Some(body.to_string())),
                "new" => (FileAction::Create, Some(body.to_string())),
                "delete" => (FileAction::Delete, None),
                _ => return None,
            };
            Some(FileChange {
                path: path.to_string(),
                action,
                content,
            })
        })
        .collect()
}

// =============================================================================
// Agent loop responses
// =============================================================================

/// Loop control flag reported by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopSignal {
    Continue,
    Done,
    Blocked,
}

impl LoopSignal {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "CONTINUE" => Some(Self::Continue),
            "DONE" => Some(Self::Done),
            "BLOCKED" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// Status flag from the `### Status` section, falling back to a bold token
/// anywhere in the response, then to `Continue`.
pub fn extract_status(text: &str) -> LoopSignal {
    let section = extract_section(text, "Status");
    let from_section = BOLD_STATUS_RE
        .captures(&section)
        .or_else(|| PLAIN_STATUS_RE.captures(&section))
        .and_then(|c| LoopSignal::from_token(c.get(1)?.as_str()));
    if let Some(signal) = from_section {
        return signal;
    }
    if section.is_empty() {
        if let Some(signal) = BOLD_STATUS_RE
            .captures_iter(text)
            .last()
            .and_then(|c| LoopSignal::from_token(c.get(1)?.as_str()))
        {
            return signal;
        }
    }
    LoopSignal::Continue
}

/// Structured view of one agent loop response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationReport {
    pub thinking: String,
    pub action: String,
    pub observation: String,
    pub files_changed: Vec<String>,
    pub changes: Vec<FileChange>,
    pub signal: LoopSignal,
    /// Explanation accompanying a BLOCKED status
    pub blocked_reason: Option<String>,
}

/// Parse an agent loop response.
///
/// Responses without any of the protocol headings are `Malformed`: the whole
/// text becomes the thinking, file blocks are still honoured, status defaults
/// to `Continue`.
pub fn parse_iteration(text: &str) -> ParsedResponse<IterationReport> {
    let thinking = extract_section(text, "Thinking");
    let action = extract_section(text, "Action");
    let files_section = extract_section(text, "Files Changed");
    let status_section = extract_section(text, "Status");
    let observation = {
        let explicit = extract_section(text, "Observation");
        if explicit.is_empty() {
            files_section.clone()
        } else {
            explicit
        }
    };

    let changes = extract_file_changes(text);
    let mut files_changed: Vec<String> = Vec::new();
    for change in &changes {
        if !files_changed.contains(&change.path) {
            files_changed.push(change.path.clone());
        }
    }
    if files_changed.is_empty() {
        files_changed = bullet_paths(&files_section);
    }

    let signal = extract_status(text);
    let blocked_reason = (signal == LoopSignal::Blocked).then(|| {
        let reason = if BOLD_STATUS_RE.is_match(&status_section) {
            BOLD_STATUS_RE.replace_all(&status_section, "")
        } else {
            PLAIN_STATUS_RE.replace(&status_section, "")
        };
        let reason = reason.trim().trim_start_matches(['-', ':', '—']).trim();
        if !reason.is_empty() {
            reason.to_string()
        } else if !thinking.is_empty() {
            truncate_chars(&thinking, 500)
        } else {
            "agent reported BLOCKED without a reason".to_string()
        }
    });

    let has_structure = !thinking.is_empty() || !action.is_empty() || !status_section.is_empty();
    let report = IterationReport {
        thinking: if has_structure {
            thinking
        } else {
            text.trim().to_string()
        },
        action,
        observation,
        files_changed,
        changes,
        signal,
        blocked_reason,
    };

    if has_structure {
        ParsedResponse::Parsed(report)
    } else {
        ParsedResponse::Malformed {
            fallback: report,
            reason: "no Thinking/Action/Status sections found".to_string(),
        }
    }
}

/// Paths listed as `- path` / `* path` bullets.
fn bullet_paths(section: &str) -> Vec<String> {
    section
        .lines()
        .filter_map(|line| {
            let item = line.trim().strip_prefix(['-', '*'])?.trim();
            let path = item
                .split_whitespace()
                .next()?
                .trim_matches(|c: char| c == '`' || c == ',' || c == ':');
            (!path.is_empty()).then(|| path.to_string())
        })
        .collect()
}

// =============================================================================
// Deliberation responses
// =============================================================================

/// Fields pulled out of a proposal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalFields {
    pub strengths: String,
    pub risks: String,
    pub effort: String,
}

pub fn parse_proposal(text: &str) -> ParsedResponse<ProposalFields> {
    let fields = ProposalFields {
        strengths: extract_labeled_section(text, "Strengths"),
        risks: extract_labeled_section(text, "Risks"),
        effort: extract_labeled_section(text, "Effort"),
    };
    if fields.strengths.is_empty() && fields.risks.is_empty() && fields.effort.is_empty() {
        ParsedResponse::Malformed {
            fallback: fields,
            reason: "no Strengths/Risks/Effort labels found".to_string(),
        }
    } else {
        ParsedResponse::Parsed(fields)
    }
}

/// Who an agent voted for and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteChoice {
    /// Canonical agent name from the candidate list
    pub target: String,
    pub reasoning: String,
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Match free-text `raw` to one of `candidates` (case-insensitive, substring
/// either way), skipping `voter`. Exact matches win over substring matches.
pub fn match_agent_name(raw: &str, candidates: &[String], voter: &str) -> Option<String> {
    let wanted = normalize_name(raw);
    if wanted.is_empty() {
        return None;
    }
    let voter = normalize_name(voter);
    let eligible: Vec<(&String, String)> = candidates
        .iter()
        .map(|c| (c, normalize_name(c)))
        .filter(|(_, norm)| !norm.is_empty() && *norm != voter)
        .collect();

    eligible
        .iter()
        .find(|(_, norm)| *norm == wanted)
        .or_else(|| {
            eligible
                .iter()
                .find(|(_, norm)| wanted.contains(norm.as_str()) || norm.contains(&wanted))
        })
        .map(|(name, _)| (*name).clone())
}

/// Parse a vote from `voter` among `candidates`.
///
/// Returns `None` only when no candidate other than the voter exists. A
/// missing or unmatched vote falls back to the first eligible candidate.
pub fn parse_vote(
    text: &str,
    voter: &str,
    candidates: &[String],
) -> Option<ParsedResponse<VoteChoice>> {
    let voter_norm = normalize_name(voter);
    let first_eligible = candidates
        .iter()
        .find(|c| normalize_name(c) != voter_norm)?
        .clone();

    let mut reasoning = extract_labeled_section(text, "Reasoning");
    if reasoning.is_empty() {
        reasoning = text.trim().to_string();
    }

    let raw_vote = labeled_line(text, "Vote");
    let raw_vote = raw_vote.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '*' | '`' | '"' | '\'')
    });

    match match_agent_name(raw_vote, candidates, voter) {
        Some(target) => Some(ParsedResponse::Parsed(VoteChoice { target, reasoning })),
        None => Some(ParsedResponse::Malformed {
            fallback: VoteChoice {
                target: first_eligible,
                reasoning,
            },
            reason: if raw_vote.is_empty() {
                "no explicit vote found".to_string()
            } else {
                format!("vote target '{raw_vote}' matches no eligible agent")
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = "\
### Thinking
The session list needs a search box.

### Action
```file:src/components/SessionList.tsx
export const SessionList = () => null;
```

```new:src/lib/search.ts
export function search() {}
```

```delete:src/legacy/old.ts
```

### Files Changed
- src/components/SessionList.tsx
- src/lib/search.ts

### Status
**CONTINUE**
";

    #[test]
    fn test_parse_well_formed_iteration() {
        let parsed = parse_iteration(WELL_FORMED);
        assert!(!parsed.is_malformed());
        let report = parsed.into_inner();
        assert_eq!(report.thinking, "The session list needs a search box.");
        assert_eq!(report.signal, LoopSignal::Continue);
        assert_eq!(report.changes.len(), 3);
        assert_eq!(report.changes[0].action, FileAction::Update);
        assert_eq!(
            report.changes[0].content.as_deref(),
            Some("export const SessionList = () => null;\n")
        );
        assert_eq!(report.changes[1].action, FileAction::Create);
        assert_eq!(report.changes[2].action, FileAction::Delete);
        assert_eq!(report.changes[2].content, None);
        assert_eq!(
            report.files_changed,
            vec![
                "src/components/SessionList.tsx",
                "src/lib/search.ts",
                "src/legacy/old.ts"
            ]
        );
        assert!(report.observation.contains("src/lib/search.ts"));
    }

    #[test]
    fn test_section_ignores_headings_inside_fences() {
        let text = "### Action\n```file:README.md\n# Title\n## Usage\n```\n### Status\n**DONE**";
        let action = extract_section(text, "Action");
        assert!(action.contains("## Usage"));
        assert_eq!(extract_status(text), LoopSignal::Done);
    }

    #[test]
    fn test_status_table() {
        let cases: &[(&str, LoopSignal)] = &[
            ("### Status\n**DONE**", LoopSignal::Done),
            ("### Status\n**blocked** missing credentials", LoopSignal::Blocked),
            ("### Status\nDONE - all wired up", LoopSignal::Done),
            ("### Status: **BLOCKED**", LoopSignal::Blocked),
            ("### Status\n**MAYBE**", LoopSignal::Continue),
            ("no sections at all", LoopSignal::Continue),
            ("", LoopSignal::Continue),
            ("I am **DONE** here", LoopSignal::Done),
            (
                "### Status\nNot done yet, the tests still need updating.",
                LoopSignal::Continue,
            ),
            ("### Status\nwill continue; not DONE", LoopSignal::Continue),
            ("### Status\n- BLOCKED on review", LoopSignal::Blocked),
        ];
        for (input, expected) in cases {
            assert_eq!(extract_status(input), *expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_malformed_inputs_never_panic() {
        let samples = [
            "",
            "```",
            "```file:",
            "```file:a.ts\nunterminated",
            "### ",
            "#",
            "**",
            "**Strengths**:",
            "```delete:x.ts```",
            "### Thinking\n### Action\n### Status",
            "\u{1F600} ### Thinking ü",
        ];
        for sample in samples {
            let _ = parse_iteration(sample);
            let _ = parse_proposal(sample);
            let _ = parse_vote(sample, "Architect", &["Architect".into(), "Pragmatist".into()]);
            let _ = extract_labeled_section(sample, "Risks");
        }
    }

    #[test]
    fn test_unstructured_response_is_malformed_with_defaults() {
        let parsed = parse_iteration("I think we should refactor the SSH agent.");
        assert!(parsed.is_malformed());
        let report = parsed.value();
        assert_eq!(report.thinking, "I think we should refactor the SSH agent.");
        assert_eq!(report.signal, LoopSignal::Continue);
        assert!(report.changes.is_empty());
        assert!(report.action.is_empty());
    }

    #[test]
    fn test_unknown_fence_tags_ignored() {
        let text = "```rust\nfn main() {}\n```\n```patch:src/a.ts\nx\n```\n```file:src/b.ts\ny\n```";
        let changes = extract_file_changes(text);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "src/b.ts");
    }

    #[test]
    fn test_inline_delete_block() {
        let changes = extract_file_changes("```delete:./src/old.ts```");
        assert_eq!(
            changes,
            vec![FileChange {
                path: "src/old.ts".into(),
                action: FileAction::Delete,
                content: None,
            }]
        );
    }

    #[test]
    fn test_blocked_reason_extracted() {
        let text = "### Thinking\nNeed the vault API.\n### Status\n**BLOCKED** The vault schema is not in the repo.";
        let report = parse_iteration(text).into_inner();
        assert_eq!(report.signal, LoopSignal::Blocked);
        assert_eq!(
            report.blocked_reason.as_deref(),
            Some("The vault schema is not in the repo.")
        );
    }

    #[test]
    fn test_inline_delete_does_not_swallow_later_sections() {
        let text = "### Thinking\nRemove the legacy module.\n### Action\n```delete:src/old.ts```\n\
### Observation\nThe module is gone.\n### Files Changed\n- src/old.ts\n\
### Status\n**BLOCKED** need the vault credentials";
        let report = parse_iteration(text).into_inner();
        assert_eq!(report.action, "```delete:src/old.ts```");
        assert_eq!(report.observation, "The module is gone.");
        assert_eq!(report.files_changed, vec!["src/old.ts"]);
        assert_eq!(report.signal, LoopSignal::Blocked);
        assert_eq!(
            report.blocked_reason.as_deref(),
            Some("need the vault credentials")
        );
    }

    #[test]
    fn test_blocked_reason_falls_back_to_thinking() {
        let text = "### Thinking\nCannot find the billing module.\n### Status\n**BLOCKED**";
        let report = parse_iteration(text).into_inner();
        assert_eq!(
            report.blocked_reason.as_deref(),
            Some("Cannot find the billing module.")
        );
    }

    #[test]
    fn test_files_changed_from_bullets_when_no_blocks() {
        let text = "### Thinking\nx\n### Files Changed\n- `src/a.ts` (updated)\n* src/b.ts\n### Status\n**CONTINUE**";
        let report = parse_iteration(text).into_inner();
        assert_eq!(report.files_changed, vec!["src/a.ts", "src/b.ts"]);
    }

    #[test]
    fn test_labeled_sections_table() {
        let text = "Plan text.\n\n**Strengths**: Simple, reuses the vault.\n**Risks**: Key migration.\n\n**Effort:** 3 days\n";
        let cases: &[(&str, &str)] = &[
            ("Strengths", "Simple, reuses the vault."),
            ("risks", "Key migration."),
            ("Effort", "3 days"),
            ("Timeline", ""),
        ];
        for (label, expected) in cases {
            assert_eq!(extract_labeled_section(text, label), *expected, "label {label}");
        }
    }

    #[test]
    fn test_labeled_section_stops_at_heading() {
        let text = "**Risks**: Data loss on sync\n## Next steps\nShip it";
        assert_eq!(extract_labeled_section(text, "Risks"), "Data loss on sync");
    }

    #[test]
    fn test_parse_proposal_malformed_when_no_labels() {
        let parsed = parse_proposal("Just do it.");
        assert!(parsed.is_malformed());
        assert_eq!(parsed.into_inner(), ProposalFields::default());
    }

    fn roster() -> Vec<String> {
        vec![
            "Architect".to_string(),
            "Security Analyst".to_string(),
            "Pragmatist".to_string(),
        ]
    }

    #[test]
    fn test_vote_fuzzy_match() {
        let text = "**Vote**: the security analyst's proposal\n**Reasoning**: Covers key rotation.";
        let parsed = parse_vote(text, "Architect", &roster()).unwrap();
        assert!(!parsed.is_malformed());
        let choice = parsed.into_inner();
        assert_eq!(choice.target, "Security Analyst");
        assert_eq!(choice.reasoning, "Covers key rotation.");
    }

    #[test]
    fn test_bold_vote_target_is_honoured() {
        let cases = [
            "**Vote**: **Pragmatist**\n**Reasoning**: simplest.",
            "**Vote:** `Pragmatist`\n**Reasoning**: simplest.",
            "**Vote**: \"Pragmatist\"\n**Reasoning**: simplest.",
        ];
        for text in cases {
            let parsed = parse_vote(text, "Architect", &roster()).unwrap();
            assert!(!parsed.is_malformed(), "input: {text:?}");
            let choice = parsed.into_inner();
            assert_eq!(choice.target, "Pragmatist", "input: {text:?}");
            assert_eq!(choice.reasoning, "simplest.");
        }
    }

    #[test]
    fn test_vote_short_name_matches_substring() {
        let parsed = parse_vote("**Vote**: Security", "Pragmatist", &roster()).unwrap();
        assert_eq!(parsed.into_inner().target, "Security Analyst");
    }

    #[test]
    fn test_self_vote_falls_back_to_first_eligible() {
        let parsed = parse_vote("**Vote**: Architect", "Architect", &roster()).unwrap();
        assert!(parsed.is_malformed());
        assert_eq!(parsed.into_inner().target, "Security Analyst");
    }

    #[test]
    fn test_missing_vote_falls_back_to_first_eligible() {
        let parsed = parse_vote("I liked them all.", "Security Analyst", &roster()).unwrap();
        assert!(parsed.is_malformed());
        let choice = parsed.into_inner();
        assert_eq!(choice.target, "Architect");
        assert_eq!(choice.reasoning, "I liked them all.");
    }

    #[test]
    fn test_vote_without_eligible_candidates() {
        assert!(parse_vote("**Vote**: me", "Architect", &["Architect".to_string()]).is_none());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc…");
        assert_eq!(truncate_chars("ééééé", 2), "éé…");
    }
}
