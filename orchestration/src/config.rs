//! Engine configuration
//!
//! Pacing, token limits, conversation budget and repository routing. Loaded
//! from TOML by the worker; every field has a default so a partial file (or
//! none at all) works.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Delays between reasoning calls, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Between sequential per-agent calls within a phase
    pub inter_call_ms: u64,
    /// Between deliberation phases and debate rounds
    pub inter_phase_ms: u64,
    /// Between agent loop iterations
    pub inter_iteration_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            inter_call_ms: 2_000,
            inter_phase_ms: 5_000,
            inter_iteration_ms: 3_000,
        }
    }
}

impl PacingConfig {
    /// No delays at all (tests, local runs against a private endpoint).
    pub fn none() -> Self {
        Self {
            inter_call_ms: 0,
            inter_phase_ms: 0,
            inter_iteration_ms: 0,
        }
    }

    pub fn inter_call(&self) -> Duration {
        Duration::from_millis(self.inter_call_ms)
    }

    pub fn inter_phase(&self) -> Duration {
        Duration::from_millis(self.inter_phase_ms)
    }

    pub fn inter_iteration(&self) -> Duration {
        Duration::from_millis(self.inter_iteration_ms)
    }
}

/// Sleep for `delay`, skipping the timer entirely when it is zero.
pub async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// A repository that receives change proposals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTarget {
    pub owner: String,
    pub name: String,
    /// Human label used in PR bodies; falls back to `owner/name`
    #[serde(default)]
    pub label: String,
}

impl RepoTarget {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            label: String::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Parse `owner/name`.
    pub fn parse(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.trim().split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    pub fn is_configured(&self) -> bool {
        !self.owner.is_empty() && !self.name.is_empty()
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn display_label(&self) -> String {
        if self.label.is_empty() {
            self.full_name()
        } else {
            self.label.clone()
        }
    }
}

/// Paths under `prefix` belong to `target`, with the prefix stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOverride {
    pub prefix: String,
    pub target: RepoTarget,
}

/// Default repository plus path-prefix overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoRouting {
    pub default: RepoTarget,
    pub overrides: Vec<RepoOverride>,
}

impl RepoRouting {
    pub fn new(default: RepoTarget) -> Self {
        Self {
            default,
            overrides: Vec::new(),
        }
    }

    pub fn with_override(mut self, prefix: impl Into<String>, target: RepoTarget) -> Self {
        self.overrides.push(RepoOverride {
            prefix: prefix.into(),
            target,
        });
        self
    }

    /// Same overrides, different default target.
    pub fn with_default(&self, default: RepoTarget) -> Self {
        Self {
            default,
            overrides: self.overrides.clone(),
        }
    }

    /// Route a path to its repository. The longest matching prefix wins; the
    /// returned path is relative to that repository's root.
    pub fn route(&self, path: &str) -> (&RepoTarget, String) {
        let matched = self
            .overrides
            .iter()
            .filter(|o| {
                let prefix = o.prefix.trim_end_matches('/');
                !prefix.is_empty()
                    && path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|o| o.prefix.trim_end_matches('/').len());

        match matched {
            Some(o) => {
                let prefix = o.prefix.trim_end_matches('/');
                let rest = path[prefix.len()..].trim_start_matches('/');
                (&o.target, rest.to_string())
            }
            None => (&self.default, path.to_string()),
        }
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pacing: PacingConfig,
    /// Output cap for proposal, debate, vote and iteration calls
    pub max_output_tokens: u32,
    /// Output cap for the synthesis call
    pub synthesis_max_tokens: u32,
    /// Output cap for the executive summary call
    pub summary_max_tokens: u32,
    /// Serialized conversation size above which old turns are dropped
    pub conversation_budget_chars: usize,
    /// Length of the PR body summary taken from the latest thinking
    pub summary_truncate_chars: usize,
    /// Used when an agent loop has no configuration record
    pub default_max_iterations: u32,
    pub repositories: RepoRouting,
    /// Prefix of branches created for agent loop changes
    pub branch_prefix: String,
    pub pr_labels: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pacing: PacingConfig::default(),
            max_output_tokens: 4096,
            synthesis_max_tokens: 8192,
            summary_max_tokens: 1024,
            conversation_budget_chars: 100_000,
            summary_truncate_chars: 500,
            default_max_iterations: 10,
            repositories: RepoRouting::default(),
            branch_prefix: "agent-loop/".to_string(),
            pr_labels: vec!["agent-loop".to_string()],
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse engine config")
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_repositories(mut self, repositories: RepoRouting) -> Self {
        self.repositories = repositories;
        self
    }
}
