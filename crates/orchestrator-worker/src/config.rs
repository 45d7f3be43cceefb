use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use orchestration::config::{EngineConfig, RepoTarget};
use serde::Deserialize;

/// OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmEndpoint {
    pub url: String,
    pub api_key: Option<String>,
    /// Fallback model when an agent does not name one
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmEndpoint {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/v1".into(),
            api_key: None,
            model: "default".into(),
            timeout_secs: 300,
        }
    }
}

impl LlmEndpoint {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level worker configuration.
///
/// Read from TOML, then overridden from the environment:
///
/// | Variable                | Field               |
/// |-------------------------|---------------------|
/// | `ORCH_LLM_URL`          | `llm.url`           |
/// | `ORCH_LLM_API_KEY`      | `llm.api_key`       |
/// | `ORCH_LLM_MODEL`        | `llm.model`         |
/// | `ORCH_LLM_TIMEOUT_SECS` | `llm.timeout_secs`  |
/// | `GITHUB_TOKEN`          | `github_token`      |
/// | `ORCH_NOTIFY_URL`       | `notify_url`        |
/// | `ORCH_STORE_PATH`       | `store_path`        |
/// | `ORCH_REPO_ROOT`        | `repo_root`         |
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub llm: LlmEndpoint,
    pub github_token: Option<String>,
    /// Webhook for workflow notifications
    pub notify_url: Option<String>,
    /// JSON state file (None = in-memory, lost on exit)
    pub store_path: Option<PathBuf>,
    /// Local checkout used for codebase context
    pub repo_root: Option<PathBuf>,
    /// Repository that linked issue numbers refer to (defaults to the
    /// engine's default repository)
    pub issue_repo: Option<String>,
    pub poll_interval_secs: u64,
    pub engine: EngineConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            llm: LlmEndpoint::default(),
            github_token: None,
            notify_url: None,
            store_path: None,
            repo_root: None,
            issue_repo: None,
            poll_interval_secs: 10,
            engine: EngineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Load from `path` (or defaults when `None`) and apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read worker config {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse worker config {}", path.display()))
    }

    /// Apply overrides from `lookup` (the process environment in `load`).
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("ORCH_LLM_URL") {
            self.llm.url = url;
        }
        if let Some(key) = get("ORCH_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = get("ORCH_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(secs) = get("ORCH_LLM_TIMEOUT_SECS") {
            match secs.trim().parse() {
                Ok(secs) => self.llm.timeout_secs = secs,
                Err(_) => {
                    tracing::warn!(value = %secs, "Ignoring invalid ORCH_LLM_TIMEOUT_SECS")
                }
            }
        }
        if let Some(token) = get("GITHUB_TOKEN") {
            self.github_token = Some(token);
        }
        if let Some(url) = get("ORCH_NOTIFY_URL") {
            self.notify_url = Some(url);
        }
        if let Some(path) = get("ORCH_STORE_PATH") {
            self.store_path = Some(PathBuf::from(path));
        }
        if let Some(root) = get("ORCH_REPO_ROOT") {
            self.repo_root = Some(PathBuf::from(root));
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Repository used for linked-issue lookups.
    pub fn issue_repo(&self) -> RepoTarget {
        self.issue_repo
            .as_deref()
            .and_then(RepoTarget::parse)
            .unwrap_or_else(|| self.engine.repositories.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_without_file() {
        let config = WorkerConfig::default();
        assert_eq!(config.llm.timeout(), Duration::from_secs(300));
        assert!(config.store_path.is_none());
        assert_eq!(config.engine.default_max_iterations, 10);
    }

    #[test]
    fn test_toml_with_nested_engine_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.toml");
        std::fs::write(
            &path,
            r#"
poll_interval_secs = 30
store_path = "/var/lib/orch/state.json"

[llm]
url = "http://gpu-01:8000/v1"
model = "qwen"

[engine]
default_max_iterations = 4

[engine.pacing]
inter_call_ms = 0
"#,
        )
        .unwrap();

        let config = WorkerConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.llm.url, "http://gpu-01:8000/v1");
        assert_eq!(config.llm.timeout_secs, 300);
        assert_eq!(config.engine.default_max_iterations, 4);
        assert_eq!(config.engine.pacing.inter_call_ms, 0);
        assert_eq!(config.engine.pacing.inter_phase_ms, 5_000);
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ORCH_LLM_URL", "http://override/v1"),
            ("ORCH_LLM_TIMEOUT_SECS", "45"),
            ("GITHUB_TOKEN", "ghp_test"),
            ("ORCH_STORE_PATH", "/tmp/state.json"),
            ("ORCH_NOTIFY_URL", ""),
        ]);
        let mut config = WorkerConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.llm.url, "http://override/v1");
        assert_eq!(config.llm.timeout_secs, 45);
        assert_eq!(config.github_token.as_deref(), Some("ghp_test"));
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/state.json")));
        assert!(config.notify_url.is_none());
    }

    #[test]
    fn test_invalid_timeout_is_ignored() {
        let mut config = WorkerConfig::default();
        config.apply_overrides(|key| (key == "ORCH_LLM_TIMEOUT_SECS").then(|| "soon".to_string()));
        assert_eq!(config.llm.timeout_secs, 300);
    }

    #[test]
    fn test_issue_repo_falls_back_to_default_repository() {
        let mut config = WorkerConfig::default();
        config.engine.repositories.default = RepoTarget::new("acme", "app");
        assert_eq!(config.issue_repo().full_name(), "acme/app");

        config.issue_repo = Some("acme/tracker".into());
        assert_eq!(config.issue_repo().full_name(), "acme/tracker");
    }
}
