//! Codebase context — cached repository snapshot text for prompts.
//!
//! Context is advisory: [`ContextProvider::get_context`] never fails and
//! returns `""` when nothing is available. The cache is an explicit component
//! with an injected [`Clock`] so expiry is testable without sleeping.

use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use ignore::WalkBuilder;
use regex::Regex;
use tracing::{debug, warn};

use crate::parser::truncate_chars;
use crate::state::{StoreError, WorkflowStore};

/// Default cache lifetime
pub const DEFAULT_CONTEXT_TTL: Duration = Duration::from_secs(5 * 60);

static PRISMA_MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*model\s+(\w+)\s*\{").expect("PRISMA_MODEL_RE regex should compile")
});

static SQL_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)create\s+table\s+(?:if\s+not\s+exists\s+)?[`"]?([\w.]+)[`"]?"#)
        .expect("SQL_TABLE_RE regex should compile")
});

// =============================================================================
// Traits
// =============================================================================

/// Supplies codebase context to the engines
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Snapshot text, or `""` when unavailable.
    async fn get_context(&self) -> String;
}

/// Produces fresh context text; may fail
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn load(&self) -> Result<String>;
}

/// Looks up the body of a linked issue
#[async_trait]
pub trait IssueLookup: Send + Sync {
    /// `None` when the issue is missing or the lookup failed.
    async fn issue_body(&self, number: u64) -> Option<String>;
}

/// Lookup that knows no issues
pub struct NoIssueLookup;

#[async_trait]
impl IssueLookup for NoIssueLookup {
    async fn issue_body(&self, _number: u64) -> Option<String> {
        None
    }
}

/// Fixed context text
pub struct StaticContext(pub String);

#[async_trait]
impl ContextProvider for StaticContext {
    async fn get_context(&self) -> String {
        self.0.clone()
    }
}

// =============================================================================
// Clock + cache
// =============================================================================

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

struct CacheEntry {
    loaded_at: Instant,
    text: String,
}

/// TTL cache in front of a [`ContextSource`].
///
/// The lock is held across a reload so concurrent callers share one load.
/// Failed loads are not cached.
pub struct CachedContextProvider<S, C = SystemClock> {
    source: S,
    clock: C,
    ttl: Duration,
    entry: tokio::sync::Mutex<Option<CacheEntry>>,
}

impl<S: ContextSource> CachedContextProvider<S, SystemClock> {
    pub fn new(source: S) -> Self {
        Self::with_clock(source, SystemClock, DEFAULT_CONTEXT_TTL)
    }
}

impl<S: ContextSource, C: Clock> CachedContextProvider<S, C> {
    pub fn with_clock(source: S, clock: C, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            entry: tokio::sync::Mutex::new(None),
        }
    }

    /// Drop the cached snapshot so the next call reloads.
    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }
}

#[async_trait]
impl<S: ContextSource, C: Clock> ContextProvider for CachedContextProvider<S, C> {
    async fn get_context(&self) -> String {
        let mut entry = self.entry.lock().await;
        let now = self.clock.now();
        if let Some(cached) = entry.as_ref() {
            if now.saturating_duration_since(cached.loaded_at) < self.ttl {
                debug!(chars = cached.text.len(), "Context cache hit");
                return cached.text.clone();
            }
        }

        match self.source.load().await {
            Ok(text) => {
                debug!(chars = text.len(), "Context reloaded");
                *entry = Some(CacheEntry {
                    loaded_at: now,
                    text: text.clone(),
                });
                text
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Codebase context unavailable");
                String::new()
            }
        }
    }
}

// =============================================================================
// Repository snapshot
// =============================================================================

const GUIDELINE_FILES: [&str; 4] = ["CLAUDE.md", "AGENTS.md", "CONTRIBUTING.md", "README.md"];

/// Builds a snapshot from a local checkout: file listing, guideline excerpt,
/// schema summary.
#[derive(Debug, Clone)]
pub struct RepoSnapshotSource {
    root: PathBuf,
    max_files: usize,
    guideline_chars: usize,
}

impl RepoSnapshotSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_files: 400,
            guideline_chars: 4_000,
        }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_guideline_chars(mut self, chars: usize) -> Self {
        self.guideline_chars = chars;
        self
    }

    /// Relative paths of tracked-looking files, sorted, respecting .gitignore.
    fn list_files(&self) -> Vec<String> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .build();

        let mut files: Vec<String> = walker
            .flatten()
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        files
    }

    fn guideline_excerpt(&self) -> Option<(String, String)> {
        GUIDELINE_FILES.iter().find_map(|name| {
            let text = std::fs::read_to_string(self.root.join(name)).ok()?;
            let text = text.trim();
            (!text.is_empty())
                .then(|| (name.to_string(), truncate_chars(text, self.guideline_chars)))
        })
    }

    fn schema_summary(&self, files: &[String]) -> Result<String> {
        let prisma = self.root.join("prisma/schema.prisma");
        if prisma.is_file() {
            let text = std::fs::read_to_string(&prisma)
                .with_context(|| format!("Failed to read {}", prisma.display()))?;
            let models: Vec<&str> = PRISMA_MODEL_RE
                .captures_iter(&text)
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect();
            if !models.is_empty() {
                return Ok(format!("Prisma models: {}", models.join(", ")));
            }
        }

        let mut tables: Vec<String> = Vec::new();
        for path in files.iter().filter(|f| f.ends_with(".sql")).take(50) {
            let full = self.root.join(path);
            let text = std::fs::read_to_string(&full)
                .with_context(|| format!("Failed to read {}", full.display()))?;
            for caps in SQL_TABLE_RE.captures_iter(&text) {
                if let Some(name) = caps.get(1) {
                    let name = name.as_str().to_string();
                    if !tables.contains(&name) {
                        tables.push(name);
                    }
                }
            }
        }
        if tables.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("SQL tables: {}", tables.join(", ")))
        }
    }

    fn snapshot(&self) -> Result<String> {
        if !self.root.is_dir() {
            anyhow::bail!("repository root {} is not a directory", self.root.display());
        }

        let files = self.list_files();
        let mut sections = ContextSections::new();

        let mut listing = files
            .iter()
            .take(self.max_files)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        if files.len() > self.max_files {
            listing.push_str(&format!("\n... and {} more", files.len() - self.max_files));
        }
        if !listing.is_empty() {
            sections.push("Repository Files", format!("```\n{listing}\n```"));
        }

        if let Some((name, excerpt)) = self.guideline_excerpt() {
            sections.push(&format!("Guidelines ({name})"), excerpt);
        }
        sections.push("Schema", self.schema_summary(&files)?);

        Ok(sections.render())
    }
}

#[async_trait]
impl ContextSource for RepoSnapshotSource {
    async fn load(&self) -> Result<String> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.snapshot())
            .await
            .context("Snapshot task panicked")?
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Ordered `## Heading` sections; empty bodies are dropped.
#[derive(Debug, Default, Clone)]
pub struct ContextSections {
    sections: Vec<(String, String)>,
}

impl ContextSections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, heading: &str, body: impl Into<String>) -> &mut Self {
        let body = body.into();
        let body = body.trim();
        if !body.is_empty() {
            self.sections.push((heading.to_string(), body.to_string()));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|(heading, body)| format!("## {heading}\n\n{body}"))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Add the target work item and its linked issue body, when present.
///
/// A dangling item reference is logged and skipped; other store errors
/// propagate.
pub async fn push_target_item(
    sections: &mut ContextSections,
    store: &dyn WorkflowStore,
    issues: &dyn IssueLookup,
    item_id: Option<&str>,
) -> Result<(), StoreError> {
    let Some(item_id) = item_id else {
        return Ok(());
    };
    let item = match store.get_work_item(item_id).await {
        Ok(item) => item,
        Err(StoreError::NotFound { .. }) => {
            warn!(item_id, "Target item not found; continuing without it");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    sections.push(
        "Target Item",
        format!("**{}**\n\n{}", item.title, item.description.trim()),
    );
    if let Some(number) = item.issue_number {
        if let Some(body) = issues.issue_body(number).await {
            sections.push(&format!("Linked Issue #{number}"), body);
        }
    }
    Ok(())
}
