//! File change accumulation across agent loop iterations.
//!
//! The accumulated set is a pure fold over ordered iteration responses: the
//! last block for a path wins, whole-content replace. Recomputing it from the
//! persisted iterations always gives the same result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{RepoRouting, RepoTarget};
use crate::parser::{extract_file_changes, FileAction, FileChange};
use crate::state::{AgentIteration, IterationPhase};

/// Latest state of one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatedFile {
    pub path: String,
    pub action: FileAction,
    /// `None` for deletes
    pub content: Option<String>,
}

/// Path-keyed map of accumulated changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChangeSet {
    files: BTreeMap<String, AccumulatedFile>,
}

impl FileChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the file blocks of every successful iteration, ordered by number.
    pub fn from_iterations(iterations: &[AgentIteration]) -> Self {
        let mut ordered: Vec<&AgentIteration> = iterations
            .iter()
            .filter(|it| it.phase != IterationPhase::Error)
            .collect();
        ordered.sort_by_key(|it| it.number);

        let mut set = Self::new();
        for iteration in ordered {
            set.merge(&extract_file_changes(&iteration.response));
        }
        set
    }

    /// Apply changes in order; later entries replace earlier ones.
    pub fn merge(&mut self, changes: &[FileChange]) {
        for change in changes {
            self.files.insert(
                change.path.clone(),
                AccumulatedFile {
                    path: change.path.clone(),
                    action: change.action,
                    content: change.content.clone(),
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&AccumulatedFile> {
        self.files.get(path)
    }

    /// Files sorted by path
    pub fn files(&self) -> impl Iterator<Item = &AccumulatedFile> {
        self.files.values()
    }

    /// Split by target repository. Paths are rewritten relative to their
    /// repository; partitions appear in order of their first path.
    pub fn partition(&self, routing: &RepoRouting) -> Vec<RepoPartition> {
        let mut partitions: Vec<RepoPartition> = Vec::new();
        for file in self.files.values() {
            let (target, relative) = routing.route(&file.path);
            let routed = AccumulatedFile {
                path: relative,
                action: file.action,
                content: file.content.clone(),
            };
            match partitions.iter_mut().find(|p| &p.target == target) {
                Some(partition) => partition.files.push(routed),
                None => partitions.push(RepoPartition {
                    target: target.clone(),
                    files: vec![routed],
                }),
            }
        }
        partitions
    }
}

/// Files bound for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPartition {
    pub target: RepoTarget,
    pub files: Vec<AccumulatedFile>,
}
