//! Result types reported by the orchestrator.

use serde::{Deserialize, Serialize};

/// Outcome of an [`index`](crate::SyncOrchestrator::index) call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "report", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// Another indexing run is in progress
    AlreadyIndexing,
    /// Already indexed and not forced
    AlreadyIndexed,
    /// No session attached
    NotConnected,
    Completed(IndexReport),
}

impl IndexOutcome {
    pub fn report(&self) -> Option<&IndexReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Summary of one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub files_discovered: usize,
    pub directories_discovered: usize,
    /// Text files fetched and cached
    pub files_cached: usize,
    pub binary_placeholders: usize,
    /// Files whose identifiers were rewritten and persisted
    pub files_rewritten: usize,
    /// Per-item failures that were skipped
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Kind reported for a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirEntryType {
    File,
    Directory,
}

/// Entry returned by [`read_dir`](crate::SyncOrchestrator::read_dir).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntryInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: DirEntryType,
    pub is_symlink: bool,
}
