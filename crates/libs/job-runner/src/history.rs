//! Append-only record of finished jobs
//!
//! Exactly one entry per job that reaches a terminal state. Entries are
//! kept in insertion order, bounded to a retention limit, and persisted
//! best-effort to a JSON file so history survives restarts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::job::JobKind;

/// Default maximum retained entries
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// One finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: JobKind,

    /// Uploaded filename or stream URL
    pub filename: String,

    /// Media duration for files, elapsed wall-clock for streams; null for
    /// images and jobs that never opened their source
    pub duration_seconds: Option<f64>,

    /// Final maximum count; null when no frame was ever processed
    pub count: Option<u32>,

    pub timestamp: DateTime<Utc>,
}

/// In-process history store with best-effort file persistence
pub struct HistoryStore {
    entries: RwLock<Vec<HistoryEntry>>,
    path: Option<PathBuf>,
    limit: usize,
}

impl HistoryStore {
    /// Volatile store, no persistence
    pub fn in_memory(limit: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            path: None,
            limit,
        }
    }

    /// File-backed store; loads whatever the file currently holds
    pub async fn with_file(path: PathBuf, limit: usize) -> Self {
        let entries = match tokio::fs::read(&path).await {
            Ok(data) => match serde_json::from_slice::<Vec<HistoryEntry>>(&data) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Discarding unreadable history file: {}", e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self {
            entries: RwLock::new(entries),
            path: Some(path),
            limit,
        }
    }

    /// Append one entry, trimming to the retention limit
    pub async fn append(&self, entry: HistoryEntry) {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        if entries.len() > self.limit {
            let excess = entries.len() - self.limit;
            entries.drain(..excess);
        }

        if let Some(path) = &self.path {
            if let Err(e) = persist(path, &entries).await {
                tracing::warn!(path = %path.display(), "Failed to persist history: {}", e);
            }
        }
    }

    /// All entries in insertion order
    pub async fn list(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

async fn persist(path: &Path, entries: &[HistoryEntry]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(entries)?;
    tokio::fs::write(path, json).await
}
