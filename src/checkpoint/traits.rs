//! Thread-keyed conversation checkpoints.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One conversation turn as handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new("user", content, timestamp)
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new("assistant", content, timestamp)
    }
}

/// A stored turn. `checkpoint_id` counts from 1 within each thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub checkpoint_id: u64,
    #[serde(flatten)]
    pub turn: Turn,
}

/// Per-thread counts for `checkpoints info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointInfo {
    pub thread_id: String,
    pub count: usize,
    pub first_checkpoint_id: u64,
    pub last_checkpoint_id: u64,
}

/// Ordered turn log keyed by thread id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append a turn, assigning the thread's next checkpoint id.
    async fn append(&self, thread_id: &str, turn: Turn) -> Result<Checkpoint>;

    /// The most recent `limit` checkpoints (all when `None`), oldest first.
    async fn history(&self, thread_id: &str, limit: Option<usize>) -> Result<Vec<Checkpoint>>;

    /// Every thread with at least one checkpoint, sorted.
    async fn list_threads(&self) -> Result<Vec<String>>;

    async fn info(&self, thread_id: &str) -> Result<Option<CheckpointInfo>>;

    /// Delete one thread. Returns the number of checkpoints removed.
    async fn clear(&self, thread_id: &str) -> Result<usize>;

    /// Delete everything. Returns the number of checkpoints removed.
    async fn clear_all(&self) -> Result<usize>;

    fn name(&self) -> &str;
}
