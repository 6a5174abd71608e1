//! In-memory checkpoint store.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::traits::{Checkpoint, CheckpointInfo, CheckpointStore, Turn};

/// Checkpoints held in a mutex-protected ordered map. Lost on exit.
pub struct InMemoryCheckpointStore {
    threads: Mutex<BTreeMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn append(&self, thread_id: &str, turn: Turn) -> Result<Checkpoint> {
        if thread_id.trim().is_empty() {
            bail!("thread id must not be empty");
        }
        let mut threads = self.threads.lock();
        let entries = threads.entry(thread_id.to_string()).or_default();
        let checkpoint = Checkpoint {
            thread_id: thread_id.to_string(),
            checkpoint_id: entries.last().map_or(1, |c| c.checkpoint_id + 1),
            turn,
        };
        entries.push(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn history(&self, thread_id: &str, limit: Option<usize>) -> Result<Vec<Checkpoint>> {
        let threads = self.threads.lock();
        let Some(entries) = threads.get(thread_id) else {
            return Ok(Vec::new());
        };

        match limit {
            Some(n) => {
                let start = entries.len().saturating_sub(n);
                Ok(entries[start..].to_vec())
            }
            None => Ok(entries.clone()),
        }
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        Ok(self.threads.lock().keys().cloned().collect())
    }

    async fn info(&self, thread_id: &str) -> Result<Option<CheckpointInfo>> {
        let threads = self.threads.lock();
        let info = threads.get(thread_id).and_then(|entries| {
            let first = entries.first()?;
            let last = entries.last()?;
            Some(CheckpointInfo {
                thread_id: thread_id.to_string(),
                count: entries.len(),
                first_checkpoint_id: first.checkpoint_id,
                last_checkpoint_id: last.checkpoint_id,
            })
        });
        Ok(info)
    }

    async fn clear(&self, thread_id: &str) -> Result<usize> {
        Ok(self
            .threads
            .lock()
            .remove(thread_id)
            .map_or(0, |entries| entries.len()))
    }

    async fn clear_all(&self) -> Result<usize> {
        let mut threads = self.threads.lock();
        let removed = threads.values().map(Vec::len).sum();
        threads.clear();
        Ok(removed)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn seed(store: &InMemoryCheckpointStore, thread: &str, n: usize) {
        for i in 0..n {
            store
                .append(thread, Turn::user(format!("message {i}"), Utc::now()))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn checkpoint_ids_count_per_thread() {
        let store = InMemoryCheckpointStore::new();
        let a1 = store.append("a", Turn::user("hi", Utc::now())).await.unwrap();
        let b1 = store.append("b", Turn::user("hi", Utc::now())).await.unwrap();
        let a2 = store
            .append("a", Turn::assistant("hello", Utc::now()))
            .await
            .unwrap();
        assert_eq!(a1.checkpoint_id, 1);
        assert_eq!(b1.checkpoint_id, 1);
        assert_eq!(a2.checkpoint_id, 2);
        assert_eq!(a2.turn.role, "assistant");
    }

    #[tokio::test]
    async fn history_limit_returns_most_recent() {
        let store = InMemoryCheckpointStore::new();
        seed(&store, "t", 5).await;

        assert_eq!(store.history("t", None).await.unwrap().len(), 5);
        let last_two = store.history("t", Some(2)).await.unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].turn.content, "message 3");
        assert_eq!(last_two[1].turn.content, "message 4");
        assert!(store.history("missing", Some(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn info_and_listing() {
        let store = InMemoryCheckpointStore::new();
        seed(&store, "zeta", 1).await;
        seed(&store, "alpha", 3).await;

        assert_eq!(store.list_threads().await.unwrap(), vec!["alpha", "zeta"]);
        let info = store.info("alpha").await.unwrap().unwrap();
        assert_eq!(info.count, 3);
        assert_eq!(info.first_checkpoint_id, 1);
        assert_eq!(info.last_checkpoint_id, 3);
        assert!(store.info("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_removes_one_thread_and_clear_all_the_rest() {
        let store = InMemoryCheckpointStore::new();
        seed(&store, "a", 2).await;
        seed(&store, "b", 3).await;

        assert_eq!(store.clear("a").await.unwrap(), 2);
        assert_eq!(store.clear("a").await.unwrap(), 0);
        assert_eq!(store.clear_all().await.unwrap(), 3);
        assert!(store.list_threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_thread_id_is_rejected() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.append(" ", Turn::user("x", Utc::now())).await.is_err());
    }
}
