//! SQLite checkpoint store.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::traits::{Checkpoint, CheckpointInfo, CheckpointStore, Turn};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id     TEXT    NOT NULL,
    checkpoint_id INTEGER NOT NULL,
    role          TEXT    NOT NULL,
    content       TEXT    NOT NULL,
    created_at    TEXT    NOT NULL,
    PRIMARY KEY (thread_id, checkpoint_id)
);
";

/// Checkpoints persisted in a single SQLite file, table `checkpoints`.
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteCheckpointStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open checkpoint database {}", path.display()))?;
        Self::from_connection(conn, path.to_path_buf())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create checkpoints table")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run_db<F, T>(&self, op_name: &'static str, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            op(&mut *guard).with_context(|| format!("checkpoint {op_name} failed"))
        })
        .await
        .with_context(|| format!("checkpoint {op_name} task panicked"))?
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn append(&self, thread_id: &str, turn: Turn) -> Result<Checkpoint> {
        if thread_id.trim().is_empty() {
            bail!("thread id must not be empty");
        }
        let thread_id = thread_id.to_string();
        self.run_db("append", move |conn| {
            let tx = conn.transaction()?;
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(checkpoint_id), 0) + 1 FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO checkpoints (thread_id, checkpoint_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    thread_id,
                    next,
                    turn.role,
                    turn.content,
                    turn.timestamp.to_rfc3339()
                ],
            )?;
            tx.commit()?;
            Ok(Checkpoint {
                thread_id,
                checkpoint_id: u64::try_from(next)?,
                turn,
            })
        })
        .await
    }

    async fn history(&self, thread_id: &str, limit: Option<usize>) -> Result<Vec<Checkpoint>> {
        let thread_id = thread_id.to_string();
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        self.run_db("history", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT checkpoint_id, role, content, created_at FROM checkpoints
                 WHERE thread_id = ?1 ORDER BY checkpoint_id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![thread_id, limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;

            let mut checkpoints = Vec::new();
            for row in rows {
                let (id, role, content, created_at) = row?;
                checkpoints.push(Checkpoint {
                    thread_id: thread_id.clone(),
                    checkpoint_id: u64::try_from(id)?,
                    turn: Turn::new(role, content, parse_timestamp(&created_at)?),
                });
            }
            checkpoints.reverse();
            Ok(checkpoints)
        })
        .await
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        self.run_db("list", |conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT thread_id FROM checkpoints ORDER BY thread_id")?;
            let threads = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(threads)
        })
        .await
    }

    async fn info(&self, thread_id: &str) -> Result<Option<CheckpointInfo>> {
        let thread_id = thread_id.to_string();
        self.run_db("info", move |conn| {
            let (count, first, last) = conn.query_row(
                "SELECT COUNT(*), MIN(checkpoint_id), MAX(checkpoint_id) FROM checkpoints
                 WHERE thread_id = ?1",
                params![thread_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )?;
            let (Some(first), Some(last)) = (first, last) else {
                return Ok(None);
            };
            Ok(Some(CheckpointInfo {
                thread_id,
                count: usize::try_from(count)?,
                first_checkpoint_id: u64::try_from(first)?,
                last_checkpoint_id: u64::try_from(last)?,
            }))
        })
        .await
    }

    async fn clear(&self, thread_id: &str) -> Result<usize> {
        let thread_id = thread_id.to_string();
        self.run_db("clear", move |conn| {
            Ok(conn.execute(
                "DELETE FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
            )?)
        })
        .await
    }

    async fn clear_all(&self) -> Result<usize> {
        self.run_db("clear-all", |conn| {
            Ok(conn.execute("DELETE FROM checkpoints", [])?)
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("malformed checkpoint timestamp '{raw}'"))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ts(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 9, 14, 30, sec).unwrap()
    }

    #[tokio::test]
    async fn append_and_read_back_in_order() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        store.append("t", Turn::user("q1", ts(0))).await.unwrap();
        store.append("t", Turn::assistant("a1", ts(1))).await.unwrap();
        let third = store.append("t", Turn::user("q2", ts(2))).await.unwrap();
        assert_eq!(third.checkpoint_id, 3);

        let all = store.history("t", None).await.unwrap();
        let contents: Vec<_> = all.iter().map(|c| c.turn.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2"]);
        assert_eq!(all[1].turn.timestamp, ts(1));

        let recent = store.history("t", Some(2)).await.unwrap();
        assert_eq!(recent[0].checkpoint_id, 2);
        assert_eq!(recent[1].checkpoint_id, 3);
    }

    #[tokio::test]
    async fn info_list_and_clear() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        for thread in ["b", "a", "b"] {
            store.append(thread, Turn::user("x", ts(0))).await.unwrap();
        }

        assert_eq!(store.list_threads().await.unwrap(), vec!["a", "b"]);
        let info = store.info("b").await.unwrap().unwrap();
        assert_eq!((info.count, info.first_checkpoint_id, info.last_checkpoint_id), (2, 1, 2));
        assert!(store.info("zzz").await.unwrap().is_none());

        assert_eq!(store.clear("b").await.unwrap(), 2);
        assert_eq!(store.clear_all().await.unwrap(), 1);
        assert!(store.list_threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkpoints_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("checkpoints.db");
        {
            let store = SqliteCheckpointStore::open(&path).unwrap();
            store.append("t", Turn::user("persisted", ts(5))).await.unwrap();
        }
        let store = SqliteCheckpointStore::open(&path).unwrap();
        let history = store.history("t", None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].turn.content, "persisted");
        let next = store.append("t", Turn::assistant("ok", ts(6))).await.unwrap();
        assert_eq!(next.checkpoint_id, 2);
    }
}
