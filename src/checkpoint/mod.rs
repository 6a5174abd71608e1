//! Thread-keyed conversation checkpoints.
//!
//! Every turn of a merchant session is appended under its thread id, so a
//! conversation can be inspected or handed back to the agent later.

pub mod in_memory;
pub mod sqlite;
pub mod traits;

pub use in_memory::InMemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;
pub use traits::{Checkpoint, CheckpointInfo, CheckpointStore, Turn};

use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;

const PREVIEW_CHARS: usize = 77;

/// Factory: open the checkpoint backend named by `[checkpoint] backend`.
///
/// Returns `None` when checkpointing is disabled.
pub fn create_checkpoint_store(config: &Config) -> Result<Option<Arc<dyn CheckpointStore>>> {
    if !config.checkpoint.enabled {
        return Ok(None);
    }
    let store: Arc<dyn CheckpointStore> =
        match config.checkpoint.backend.trim().to_ascii_lowercase().as_str() {
            "memory" => Arc::new(InMemoryCheckpointStore::new()),
            _ => Arc::new(SqliteCheckpointStore::open(&config.checkpoint_path())?),
        };
    tracing::debug!(backend = store.name(), "checkpoint store ready");
    Ok(Some(store))
}

// ── CLI handler ──

/// Handle `merchant-advisor checkpoints <subcommand>` CLI commands.
pub async fn handle_checkpoint_command(
    command: crate::CheckpointCommands,
    config: &Config,
) -> Result<()> {
    let Some(store) = create_checkpoint_store(config)? else {
        println!("Checkpointing is disabled ([checkpoint] enabled = false).");
        return Ok(());
    };

    match command {
        crate::CheckpointCommands::List => {
            let threads = store.list_threads().await?;
            if threads.is_empty() {
                println!("No checkpointed threads found.");
                return Ok(());
            }
            println!("Threads ({} total):\n", threads.len());
            for thread in &threads {
                let count = store.info(thread).await?.map_or(0, |info| info.count);
                println!("- {thread} ({count} checkpoints)");
            }
        }
        crate::CheckpointCommands::History { thread_id, limit } => {
            let history = store.history(&thread_id, Some(limit)).await?;
            if history.is_empty() {
                println!("No checkpoints found for thread: {thread_id}");
                return Ok(());
            }
            for checkpoint in &history {
                println!(
                    "#{} [{}] {}",
                    checkpoint.checkpoint_id,
                    checkpoint.turn.role,
                    checkpoint.turn.timestamp.to_rfc3339()
                );
                println!("    {}", preview(&checkpoint.turn.content));
            }
        }
        crate::CheckpointCommands::Info { thread_id } => match store.info(&thread_id).await? {
            Some(info) => {
                println!("Thread:      {}", info.thread_id);
                println!("Backend:     {}", store.name());
                println!("Checkpoints: {}", info.count);
                println!(
                    "Range:       #{} .. #{}",
                    info.first_checkpoint_id, info.last_checkpoint_id
                );
            }
            None => println!("No checkpoints found for thread: {thread_id}"),
        },
        crate::CheckpointCommands::Clear { thread_id, yes } => {
            if !yes {
                eprintln!("Use --yes to confirm deletion of thread '{thread_id}'.");
                return Ok(());
            }
            let removed = store.clear(&thread_id).await?;
            if removed == 0 {
                println!("No checkpoints found for thread: {thread_id}");
            } else {
                println!("✓ Deleted {removed} checkpoints from {thread_id}");
            }
        }
        crate::CheckpointCommands::ClearAll { yes } => {
            if !yes {
                eprintln!("Use --yes to confirm deletion of all checkpoints.");
                return Ok(());
            }
            let removed = store.clear_all().await?;
            println!("✓ Deleted {removed} checkpoints");
        }
    }
    Ok(())
}

/// First line of `content`, truncated for listing.
fn preview(content: &str) -> String {
    let line = content.lines().next().unwrap_or(content);
    if line.chars().count() <= PREVIEW_CHARS + 3 {
        line.to_string()
    } else {
        let truncated: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{truncated}...")
    }
}
