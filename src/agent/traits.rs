//! The advisor model seam.
//!
//! LLM orchestration lives outside this crate. Anything that can turn a
//! query plus session context into a reply implements [`AdvisorAgent`].

use crate::checkpoint::Checkpoint;
use crate::sessions::SessionState;
use anyhow::Result;
use async_trait::async_trait;

/// Everything an agent sees for one query.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub thread_id: String,
    pub query: String,
    /// Session state after the query has been counted.
    pub state: SessionState,
    /// Recent turns on this thread, oldest first. Does not include `query`.
    pub history: Vec<Checkpoint>,
}

/// Produces the assistant reply for a merchant query.
#[async_trait]
pub trait AdvisorAgent: Send + Sync {
    async fn respond(&self, request: &AgentRequest) -> Result<String>;

    fn name(&self) -> &str;
}
