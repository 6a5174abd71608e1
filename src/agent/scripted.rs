//! Deterministic agent for demos and tests.

use super::traits::{AdvisorAgent, AgentRequest};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Replies with canned responses in order, then echoes the query.
pub struct ScriptedAgent {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedAgent {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    /// Canned replies not yet handed out.
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

#[async_trait]
impl AdvisorAgent for ScriptedAgent {
    async fn respond(&self, request: &AgentRequest) -> Result<String> {
        if let Some(reply) = self.responses.lock().pop_front() {
            return Ok(reply);
        }
        Ok(format!(
            "[{}] query {} noted: {}",
            request.state.merchant_id, request.state.total_queries, request.query
        ))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
