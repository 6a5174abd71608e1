//! Runs merchant queries through the agent while keeping session state,
//! checkpoints and traces in step.

use super::traits::{AdvisorAgent, AgentRequest};
use crate::checkpoint::{CheckpointStore, Turn};
use crate::observability::{emit_quietly, Attributes, SpanRecord};
use crate::sessions::{
    extract_merchant_id, message_event, snapshot_event, SessionError, SessionManager,
    SessionState,
};
use anyhow::{Context, Result};
use std::sync::Arc;

const TEXT_MIME: &str = "text/plain";
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// A freshly started conversation.
#[derive(Debug, Clone)]
pub struct MerchantSession {
    pub thread_id: String,
    pub state: SessionState,
}

/// Session manager, agent, checkpoint store and trace sink wired together.
pub struct AdvisorSession {
    manager: SessionManager,
    agent: Arc<dyn AdvisorAgent>,
    store: Option<Arc<dyn CheckpointStore>>,
    history_limit: usize,
}

impl AdvisorSession {
    /// Session runner without checkpointing.
    pub fn new(manager: SessionManager, agent: Arc<dyn AdvisorAgent>) -> Self {
        Self {
            manager,
            agent,
            store: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Record every turn in `store` and hand the last `history_limit`
    /// turns to the agent.
    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>, history_limit: usize) -> Self {
        self.store = Some(store);
        self.history_limit = history_limit.max(1);
        self
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn checkpoint_store(&self) -> Option<&Arc<dyn CheckpointStore>> {
        self.store.as_ref()
    }

    pub fn start_merchant_session(
        &self,
        advisor_id: &str,
        merchant_id: &str,
        merchant_name: Option<&str>,
        segment: Option<&str>,
    ) -> Result<MerchantSession> {
        let state = self
            .manager
            .initialize(advisor_id, merchant_id, merchant_name, segment)?;
        let thread_id = self.manager.thread_id_for(&state.merchant_id)?;
        tracing::info!(thread_id = %thread_id, session_id = %state.session_id, "merchant session started");
        Ok(MerchantSession { thread_id, state })
    }

    /// Answer one query and return the reply with the updated state.
    ///
    /// `state` is left as it was, so on error the caller simply keeps it.
    pub async fn run_query(
        &self,
        thread_id: &str,
        state: &SessionState,
        query: &str,
    ) -> Result<(String, SessionState)> {
        if query.trim().is_empty() {
            return Err(SessionError::invalid("query", "must not be empty").into());
        }
        if let Some(mentioned) = extract_merchant_id(query) {
            if !self.manager.validate_merchant_match(state, &mentioned)? {
                return Err(SessionError::MerchantMismatch {
                    expected: state.merchant_id.clone(),
                    found: mentioned,
                }
                .into());
            }
        }

        let started = self.manager.now();
        let mut span = SpanRecord::new("merchant_query", started);
        let before = self.manager.create_session_snapshot(state, thread_id);
        span.add_event(snapshot_event("session_snapshot_before", &before, started));

        let counted = self.manager.increment_query_count(state);
        let query_number = counted.total_queries;
        span.set_attribute("session.id", counted.session_id.as_str());
        span.set_attribute("session.thread_id", thread_id);
        span.set_attribute("session.advisor_id", counted.advisor_id.as_str());
        span.set_attribute("session.query_number", query_number);
        span.set_attribute("merchant.id", counted.merchant_id.as_str());
        span.set_attribute("merchant.name", counted.merchant_name.as_deref().unwrap_or_default());
        span.set_attribute("merchant.segment", counted.segment.as_deref().unwrap_or_default());
        span.set_attribute("input.value", query);
        span.set_attribute("input.mime_type", TEXT_MIME);
        span.add_event(message_event(
            "user",
            query,
            Some(query_number),
            self.manager.now(),
        ));

        let asked_at = self.manager.now();
        let history = match &self.store {
            Some(store) => store
                .history(thread_id, Some(self.history_limit))
                .await
                .context("Failed to load checkpoint history")?,
            None => Vec::new(),
        };

        let request = AgentRequest {
            thread_id: thread_id.to_string(),
            query: query.to_string(),
            state: counted.clone(),
            history,
        };
        let response = match self.agent.respond(&request).await {
            Ok(response) => response,
            Err(e) => {
                span.error = Some(format!("{e:#}"));
                span.finish(self.manager.now());
                emit_quietly(self.manager.emitter().as_ref(), &span);
                return Err(e.context(format!("agent '{}' failed", self.agent.name())));
            }
        };

        // Both turns land only once the agent has answered, so a failed
        // query leaves no unanswered turn behind.
        if let Some(store) = &self.store {
            store
                .append(thread_id, Turn::user(query, asked_at))
                .await
                .context("Failed to checkpoint user turn")?;
            store
                .append(thread_id, Turn::assistant(&response, self.manager.now()))
                .await
                .context("Failed to checkpoint assistant turn")?;
        }

        let finished = self.manager.now();
        span.add_event(message_event("assistant", &response, Some(query_number), finished));
        let after = self.manager.create_session_snapshot(&counted, thread_id);
        span.add_event(snapshot_event("session_snapshot_after", &after, finished));

        let counters: Attributes = after
            .iter()
            .filter(|(key, _)| key.starts_with("session.") && key.as_str() != "session.id")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        span.extend_attributes(&counters);
        span.set_attribute("output.value", response.as_str());
        span.set_attribute("output.mime_type", TEXT_MIME);
        span.set_attribute("response.length", response.chars().count());
        span.finish(finished);
        emit_quietly(self.manager.emitter().as_ref(), &span);

        tracing::info!(
            thread_id,
            query_number,
            response_len = response.len(),
            "query completed"
        );
        Ok((response, counted))
    }
}
