//! The session record for one merchant conversation.

use super::error::{Result, SessionError};
use super::ids::MERCHANT_PREFIX;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Segments advisors conventionally tag merchants with. Not enforced.
pub const KNOWN_SEGMENTS: &[&str] = &["small_business", "mid_market", "enterprise"];

/// A recommendation made to the merchant during the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub priority: String,
    pub description: String,
    pub expected_impact: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A timestamped free-text note left by the advisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorNote {
    pub note: String,
    pub timestamp: DateTime<Utc>,
}

/// State of one advisory conversation with exactly one merchant.
///
/// Values are never mutated by the [`SessionManager`](super::SessionManager);
/// every transition clones into a new value, so a caller holding an older
/// state never observes later changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub advisor_id: String,
    /// Always carries the `mch_` prefix.
    pub merchant_id: String,
    pub merchant_name: Option<String>,
    pub segment: Option<String>,

    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub total_queries: u64,

    #[serde(default)]
    pub cached_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub cached_at: BTreeMap<String, DateTime<Utc>>,

    #[serde(default)]
    pub topics_discussed: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub pending_questions: Vec<String>,
    #[serde(default)]
    pub advisor_notes: Vec<AdvisorNote>,

    /// Scratch space for the agent; opaque to this crate.
    #[serde(default)]
    pub working_data: BTreeMap<String, Value>,
}

impl SessionState {
    /// Seconds between session start and the last recorded activity.
    pub fn duration_seconds(&self) -> f64 {
        seconds_between(self.started_at, self.last_activity_at)
    }

    /// Cached data types in key order.
    pub fn cached_data_types(&self) -> Vec<String> {
        self.cached_data.keys().cloned().collect()
    }

    /// Parse and validate a serialized state.
    pub fn from_json(raw: &str) -> Result<Self> {
        let state: SessionState =
            serde_json::from_str(raw).map_err(|e| SessionError::CorruptState(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the structural invariants a well-formed state upholds.
    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(SessionError::CorruptState("session_id is empty".into()));
        }
        if self.advisor_id.trim().is_empty() {
            return Err(SessionError::CorruptState("advisor_id is empty".into()));
        }
        if !self.merchant_id.starts_with(MERCHANT_PREFIX) || self.merchant_id == MERCHANT_PREFIX {
            return Err(SessionError::CorruptState(format!(
                "merchant_id '{}' is not normalized",
                self.merchant_id
            )));
        }
        if self.last_activity_at < self.started_at {
            return Err(SessionError::CorruptState(
                "last_activity_at precedes started_at".into(),
            ));
        }

        if let Some(key) = self
            .cached_data
            .keys()
            .find(|k| !self.cached_at.contains_key(*k))
        {
            return Err(SessionError::MissingCacheTimestamp(key.clone()));
        }
        if let Some(key) = self
            .cached_at
            .keys()
            .find(|k| !self.cached_data.contains_key(*k))
        {
            return Err(SessionError::CorruptState(format!(
                "cached_at has '{key}' without cached data"
            )));
        }

        let mut seen = HashSet::new();
        for topic in &self.topics_discussed {
            if *topic != normalize_topic(topic) {
                return Err(SessionError::CorruptState(format!(
                    "topic '{topic}' is not normalized"
                )));
            }
            if !seen.insert(topic.as_str()) {
                return Err(SessionError::CorruptState(format!(
                    "duplicate topic '{topic}'"
                )));
            }
        }

        let mut seen = HashSet::new();
        if let Some(question) = self
            .pending_questions
            .iter()
            .find(|q| !seen.insert(q.as_str()))
        {
            return Err(SessionError::CorruptState(format!(
                "duplicate pending question '{question}'"
            )));
        }

        Ok(())
    }
}

/// Lowercase and replace spaces with underscores.
pub fn normalize_topic(topic: &str) -> String {
    topic.to_lowercase().replace(' ', "_")
}

/// Signed seconds from `from` to `to`, with millisecond resolution.
pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
