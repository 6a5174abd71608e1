//! Transition functions over [`SessionState`].
//!
//! Every operation takes a state by reference and returns a new value. The
//! input is never touched, so callers can keep older states around (for
//! before/after snapshots or to discard a failed query) without copying
//! them defensively.

use super::cache::{is_expired, CacheConfig, CacheLookup, MissReason};
use super::error::{Result, SessionError};
use super::ids::{generate_thread_id, normalize_merchant_id, session_id_at};
use super::inspector::{SessionExport, SessionSummary};
use super::snapshot::create_session_snapshot;
use super::state::{normalize_topic, seconds_between, AdvisorNote, Recommendation, SessionState};
use super::traits::{Clock, SystemClock};
use crate::observability::{emit_quietly, Attributes, NoopSpanEmitter, SpanEmitter, SpanRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Applies session transitions with an injected clock, cache TTLs and
/// trace sink.
#[derive(Clone)]
pub struct SessionManager {
    cache: CacheConfig,
    emitter: Arc<dyn SpanEmitter>,
    clock: Arc<dyn Clock>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl SessionManager {
    /// Manager with wall-clock time and no trace sink.
    pub fn new(cache: CacheConfig) -> Self {
        Self {
            cache,
            emitter: Arc::new(NoopSpanEmitter),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SpanEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache_config(&self) -> &CacheConfig {
        &self.cache
    }

    pub fn emitter(&self) -> &Arc<dyn SpanEmitter> {
        &self.emitter
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Start a new conversation with one merchant.
    pub fn initialize(
        &self,
        advisor_id: &str,
        merchant_id: &str,
        merchant_name: Option<&str>,
        segment: Option<&str>,
    ) -> Result<SessionState> {
        let advisor_id = advisor_id.trim();
        if advisor_id.is_empty() {
            return Err(SessionError::invalid("advisor_id", "must not be empty"));
        }
        let merchant_id = normalize_merchant_id(merchant_id)?;
        let now = self.now();

        let state = SessionState {
            session_id: session_id_at(now),
            advisor_id: advisor_id.to_string(),
            merchant_id,
            merchant_name: non_empty(merchant_name),
            segment: non_empty(segment),
            started_at: now,
            last_activity_at: now,
            total_queries: 0,
            cached_data: BTreeMap::new(),
            cached_at: BTreeMap::new(),
            topics_discussed: Vec::new(),
            recommendations: Vec::new(),
            pending_questions: Vec::new(),
            advisor_notes: Vec::new(),
            working_data: BTreeMap::new(),
        };

        tracing::info!(
            session_id = %state.session_id,
            advisor_id = %state.advisor_id,
            merchant_id = %state.merchant_id,
            "session initialized"
        );
        Ok(state)
    }

    /// Thread id for `merchant_id` stamped with the manager's clock.
    pub fn thread_id_for(&self, merchant_id: &str) -> Result<String> {
        generate_thread_id(merchant_id, self.now())
    }

    /// Count one more query and bump `last_activity_at`.
    ///
    /// `last_activity_at` never moves backwards, even if the clock does.
    pub fn increment_query_count(&self, state: &SessionState) -> SessionState {
        let mut next = state.clone();
        next.total_queries = next.total_queries.saturating_add(1);
        next.last_activity_at = self.now().max(state.last_activity_at);
        tracing::debug!(
            session_id = %next.session_id,
            total_queries = next.total_queries,
            "query counted"
        );
        next
    }

    /// Store `payload` under `data_type`, replacing any earlier entry.
    pub fn cache_data(
        &self,
        state: &SessionState,
        data_type: &str,
        payload: Value,
    ) -> Result<SessionState> {
        let data_type = required("data_type", data_type)?;
        let mut next = state.clone();
        next.cached_data.insert(data_type.to_string(), payload);
        next.cached_at.insert(data_type.to_string(), self.now());
        tracing::debug!(session_id = %next.session_id, data_type, "data cached");
        Ok(next)
    }

    /// Look up cached data, honoring the TTL configured for its type.
    ///
    /// Emits a `cache_lookup` span. A sink failure never affects the result.
    pub fn get_cached_data(&self, state: &SessionState, data_type: &str) -> Result<CacheLookup> {
        let started = self.now();
        let mut span = SpanRecord::new("cache_lookup", started);
        span.set_attribute("cache.data_type", data_type);

        let result = self.lookup(state, data_type, started, &mut span);
        match &result {
            Ok(CacheLookup::Hit(_)) => span.set_attribute("cache.hit", true),
            Ok(CacheLookup::Miss(reason)) => {
                span.set_attribute("cache.hit", false);
                span.set_attribute("cache.miss_reason", reason.as_str());
            }
            Err(e) => span.error = Some(e.to_string()),
        }
        span.finish(self.now());
        emit_quietly(self.emitter.as_ref(), &span);

        if let Ok(lookup) = &result {
            tracing::debug!(
                session_id = %state.session_id,
                data_type,
                hit = lookup.is_hit(),
                "cache lookup"
            );
        }
        result
    }

    fn lookup(
        &self,
        state: &SessionState,
        data_type: &str,
        now: DateTime<Utc>,
        span: &mut SpanRecord,
    ) -> Result<CacheLookup> {
        let Some(payload) = state.cached_data.get(data_type) else {
            return Ok(CacheLookup::Miss(MissReason::NotFound));
        };
        let cached_at = state
            .cached_at
            .get(data_type)
            .copied()
            .ok_or_else(|| SessionError::MissingCacheTimestamp(data_type.to_string()))?;

        let ttl_seconds = self.cache.ttl_for(data_type);
        let age_seconds = seconds_between(cached_at, now);
        span.set_attribute("cache.age_seconds", age_seconds);
        span.set_attribute("cache.ttl_seconds", ttl_seconds);

        if is_expired(cached_at, now, ttl_seconds) {
            return Ok(CacheLookup::Miss(MissReason::Expired {
                age_seconds,
                ttl_seconds,
            }));
        }
        Ok(CacheLookup::Hit(payload.clone()))
    }

    /// Record a topic. Case and spacing variants collapse to one entry,
    /// and the first occurrence keeps its position.
    pub fn add_topic(&self, state: &SessionState, topic: &str) -> Result<SessionState> {
        let topic = normalize_topic(required("topic", topic)?);
        let mut next = state.clone();
        if !next.topics_discussed.contains(&topic) {
            next.topics_discussed.push(topic);
        }
        Ok(next)
    }

    /// Append a recommendation. Identical recommendations accumulate.
    pub fn add_recommendation(
        &self,
        state: &SessionState,
        kind: &str,
        priority: &str,
        description: &str,
        expected_impact: Option<&str>,
    ) -> Result<SessionState> {
        let kind = required("type", kind)?;
        let priority = required("priority", priority)?;
        let description = required("description", description)?;

        let mut next = state.clone();
        next.recommendations.push(Recommendation {
            kind: kind.to_string(),
            priority: priority.to_string(),
            description: description.to_string(),
            expected_impact: non_empty(expected_impact),
            created_at: self.now(),
        });
        Ok(next)
    }

    /// Queue a follow-up question.
    ///
    /// Deduplicated by exact string only. Unlike topics, "What?" and
    /// "what?" are two different questions.
    pub fn add_pending_question(&self, state: &SessionState, question: &str) -> Result<SessionState> {
        required("question", question)?;
        let mut next = state.clone();
        if !next.pending_questions.iter().any(|q| q == question) {
            next.pending_questions.push(question.to_string());
        }
        Ok(next)
    }

    pub fn add_advisor_note(&self, state: &SessionState, note: &str) -> Result<SessionState> {
        required("note", note)?;
        let mut next = state.clone();
        next.advisor_notes.push(AdvisorNote {
            note: note.to_string(),
            timestamp: self.now(),
        });
        Ok(next)
    }

    /// Write a scratch value for the agent.
    pub fn set_working_data(
        &self,
        state: &SessionState,
        key: &str,
        value: Value,
    ) -> Result<SessionState> {
        let key = required("working_data key", key)?;
        let mut next = state.clone();
        next.working_data.insert(key.to_string(), value);
        Ok(next)
    }

    /// True when `merchant_id` (bare or prefixed) owns this session.
    pub fn validate_merchant_match(&self, state: &SessionState, merchant_id: &str) -> Result<bool> {
        Ok(normalize_merchant_id(merchant_id)? == state.merchant_id)
    }

    pub fn session_summary(&self, state: &SessionState) -> SessionSummary {
        SessionSummary::from_state(state)
    }

    /// Full JSON-ready export, stamped with the current time as `ended_at`.
    pub fn export_session_summary(&self, state: &SessionState) -> SessionExport {
        SessionExport::from_state(state, self.now())
    }

    pub fn create_session_snapshot(&self, state: &SessionState, thread_id: &str) -> Attributes {
        create_session_snapshot(state, thread_id, self.now())
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SessionError::invalid(field, "must not be empty"));
    }
    Ok(trimmed)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::RecordingSpanEmitter;
    use crate::sessions::traits::ManualClock;
    use chrono::{TimeDelta, TimeZone};
    use proptest::prelude::*;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 9, 14, 30, 22).unwrap()
    }

    fn manual() -> (SessionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let manager = SessionManager::default().with_clock(clock.clone());
        (manager, clock)
    }

    fn session(manager: &SessionManager) -> SessionState {
        manager
            .initialize("adv_001", "789456", Some("TechRetail"), Some("mid_market"))
            .unwrap()
    }

    #[test]
    fn initialize_normalizes_merchant_and_zeroes_counters() {
        let (manager, _) = manual();
        let state = session(&manager);
        assert_eq!(state.merchant_id, "mch_789456");
        assert_eq!(state.total_queries, 0);
        assert_eq!(state.started_at, t0());
        assert_eq!(state.last_activity_at, t0());
        assert_eq!(state.merchant_name.as_deref(), Some("TechRetail"));
        assert!(state.session_id.starts_with("ses_20250109_143022_"));
        assert!(state.topics_discussed.is_empty());
        assert!(state.cached_data.is_empty());
        assert!(state.validate().is_ok());
    }

    #[test]
    fn initialize_rejects_bad_identifiers() {
        let manager = SessionManager::default();
        assert!(matches!(
            manager.initialize("", "789456", None, None),
            Err(SessionError::InvalidInput { field: "advisor_id", .. })
        ));
        assert!(manager.initialize("adv_001", "", None, None).is_err());
        assert!(manager.initialize("adv_001", "mch_", None, None).is_err());
    }

    #[test]
    fn increment_counts_and_never_moves_activity_backwards() {
        let (manager, clock) = manual();
        let s0 = session(&manager);

        clock.advance(TimeDelta::seconds(5));
        let s1 = manager.increment_query_count(&s0);
        assert_eq!(s1.total_queries, 1);
        assert_eq!(s1.last_activity_at, t0() + TimeDelta::seconds(5));

        clock.set(t0() - TimeDelta::seconds(60));
        let s2 = manager.increment_query_count(&s1);
        assert_eq!(s2.total_queries, 2);
        assert_eq!(s2.last_activity_at, s1.last_activity_at);

        // Inputs are untouched.
        assert_eq!(s0.total_queries, 0);
        assert_eq!(s1.total_queries, 1);
    }

    #[test]
    fn cache_hit_returns_payload() {
        let (manager, clock) = manual();
        let state = manager
            .cache_data(&session(&manager), "profile", json!({"name": "TechRetail"}))
            .unwrap();
        clock.advance(TimeDelta::seconds(60));

        let lookup = manager.get_cached_data(&state, "profile").unwrap();
        assert_eq!(lookup.into_value(), Some(json!({"name": "TechRetail"})));
    }

    #[test]
    fn cache_miss_for_unknown_type() {
        let (manager, _) = manual();
        let lookup = manager.get_cached_data(&session(&manager), "metrics").unwrap();
        assert_eq!(lookup.miss_reason(), Some(&MissReason::NotFound));
    }

    #[test]
    fn cache_entry_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new(t0()));
        let manager = SessionManager::new(CacheConfig::default().with_ttl("profile", 1))
            .with_clock(clock.clone());
        let state = manager
            .cache_data(&session(&manager), "profile", json!({"name": "TechRetail"}))
            .unwrap();

        clock.advance(TimeDelta::milliseconds(1100));
        let lookup = manager.get_cached_data(&state, "profile").unwrap();
        match lookup.miss_reason() {
            Some(MissReason::Expired {
                age_seconds,
                ttl_seconds,
            }) => {
                assert_eq!(*ttl_seconds, 1);
                assert!((age_seconds - 1.1).abs() < 1e-9);
            }
            other => panic!("expected expiry, got {other:?}"),
        }
    }

    #[test]
    fn cache_overwrite_replaces_payload_and_timestamp() {
        let (manager, clock) = manual();
        let s1 = manager
            .cache_data(&session(&manager), "metrics", json!({"v": 1}))
            .unwrap();
        clock.advance(TimeDelta::seconds(10));
        let s2 = manager.cache_data(&s1, "metrics", json!({"w": 2})).unwrap();

        assert_eq!(s2.cached_data["metrics"], json!({"w": 2}));
        assert_eq!(s2.cached_at["metrics"], t0() + TimeDelta::seconds(10));
        assert_eq!(s1.cached_data["metrics"], json!({"v": 1}));
    }

    #[test]
    fn cache_without_timestamp_is_an_error() {
        let (manager, _) = manual();
        let mut state = manager
            .cache_data(&session(&manager), "alerts", json!([]))
            .unwrap();
        state.cached_at.clear();
        assert!(matches!(
            manager.get_cached_data(&state, "alerts"),
            Err(SessionError::MissingCacheTimestamp(key)) if key == "alerts"
        ));
    }

    #[test]
    fn cache_lookup_emits_span_with_miss_reason() {
        let recorder = Arc::new(RecordingSpanEmitter::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let manager = SessionManager::default()
            .with_clock(clock.clone())
            .with_emitter(recorder.clone());
        let state = manager
            .cache_data(&session(&manager), "alerts", json!([1]))
            .unwrap();

        manager.get_cached_data(&state, "alerts").unwrap();
        clock.advance(TimeDelta::seconds(31));
        manager.get_cached_data(&state, "alerts").unwrap();
        manager.get_cached_data(&state, "profile").unwrap();

        let spans = recorder.spans_named("cache_lookup");
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].attribute("cache.hit").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(spans[0].attribute("cache.ttl_seconds").and_then(|v| v.as_i64()), Some(30));
        assert_eq!(
            spans[1].attribute("cache.miss_reason").and_then(|v| v.as_str()),
            Some("expired")
        );
        assert_eq!(
            spans[2].attribute("cache.miss_reason").and_then(|v| v.as_str()),
            Some("not_found")
        );
        assert!(spans[2].attribute("cache.age_seconds").is_none());
    }

    #[test]
    fn topics_collapse_case_and_spacing_variants() {
        let (manager, _) = manual();
        let s1 = manager.add_topic(&session(&manager), "A B").unwrap();
        let s2 = manager.add_topic(&s1, "a_b").unwrap();
        let s3 = manager.add_topic(&s2, "Decline Rates").unwrap();
        let s4 = manager.add_topic(&s3, "a b").unwrap();
        assert_eq!(s4.topics_discussed, vec!["a_b", "decline_rates"]);
    }

    #[test]
    fn pending_questions_are_case_sensitive() {
        let (manager, _) = manual();
        let s1 = manager.add_pending_question(&session(&manager), "What?").unwrap();
        let s2 = manager.add_pending_question(&s1, "what?").unwrap();
        let s3 = manager.add_pending_question(&s2, "What?").unwrap();
        assert_eq!(s3.pending_questions, vec!["What?", "what?"]);
    }

    #[test]
    fn recommendations_and_notes_accumulate() {
        let (manager, clock) = manual();
        let mut state = session(&manager);
        for _ in 0..2 {
            state = manager
                .add_recommendation(&state, "pricing", "high", "Lower fees", Some("+5%"))
                .unwrap();
            state = manager.add_advisor_note(&state, "Merchant receptive").unwrap();
            clock.advance(TimeDelta::seconds(1));
        }
        assert_eq!(state.recommendations.len(), 2);
        assert_eq!(state.recommendations[0].expected_impact.as_deref(), Some("+5%"));
        assert_eq!(state.advisor_notes.len(), 2);
        assert_eq!(state.advisor_notes[1].timestamp, t0() + TimeDelta::seconds(1));
    }

    #[test]
    fn empty_text_is_rejected() {
        let (manager, _) = manual();
        let state = session(&manager);
        assert!(manager.add_topic(&state, "  ").is_err());
        assert!(manager.add_pending_question(&state, "").is_err());
        assert!(manager.add_advisor_note(&state, "\n").is_err());
        assert!(manager.cache_data(&state, "", json!(1)).is_err());
        assert!(manager
            .add_recommendation(&state, "pricing", "high", "", None)
            .is_err());
    }

    #[test]
    fn working_data_is_scratch_space() {
        let (manager, _) = manual();
        let state = manager
            .set_working_data(&session(&manager), "draft", json!({"step": 2}))
            .unwrap();
        assert_eq!(state.working_data["draft"]["step"], 2);
    }

    #[test]
    fn merchant_match_normalizes_input() {
        let manager = SessionManager::default();
        let state = manager.initialize("adv_001", "mch_111111", None, None).unwrap();
        assert!(manager.validate_merchant_match(&state, "111111").unwrap());
        assert!(manager.validate_merchant_match(&state, "mch_111111").unwrap());
        assert!(!manager.validate_merchant_match(&state, "222222").unwrap());
        assert!(manager.validate_merchant_match(&state, "").is_err());
    }

    #[test]
    fn summary_duration_tracks_activity() {
        let (manager, clock) = manual();
        let s0 = session(&manager);
        clock.advance(TimeDelta::seconds(90));
        let s1 = manager.increment_query_count(&s0);
        let summary = manager.session_summary(&s1);
        assert!((summary.duration_seconds - 90.0).abs() < f64::EPSILON);
        assert_eq!(summary.total_queries, 1);
    }

    #[test]
    fn thread_id_uses_manager_clock() {
        let (manager, _) = manual();
        assert_eq!(
            manager.thread_id_for("789456").unwrap(),
            "merchant_mch_789456_20250109_143022"
        );
    }

    proptest! {
        #[test]
        fn query_count_increases_by_one_per_call(steps in proptest::collection::vec(-5i64..30, 1..20)) {
            let (manager, clock) = manual();
            let mut state = session(&manager);
            for (i, step) in steps.iter().enumerate() {
                clock.advance(TimeDelta::seconds(*step));
                let next = manager.increment_query_count(&state);
                prop_assert_eq!(next.total_queries, i as u64 + 1);
                prop_assert!(next.last_activity_at >= state.last_activity_at);
                state = next;
            }
            prop_assert!(state.duration_seconds() >= 0.0);
        }

        #[test]
        fn lookup_hits_before_ttl_and_misses_after(ttl in 1u64..7200, eps_ms in 1i64..999) {
            let clock = Arc::new(ManualClock::new(t0()));
            let manager = SessionManager::new(CacheConfig::default().with_ttl("x", ttl))
                .with_clock(clock.clone());
            let state = manager.cache_data(&session(&manager), "x", json!(1)).unwrap();
            let ttl_ms = i64::try_from(ttl).unwrap() * 1000;

            clock.set(t0() + TimeDelta::milliseconds(ttl_ms - eps_ms));
            prop_assert!(manager.get_cached_data(&state, "x").unwrap().is_hit());

            clock.set(t0() + TimeDelta::milliseconds(ttl_ms + eps_ms));
            let miss = manager.get_cached_data(&state, "x").unwrap();
            prop_assert_eq!(miss.miss_reason().map(MissReason::as_str), Some("expired"));
        }
    }
}
