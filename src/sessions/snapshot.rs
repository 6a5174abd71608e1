//! Flat trace attributes describing a session at one instant.

use super::state::{seconds_between, SessionState};
use crate::observability::{AttributeValue, Attributes, SpanEvent};
use chrono::{DateTime, Utc};

/// Prefix for the per-type cache age keys.
pub const CACHE_AGE_PREFIX: &str = "cache_age_";

/// Flatten `state` into primitive attributes for a trace sink.
///
/// Lists become `", "`-joined strings and each cached type contributes a
/// `cache_age_<type>` entry measured against `now`.
pub fn create_session_snapshot(
    state: &SessionState,
    thread_id: &str,
    now: DateTime<Utc>,
) -> Attributes {
    let mut snapshot = Attributes::new();
    let mut put = |key: &str, value: AttributeValue| {
        snapshot.insert(key.to_string(), value);
    };

    put("session.id", state.session_id.as_str().into());
    put("session.thread_id", thread_id.into());
    put("session.advisor_id", state.advisor_id.as_str().into());
    put("session.total_queries", state.total_queries.into());
    put("session.duration_seconds", state.duration_seconds().into());

    put("merchant.id", state.merchant_id.as_str().into());
    put(
        "merchant.name",
        state.merchant_name.as_deref().unwrap_or_default().into(),
    );
    put(
        "merchant.segment",
        state.segment.as_deref().unwrap_or_default().into(),
    );

    put("session.topics_count", state.topics_discussed.len().into());
    put("session.topics", state.topics_discussed.join(", ").into());
    put(
        "session.recommendations_count",
        state.recommendations.len().into(),
    );
    put(
        "session.pending_questions_count",
        state.pending_questions.len().into(),
    );
    put("session.advisor_notes_count", state.advisor_notes.len().into());

    let cached_types = state.cached_data_types();
    put("session.cached_data_types", cached_types.join(", ").into());
    put("session.cached_types_count", cached_types.len().into());

    for (data_type, cached_at) in &state.cached_at {
        snapshot.insert(
            format!("{CACHE_AGE_PREFIX}{data_type}"),
            seconds_between(*cached_at, now).into(),
        );
    }
    snapshot
}

/// A `session_snapshot_before` / `session_snapshot_after` event.
pub fn snapshot_event(name: &str, snapshot: &Attributes, at: DateTime<Utc>) -> SpanEvent {
    SpanEvent::new(name, at, snapshot.clone())
}

/// A `user_message` or `assistant_message` event.
pub fn message_event(
    role: &str,
    content: &str,
    query_number: Option<u64>,
    at: DateTime<Utc>,
) -> SpanEvent {
    let mut attributes = Attributes::new();
    attributes.insert("message.role".into(), role.into());
    attributes.insert("message.content".into(), content.into());
    if let Some(n) = query_number {
        attributes.insert("session.query_number".into(), n.into());
    }
    SpanEvent::new(format!("{role}_message"), at, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::{ManualClock, SessionManager};
    use chrono::{TimeDelta, TimeZone};
    use serde_json::json;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 9, 14, 30, 22).unwrap()
    }

    #[test]
    fn snapshot_flattens_lists_and_ages_cache_entries() {
        let clock = Arc::new(ManualClock::new(t0()));
        let manager = SessionManager::default().with_clock(clock.clone());
        let mut state = manager
            .initialize("adv_001", "789456", Some("TechRetail"), None)
            .unwrap();
        state = manager.cache_data(&state, "profile", json!({})).unwrap();
        clock.advance(TimeDelta::seconds(20));
        state = manager.cache_data(&state, "alerts", json!([])).unwrap();
        state = manager.add_topic(&state, "Decline Rates").unwrap();
        state = manager.add_topic(&state, "fees").unwrap();
        clock.advance(TimeDelta::seconds(10));

        let snap = manager.create_session_snapshot(&state, "merchant_mch_789456_20250109_143022");

        assert_eq!(snap["session.thread_id"].as_str(), Some("merchant_mch_789456_20250109_143022"));
        assert_eq!(snap["merchant.id"].as_str(), Some("mch_789456"));
        assert_eq!(snap["merchant.name"].as_str(), Some("TechRetail"));
        assert_eq!(snap["merchant.segment"].as_str(), Some(""));
        assert_eq!(snap["session.topics"].as_str(), Some("decline_rates, fees"));
        assert_eq!(snap["session.topics_count"].as_i64(), Some(2));
        assert_eq!(snap["session.cached_data_types"].as_str(), Some("alerts, profile"));
        assert_eq!(snap["session.cached_types_count"].as_i64(), Some(2));
        assert_eq!(snap["cache_age_profile"].as_f64(), Some(30.0));
        assert_eq!(snap["cache_age_alerts"].as_f64(), Some(10.0));
        assert_eq!(snap["session.total_queries"].as_i64(), Some(0));
    }

    #[test]
    fn snapshot_values_are_all_primitive() {
        let manager = SessionManager::default();
        let state = manager.initialize("adv_001", "1", None, None).unwrap();
        let snap = manager.create_session_snapshot(&state, "t");
        let json = serde_json::to_value(&snap).unwrap();
        for (key, value) in json.as_object().unwrap() {
            assert!(
                !value.is_object() && !value.is_array(),
                "{key} is not primitive"
            );
        }
    }

    #[test]
    fn message_event_carries_role_and_query_number() {
        let event = message_event("user", "How are declines?", Some(3), t0());
        assert_eq!(event.name, "user_message");
        assert_eq!(
            event.attributes.get("session.query_number"),
            Some(&AttributeValue::Int(3))
        );

        let event = message_event("assistant", "Fine.", None, t0());
        assert_eq!(event.name, "assistant_message");
        assert!(!event.attributes.contains_key("session.query_number"));
    }
}
