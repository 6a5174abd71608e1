//! Read-only views of a session: summary, export and text rendering.
//!
//! All three derive their numbers from [`SessionSummary`], so the printed
//! view and the exported JSON cannot disagree.

use super::state::{AdvisorNote, Recommendation, SessionState};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

const RULE_WIDTH: usize = 70;

/// Counts and identity of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub advisor_id: String,
    pub merchant_id: String,
    pub merchant_name: Option<String>,
    pub segment: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub total_queries: u64,
    pub topics_count: usize,
    pub topics: Vec<String>,
    pub recommendations_count: usize,
    pub pending_questions_count: usize,
    pub advisor_notes_count: usize,
    pub cached_data_types: Vec<String>,
}

impl SessionSummary {
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            advisor_id: state.advisor_id.clone(),
            merchant_id: state.merchant_id.clone(),
            merchant_name: state.merchant_name.clone(),
            segment: state.segment.clone(),
            started_at: state.started_at,
            last_activity_at: state.last_activity_at,
            duration_seconds: state.duration_seconds(),
            total_queries: state.total_queries,
            topics_count: state.topics_discussed.len(),
            topics: state.topics_discussed.clone(),
            recommendations_count: state.recommendations.len(),
            pending_questions_count: state.pending_questions.len(),
            advisor_notes_count: state.advisor_notes.len(),
            cached_data_types: state.cached_data_types(),
        }
    }
}

/// Everything needed to hand a finished session to another system.
///
/// Cached payloads are left out; only their types and timestamps travel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionExport {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub ended_at: DateTime<Utc>,
    pub topics_discussed: Vec<String>,
    pub cached_at: BTreeMap<String, DateTime<Utc>>,
    pub recommendations: Vec<Recommendation>,
    pub pending_questions: Vec<String>,
    pub advisor_notes: Vec<AdvisorNote>,
    pub working_data: BTreeMap<String, Value>,
}

impl SessionExport {
    pub fn from_state(state: &SessionState, ended_at: DateTime<Utc>) -> Self {
        Self {
            summary: SessionSummary::from_state(state),
            ended_at,
            topics_discussed: state.topics_discussed.clone(),
            cached_at: state.cached_at.clone(),
            recommendations: state.recommendations.clone(),
            pending_questions: state.pending_questions.clone(),
            advisor_notes: state.advisor_notes.clone(),
            working_data: state.working_data.clone(),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Human-readable report. `detailed` also lists each recommendation and
/// advisor note.
pub fn render_session_state(state: &SessionState, detailed: bool) -> String {
    let summary = SessionSummary::from_state(state);
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);
    let mut lines: Vec<String> = Vec::new();

    lines.extend([String::new(), heavy.clone(), "SESSION STATE".into(), heavy.clone()]);
    lines.push(String::new());
    lines.push(format!("Session:         {}", summary.session_id));
    lines.push(format!("Advisor ID:      {}", summary.advisor_id));
    lines.push(format!("Merchant:        {}", merchant_label(&summary)));
    lines.push(format!("Started:         {}", timestamp(summary.started_at)));
    lines.push(format!("Last Activity:   {}", timestamp(summary.last_activity_at)));
    lines.push(format!(
        "Duration:        {:.1} minutes ({:.0}s)",
        summary.duration_seconds / 60.0,
        summary.duration_seconds
    ));

    lines.extend([String::new(), light.clone(), "METRICS".into(), light.clone()]);
    lines.push(format!("Total Queries:   {}", summary.total_queries));
    lines.push(format!("Topics:          {}", summary.topics_count));
    if !summary.topics.is_empty() {
        lines.push(format!("  Topics list:   {}", summary.topics.join(", ")));
    }
    lines.push(format!(
        "Cached Data:     {} types",
        summary.cached_data_types.len()
    ));
    if !summary.cached_data_types.is_empty() {
        lines.push(format!(
            "  Data types:    {}",
            summary.cached_data_types.join(", ")
        ));
    }
    lines.push(format!("Recommendations: {}", summary.recommendations_count));
    if detailed && !state.recommendations.is_empty() {
        lines.extend([
            String::new(),
            light.clone(),
            "RECOMMENDATIONS (DETAILED)".into(),
            light.clone(),
        ]);
        for (i, rec) in state.recommendations.iter().enumerate() {
            lines.push(String::new());
            lines.push(format!(
                "  {}. [{}] {}",
                i + 1,
                rec.priority.to_uppercase(),
                rec.kind
            ));
            lines.push(format!("     Description: {}", rec.description));
            if let Some(impact) = &rec.expected_impact {
                lines.push(format!("     Impact:      {impact}"));
            }
            lines.push(format!("     Created:     {}", timestamp(rec.created_at)));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "Pending Questions: {}",
        summary.pending_questions_count
    ));
    for (i, question) in state.pending_questions.iter().enumerate() {
        lines.push(format!("  {}. {question}", i + 1));
    }

    lines.push(String::new());
    lines.push(format!("Advisor Notes:   {}", summary.advisor_notes_count));
    if detailed && !state.advisor_notes.is_empty() {
        lines.extend([
            String::new(),
            light.clone(),
            "ADVISOR NOTES (DETAILED)".into(),
            light,
        ]);
        for (i, note) in state.advisor_notes.iter().enumerate() {
            lines.push(String::new());
            lines.push(format!("  {}. {}", i + 1, timestamp(note.timestamp)));
            lines.push(format!("     {}", note.note));
        }
    }

    lines.extend([String::new(), heavy, String::new()]);
    lines.join("\n")
}

pub fn print_session_state(state: &SessionState, detailed: bool) {
    println!("{}", render_session_state(state, detailed));
}

fn merchant_label(summary: &SessionSummary) -> String {
    let mut label = summary.merchant_id.clone();
    if let Some(name) = &summary.merchant_name {
        label.push_str(&format!(" ({name})"));
    }
    if let Some(segment) = &summary.segment {
        label.push_str(&format!(" [{segment}]"));
    }
    label
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
