//! Scripted single-merchant conversation used by `merchant-advisor demo`.

use super::scripted::ScriptedAgent;
use super::session::{AdvisorSession, MerchantSession};
use crate::sessions::{CacheLookup, SessionState};
use anyhow::Result;
use serde_json::json;

const PREVIEW_CHARS: usize = 200;

/// Canned advisor replies, one per demo query.
pub const DEMO_RESPONSES: [&str; 4] = [
    "TechRetail is a mid-market card-present and e-commerce merchant. \
     Volume is steady and chargebacks are below the segment average.",
    "High decline rates in mid-market usually come from aggressive fraud \
     filters, stale card data and issuer soft declines on retries.",
    "Start by reviewing the fraud rule thresholds, then enable account \
     updater and add a retry schedule for soft declines.",
    "Typical monthly volume for the segment is 5,000 to 50,000 transactions \
     with an average ticket between 40 and 120 dollars.",
];

/// Who the demo session is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoOptions {
    pub advisor_id: String,
    pub merchant_id: String,
    pub merchant_name: Option<String>,
    pub segment: Option<String>,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            advisor_id: "adv_001".into(),
            merchant_id: "789456".into(),
            merchant_name: Some("TechRetail".into()),
            segment: Some("mid_market".into()),
        }
    }
}

/// Final state of a demo run plus every exchanged turn.
#[derive(Debug, Clone)]
pub struct DemoOutcome {
    pub thread_id: String,
    pub state: SessionState,
    pub exchanges: Vec<(String, String)>,
}

/// Agent that answers the four demo queries in order.
pub fn demo_agent() -> ScriptedAgent {
    ScriptedAgent::new(DEMO_RESPONSES)
}

/// Walk one merchant through four queries, recording topics, cache
/// entries, a recommendation, a note and a follow-up question on the way.
pub async fn run_demo(session: &AdvisorSession, options: &DemoOptions) -> Result<DemoOutcome> {
    let manager = session.manager();
    let MerchantSession {
        thread_id,
        mut state,
    } = session.start_merchant_session(
        &options.advisor_id,
        &options.merchant_id,
        options.merchant_name.as_deref(),
        options.segment.as_deref(),
    )?;
    println!("Session started: {}", state.session_id);
    println!("Thread ID:       {thread_id}");
    println!("Merchant:        {}\n", state.merchant_id);

    state = manager.cache_data(
        &state,
        "profile",
        json!({
            "merchant_id": state.merchant_id,
            "name": state.merchant_name,
            "segment": state.segment,
        }),
    )?;
    state = manager.cache_data(
        &state,
        "metrics",
        json!({"approval_rate": 0.91, "chargeback_rate": 0.004}),
    )?;

    let mut exchanges = Vec::new();
    let queries = [
        format!("I'm working with {}. What should I know?", state.merchant_id),
        "What are the typical causes of high decline rates for this segment?".to_string(),
        "What specific steps should I take to address this?".to_string(),
        "What is typical transaction volume for this segment?".to_string(),
    ];

    for (i, query) in queries.iter().enumerate() {
        println!("Query {}: {query}", i + 1);
        let (response, next) = session.run_query(&thread_id, &state, query).await?;
        println!("Response: {}\n", preview(&response));
        state = next;

        match i {
            0 => {
                state = manager.add_topic(&state, "merchant_overview")?;
                report_lookup("profile", &manager.get_cached_data(&state, "profile")?);
            }
            1 => {
                state = manager.add_topic(&state, "decline_rates")?;
                state = manager.add_recommendation(
                    &state,
                    "decline_optimization",
                    "high",
                    "Review fraud filter settings; they may be too aggressive for the segment",
                    Some("Could reduce false positives by 15-20%"),
                )?;
            }
            2 => {
                state = manager.add_advisor_note(
                    &state,
                    "Merchant expressed interest in decline rate optimization",
                )?;
                report_lookup("metrics", &manager.get_cached_data(&state, "metrics")?);
            }
            _ => {
                state = manager.add_topic(&state, "transaction_volume")?;
                state = manager.add_pending_question(
                    &state,
                    "Does the merchant retry soft declines today?",
                )?;
                report_lookup(
                    "transactions",
                    &manager.get_cached_data(&state, "transactions")?,
                );
            }
        }
        exchanges.push((query.clone(), response));
    }

    Ok(DemoOutcome {
        thread_id,
        state,
        exchanges,
    })
}

fn report_lookup(data_type: &str, lookup: &CacheLookup) {
    match lookup.miss_reason() {
        None => println!("Cache {data_type}: hit\n"),
        Some(reason) => println!("Cache {data_type}: miss ({})\n", reason.as_str()),
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}
