//! Trace sink seam.
//!
//! Session operations describe what happened as a [`SpanRecord`] and hand it
//! to a [`SpanEmitter`]. The emitter decides where it goes (nowhere, the log,
//! memory, or an OTLP collector). Emission is a side channel: callers log
//! and drop any error it returns.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Primitive attribute value accepted by trace sinks. No nesting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) => f.write_str(v),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for AttributeValue {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Flat, ordered attribute set.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A named, timestamped event inside a span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: Attributes,
}

impl SpanEvent {
    pub fn new(name: impl Into<String>, timestamp: DateTime<Utc>, attributes: Attributes) -> Self {
        Self {
            name: name.into(),
            timestamp,
            attributes,
        }
    }
}

/// A finished span, ready to hand to a [`SpanEmitter`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanRecord {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub attributes: Attributes,
    pub events: Vec<SpanEvent>,
    /// Set when the traced operation failed.
    pub error: Option<String>,
}

impl SpanRecord {
    pub fn new(name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            started_at,
            ended_at: started_at,
            attributes: Attributes::new(),
            events: Vec::new(),
            error: None,
        }
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn extend_attributes(&mut self, attributes: &Attributes) {
        self.attributes
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn add_event(&mut self, event: SpanEvent) {
        self.events.push(event);
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn finish(&mut self, ended_at: DateTime<Utc>) {
        self.ended_at = ended_at.max(self.started_at);
    }
}

/// Destination for finished spans.
///
/// Implementations must be cheap to call and must not panic; errors are
/// reported and then discarded by the caller.
pub trait SpanEmitter: Send + Sync {
    /// Export one finished span.
    fn emit(&self, span: &SpanRecord) -> Result<()>;

    /// Backend name for logs and `status` output.
    fn name(&self) -> &str;
}

/// Emit `span`, logging and discarding any failure.
pub fn emit_quietly(emitter: &dyn SpanEmitter, span: &SpanRecord) {
    if let Err(e) = emitter.emit(span) {
        tracing::debug!(
            emitter = emitter.name(),
            span = %span.name,
            error = %e,
            "trace emission failed; continuing without telemetry"
        );
    }
}
