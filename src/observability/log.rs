//! Span emitter that writes each span into the `tracing` log.

use super::traits::{SpanEmitter, SpanRecord};
use anyhow::Context;

/// Serializes each span as JSON into a single `info` event on the
/// `merchant_advisor::trace` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSpanEmitter;

impl SpanEmitter for LogSpanEmitter {
    fn emit(&self, span: &SpanRecord) -> anyhow::Result<()> {
        let json = serde_json::to_string(span).context("Failed to serialize span")?;
        tracing::info!(
            target: "merchant_advisor::trace",
            span = %span.name,
            events = span.events.len(),
            trace_span = %json,
            "span"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::SpanEvent;
    use chrono::Utc;

    #[test]
    fn log_emitter_serializes_spans() {
        let now = Utc::now();
        let mut span = SpanRecord::new("cache_lookup", now);
        span.set_attribute("cache.hit", true);
        span.add_event(SpanEvent::new("evt", now, Default::default()));
        span.finish(now);

        assert!(LogSpanEmitter.emit(&span).is_ok());
        assert_eq!(LogSpanEmitter.name(), "log");
    }
}
