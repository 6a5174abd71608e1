//! OpenTelemetry export for session spans.

use super::traits::{Attributes, AttributeValue, SpanEmitter, SpanRecord};
use anyhow::{Context, Result};
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{Span as _, Status, Tracer as _};
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use std::time::SystemTime;

const INSTRUMENTATION_SCOPE: &str = "merchant-advisor";
const TRACES_PATH: &str = "/v1/traces";

/// Build an OTLP/HTTP exporter and install a batching tracer provider as
/// the global provider.
///
/// The returned handle must be shut down on exit to flush pending spans.
pub fn init_otel(endpoint: &str, service_name: &str) -> Result<SdkTracerProvider> {
    let endpoint = traces_endpoint(endpoint);
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint.clone())
        .build()
        .with_context(|| format!("Failed to create OTLP exporter for {endpoint}"))?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    global::set_tracer_provider(provider.clone());
    tracing::info!(endpoint = %endpoint, service = service_name, "OpenTelemetry export enabled");
    Ok(provider)
}

/// Append the OTLP traces path unless the endpoint already names it.
pub fn traces_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.ends_with(TRACES_PATH) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{TRACES_PATH}")
    }
}

/// Replays finished [`SpanRecord`]s onto the global OpenTelemetry tracer,
/// keeping their original start, event and end timestamps.
pub struct OtelSpanEmitter {
    tracer: BoxedTracer,
}

impl OtelSpanEmitter {
    pub fn new() -> Self {
        Self {
            tracer: global::tracer(INSTRUMENTATION_SCOPE),
        }
    }
}

impl Default for OtelSpanEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpanEmitter for OtelSpanEmitter {
    fn emit(&self, span: &SpanRecord) -> Result<()> {
        let mut otel_span = self
            .tracer
            .span_builder(span.name.clone())
            .with_start_time(SystemTime::from(span.started_at))
            .with_attributes(to_key_values(&span.attributes))
            .start(&self.tracer);

        for event in &span.events {
            otel_span.add_event_with_timestamp(
                event.name.clone(),
                SystemTime::from(event.timestamp),
                to_key_values(&event.attributes),
            );
        }

        if let Some(error) = &span.error {
            otel_span.set_status(Status::error(error.clone()));
        }
        otel_span.end_with_timestamp(SystemTime::from(span.ended_at));
        Ok(())
    }

    fn name(&self) -> &str {
        "otel"
    }
}

fn to_key_values(attributes: &Attributes) -> Vec<KeyValue> {
    attributes
        .iter()
        .map(|(key, value)| match value {
            AttributeValue::String(v) => KeyValue::new(key.clone(), v.clone()),
            AttributeValue::Int(v) => KeyValue::new(key.clone(), *v),
            AttributeValue::Float(v) => KeyValue::new(key.clone(), *v),
            AttributeValue::Bool(v) => KeyValue::new(key.clone(), *v),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::SpanEvent;
    use chrono::Utc;

    #[test]
    fn traces_endpoint_appends_path_once() {
        assert_eq!(
            traces_endpoint("http://localhost:4318"),
            "http://localhost:4318/v1/traces"
        );
        assert_eq!(
            traces_endpoint("http://localhost:4318/"),
            "http://localhost:4318/v1/traces"
        );
        assert_eq!(
            traces_endpoint("http://collector:4318/v1/traces"),
            "http://collector:4318/v1/traces"
        );
    }

    #[test]
    fn key_values_keep_primitive_types() {
        let mut attrs = Attributes::new();
        attrs.insert("s".into(), "v".into());
        attrs.insert("i".into(), 7i64.into());
        let kvs = to_key_values(&attrs);
        assert_eq!(kvs.len(), 2);
        assert_eq!(kvs[0].key.as_str(), "i");
        assert_eq!(kvs[0].value, opentelemetry::Value::I64(7));
    }

    #[test]
    fn emit_against_default_global_provider_succeeds() {
        let now = Utc::now();
        let mut span = SpanRecord::new("merchant_query", now);
        span.set_attribute("session.query_number", 1u64);
        span.add_event(SpanEvent::new("user_message", now, Attributes::new()));
        span.error = Some("agent failed".into());
        span.finish(now);

        assert!(OtelSpanEmitter::new().emit(&span).is_ok());
    }
}
