//! Trace side channel for session operations.
//!
//! Everything in this module is optional: the session core only sees the
//! [`SpanEmitter`] trait, and the default backend discards spans.

pub mod log;
pub mod noop;
pub mod otel;
pub mod recording;
pub mod traits;

pub use self::log::LogSpanEmitter;
pub use noop::NoopSpanEmitter;
pub use otel::{init_otel, OtelSpanEmitter};
pub use recording::RecordingSpanEmitter;
pub use traits::{
    emit_quietly, AttributeValue, Attributes, SpanEmitter, SpanEvent, SpanRecord,
};

use crate::config::ObservabilityConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::Arc;

/// Active trace backend plus whatever must be flushed on exit.
pub struct Telemetry {
    emitter: Arc<dyn SpanEmitter>,
    provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    pub fn disabled() -> Self {
        Self {
            emitter: Arc::new(NoopSpanEmitter),
            provider: None,
        }
    }

    pub fn emitter(&self) -> Arc<dyn SpanEmitter> {
        Arc::clone(&self.emitter)
    }

    pub fn backend_name(&self) -> &str {
        self.emitter.name()
    }

    /// Flush and stop the exporter, if one was started.
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!("OpenTelemetry shutdown failed: {e}");
            }
        }
    }
}

/// Factory: pick the trace backend named by `[observability] backend`.
///
/// An OTLP exporter that cannot be built degrades to the no-op backend
/// with a warning; tracing never prevents a session from running.
pub fn init_telemetry(config: &ObservabilityConfig) -> Telemetry {
    match config.backend.trim().to_ascii_lowercase().as_str() {
        "log" => Telemetry {
            emitter: Arc::new(LogSpanEmitter),
            provider: None,
        },
        "otel" => {
            let endpoint = config
                .otel_endpoint
                .as_deref()
                .unwrap_or(crate::config::DEFAULT_OTEL_ENDPOINT);
            match init_otel(endpoint, config.service_name()) {
                Ok(provider) => Telemetry {
                    emitter: Arc::new(OtelSpanEmitter::new()),
                    provider: Some(provider),
                },
                Err(e) => {
                    tracing::warn!("{e:#}; continuing without observability");
                    Telemetry::disabled()
                }
            }
        }
        _ => Telemetry::disabled(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_defaults_to_noop() {
        let telemetry = init_telemetry(&ObservabilityConfig::default());
        assert_eq!(telemetry.backend_name(), "none");
        telemetry.shutdown();
    }

    #[test]
    fn factory_selects_log_backend() {
        let config = ObservabilityConfig {
            backend: "LOG".into(),
            ..ObservabilityConfig::default()
        };
        assert_eq!(init_telemetry(&config).backend_name(), "log");
    }
}
