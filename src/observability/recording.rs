use super::traits::{emit_quietly, SpanEmitter, SpanRecord};
use parking_lot::Mutex;
use std::sync::Arc;

/// Keeps every emitted span in memory, in emission order.
///
/// Optionally forwards each span to another backend after recording it.
pub struct RecordingSpanEmitter {
    spans: Mutex<Vec<SpanRecord>>,
    forward: Option<Arc<dyn SpanEmitter>>,
}

impl RecordingSpanEmitter {
    pub fn new() -> Self {
        Self {
            spans: Mutex::new(Vec::new()),
            forward: None,
        }
    }

    /// Record spans and also hand them to `inner`.
    pub fn forwarding_to(inner: Arc<dyn SpanEmitter>) -> Self {
        Self {
            spans: Mutex::new(Vec::new()),
            forward: Some(inner),
        }
    }

    /// Copy of all spans recorded so far.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans.lock().clone()
    }

    /// Spans with the given name.
    pub fn spans_named(&self, name: &str) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.lock().is_empty()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<SpanRecord> {
        std::mem::take(&mut *self.spans.lock())
    }
}

impl Default for RecordingSpanEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpanEmitter for RecordingSpanEmitter {
    fn emit(&self, span: &SpanRecord) -> anyhow::Result<()> {
        self.spans.lock().push(span.clone());
        if let Some(inner) = &self.forward {
            emit_quietly(inner.as_ref(), span);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
