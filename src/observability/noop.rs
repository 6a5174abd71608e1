use super::traits::{SpanEmitter, SpanRecord};

/// Drops every span. The default when no backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSpanEmitter;

impl SpanEmitter for NoopSpanEmitter {
    fn emit(&self, _span: &SpanRecord) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_accepts_everything() {
        let emitter = NoopSpanEmitter;
        assert!(emitter.emit(&SpanRecord::new("x", chrono::Utc::now())).is_ok());
        assert_eq!(emitter.name(), "none");
    }
}
