//! Named metric emission points (§6), decoupled from any particular metrics backend.
//!
//! `hermod-prometheus`/`hermod-otlp` provide real [`Metrics`] implementations; tests and
//! standalone use reach for [`NoopMetrics`].

use crate::hermod_error::BackpressureStrategy;

/// One method per metric family named in the status/observability section of the spec.
pub trait Metrics: Send + Sync {
    fn messages_processed_total(&self, source_id: &str) {
        let _ = source_id;
    }

    fn message_errors_total(&self, source_id: &str) {
        let _ = source_id;
    }

    fn sink_writes_total(&self, sink_id: &str, count: u64) {
        let _ = (sink_id, count);
    }

    fn sink_write_errors_total(&self, sink_id: &str) {
        let _ = sink_id;
    }

    fn processing_duration_seconds(&self, sink_id: &str, seconds: f64) {
        let _ = (sink_id, seconds);
    }

    fn dead_letter_total(&self, sink_id: &str, count: u64) {
        let _ = (sink_id, count);
    }

    fn active_total(&self, count: i64) {
        let _ = count;
    }

    fn backpressure_drop_total(&self, sink_id: &str, strategy: BackpressureStrategy, count: u64) {
        let _ = (sink_id, strategy, count);
    }

    fn backpressure_spill_total(&self, sink_id: &str, count: u64) {
        let _ = (sink_id, count);
    }

    fn idempotency_deduplicated_total(&self, sink_id: &str, count: u64) {
        let _ = (sink_id, count);
    }

    fn idempotency_conflicted_total(&self, sink_id: &str, count: u64) {
        let _ = (sink_id, count);
    }

    fn circuit_breaker_open(&self, sink_id: &str, open: bool) {
        let _ = (sink_id, open);
    }
}

/// A [`Metrics`] implementation that discards every observation; the default for tests and
/// for callers with no metrics backend wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_metrics_accepts_every_call_without_panicking() {
        let m = NoopMetrics;
        m.messages_processed_total("src");
        m.sink_writes_total("sink", 10);
        m.backpressure_drop_total("sink", BackpressureStrategy::DropOldest, 1);
        m.circuit_breaker_open("sink", true);
    }
}
