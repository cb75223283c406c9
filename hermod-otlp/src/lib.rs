//! OTLP [`Metrics`](hermod::Metrics) adapter for Hermod.
//! Bring your own `opentelemetry_sdk::logs::LoggerProvider`; events are emitted as OTLP logs.

use hermod::{BackpressureStrategy, Metrics};
use opentelemetry::logs::{AnyValue, LogRecord, Logger, LoggerProvider, Severity};

/// Emits Hermod metric events as structured OTLP log records.
///
/// Example usage:
/// ```ignore
/// use opentelemetry_sdk::logs::LoggerProvider;
/// use hermod_otlp::OtlpMetrics;
///
/// let provider = LoggerProvider::builder().build();
/// let metrics = OtlpMetrics::new(provider);
/// ```
#[derive(Clone, Debug)]
pub struct OtlpMetrics<P> {
    provider: P,
}

impl<P> OtlpMetrics<P>
where
    P: LoggerProvider + Clone + Send + Sync + 'static,
{
    /// Create an adapter from an existing OTLP logger provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn emit(&self, severity: Severity, body: &str, event_kind: &'static str, attrs: Vec<(&'static str, AnyValue)>)
    where
        P::Logger: Send,
    {
        let logger = self.provider.logger("hermod");
        let mut record = logger.create_log_record();
        record.set_severity_number(severity);
        record.set_body(AnyValue::from(body));
        record.add_attribute("component", "hermod");
        record.add_attribute("event_kind", event_kind);
        record.add_attributes(attrs);
        logger.emit(record);
    }
}

impl<P> Metrics for OtlpMetrics<P>
where
    P: LoggerProvider + Clone + Send + Sync + 'static,
    P::Logger: Send,
{
    fn messages_processed_total(&self, source_id: &str) {
        self.emit(
            Severity::Info,
            "messages_processed_total",
            "messages_processed_total",
            vec![("source_id", AnyValue::from(source_id))],
        );
    }

    fn message_errors_total(&self, source_id: &str) {
        self.emit(
            Severity::Warn,
            "message_errors_total",
            "message_errors_total",
            vec![("source_id", AnyValue::from(source_id))],
        );
    }

    fn sink_writes_total(&self, sink_id: &str, count: u64) {
        self.emit(
            Severity::Info,
            "sink_writes_total",
            "sink_writes_total",
            vec![("sink_id", AnyValue::from(sink_id)), ("count", AnyValue::from(count as i64))],
        );
    }

    fn sink_write_errors_total(&self, sink_id: &str) {
        self.emit(
            Severity::Warn,
            "sink_write_errors_total",
            "sink_write_errors_total",
            vec![("sink_id", AnyValue::from(sink_id))],
        );
    }

    fn processing_duration_seconds(&self, sink_id: &str, seconds: f64) {
        self.emit(
            Severity::Info,
            "processing_duration_seconds",
            "processing_duration_seconds",
            vec![("sink_id", AnyValue::from(sink_id)), ("seconds", AnyValue::from(seconds))],
        );
    }

    fn dead_letter_total(&self, sink_id: &str, count: u64) {
        self.emit(
            Severity::Warn,
            "dead_letter_total",
            "dead_letter_total",
            vec![("sink_id", AnyValue::from(sink_id)), ("count", AnyValue::from(count as i64))],
        );
    }

    fn active_total(&self, count: i64) {
        self.emit(Severity::Info, "active_total", "active_total", vec![("count", AnyValue::from(count))]);
    }

    fn backpressure_drop_total(&self, sink_id: &str, strategy: BackpressureStrategy, count: u64) {
        self.emit(
            Severity::Warn,
            "backpressure_drop_total",
            "backpressure_drop_total",
            vec![
                ("sink_id", AnyValue::from(sink_id)),
                ("strategy", AnyValue::from(strategy.as_metric_label())),
                ("count", AnyValue::from(count as i64)),
            ],
        );
    }

    fn backpressure_spill_total(&self, sink_id: &str, count: u64) {
        self.emit(
            Severity::Info,
            "backpressure_spill_total",
            "backpressure_spill_total",
            vec![("sink_id", AnyValue::from(sink_id)), ("count", AnyValue::from(count as i64))],
        );
    }

    fn idempotency_deduplicated_total(&self, sink_id: &str, count: u64) {
        self.emit(
            Severity::Info,
            "idempotency_deduplicated_total",
            "idempotency_deduplicated_total",
            vec![("sink_id", AnyValue::from(sink_id)), ("count", AnyValue::from(count as i64))],
        );
    }

    fn idempotency_conflicted_total(&self, sink_id: &str, count: u64) {
        self.emit(
            Severity::Warn,
            "idempotency_conflicted_total",
            "idempotency_conflicted_total",
            vec![("sink_id", AnyValue::from(sink_id)), ("count", AnyValue::from(count as i64))],
        );
    }

    fn circuit_breaker_open(&self, sink_id: &str, open: bool) {
        self.emit(
            if open { Severity::Warn } else { Severity::Info },
            "circuit_breaker_open",
            "circuit_breaker_open",
            vec![("sink_id", AnyValue::from(sink_id)), ("open", AnyValue::from(open))],
        );
    }
}
