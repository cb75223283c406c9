//! Prometheus [`Metrics`](hermod::Metrics) adapter for Hermod.
//! Bring your own `prometheus::Registry`; counters/gauges are registered on construction.

use hermod::prelude::BackpressureStrategy;
use hermod::Metrics;
use prometheus::{CounterVec, GaugeVec, HistogramVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// A [`Metrics`] implementation backed by a `prometheus::Registry`.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Arc<Registry>,
    messages_processed_total: CounterVec,
    message_errors_total: CounterVec,
    sink_writes_total: CounterVec,
    sink_write_errors_total: CounterVec,
    processing_duration_seconds: HistogramVec,
    dead_letter_total: CounterVec,
    active_total: IntGauge,
    backpressure_drop_total: CounterVec,
    backpressure_spill_total: CounterVec,
    idempotency_deduplicated_total: CounterVec,
    idempotency_conflicted_total: CounterVec,
    circuit_breaker_open: GaugeVec,
}

impl PrometheusMetrics {
    /// Registers every Hermod metric family into `registry`.
    ///
    /// # Errors
    /// Returns an error if any metric name collides with one already registered.
    pub fn new<R: Into<Arc<Registry>>>(registry: R) -> Result<Self, prometheus::Error> {
        let registry = registry.into();

        let messages_processed_total =
            CounterVec::new(Opts::new("hermod_messages_processed_total", "Messages produced into the buffer"), &["source_id"])?;
        let message_errors_total =
            CounterVec::new(Opts::new("hermod_message_errors_total", "Source read/produce errors"), &["source_id"])?;
        let sink_writes_total =
            CounterVec::new(Opts::new("hermod_sink_writes_total", "Messages delivered to a sink"), &["sink_id"])?;
        let sink_write_errors_total =
            CounterVec::new(Opts::new("hermod_sink_write_errors_total", "Sink write failures"), &["sink_id"])?;
        let processing_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("hermod_processing_duration_seconds", "Batch flush / dispatch latency"),
            &["sink_id"],
        )?;
        let dead_letter_total =
            CounterVec::new(Opts::new("hermod_dead_letter_total", "Messages routed to a dead-letter sink"), &["sink_id"])?;
        let active_total = IntGauge::new("hermod_active_total", "Configured sink writer count")?;
        let backpressure_drop_total = CounterVec::new(
            Opts::new("hermod_backpressure_drop_total", "Messages dropped by a backpressure strategy"),
            &["sink_id", "strategy"],
        )?;
        let backpressure_spill_total =
            CounterVec::new(Opts::new("hermod_backpressure_spill_total", "Messages spilled to disk"), &["sink_id"])?;
        let idempotency_deduplicated_total = CounterVec::new(
            Opts::new("hermod_idempotency_deduplicated_total", "Writes deduplicated by the sink"),
            &["sink_id"],
        )?;
        let idempotency_conflicted_total = CounterVec::new(
            Opts::new("hermod_idempotency_conflicted_total", "Writes that conflicted on idempotency key"),
            &["sink_id"],
        )?;
        let circuit_breaker_open =
            GaugeVec::new(Opts::new("hermod_circuit_breaker_open", "1 if a sink's circuit breaker is open"), &["sink_id"])?;

        for c in [&messages_processed_total, &message_errors_total, &sink_writes_total, &sink_write_errors_total] {
            registry.register(Box::new(c.clone()))?;
        }
        registry.register(Box::new(processing_duration_seconds.clone()))?;
        registry.register(Box::new(dead_letter_total.clone()))?;
        registry.register(Box::new(active_total.clone()))?;
        registry.register(Box::new(backpressure_drop_total.clone()))?;
        registry.register(Box::new(backpressure_spill_total.clone()))?;
        registry.register(Box::new(idempotency_deduplicated_total.clone()))?;
        registry.register(Box::new(idempotency_conflicted_total.clone()))?;
        registry.register(Box::new(circuit_breaker_open.clone()))?;

        Ok(Self {
            registry,
            messages_processed_total,
            message_errors_total,
            sink_writes_total,
            sink_write_errors_total,
            processing_duration_seconds,
            dead_letter_total,
            active_total,
            backpressure_drop_total,
            backpressure_spill_total,
            idempotency_deduplicated_total,
            idempotency_conflicted_total,
            circuit_breaker_open,
        })
    }

    /// Expose the registry for HTTP scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Metrics for PrometheusMetrics {
    fn messages_processed_total(&self, source_id: &str) {
        self.messages_processed_total.with_label_values(&[source_id]).inc();
    }

    fn message_errors_total(&self, source_id: &str) {
        self.message_errors_total.with_label_values(&[source_id]).inc();
    }

    fn sink_writes_total(&self, sink_id: &str, count: u64) {
        self.sink_writes_total.with_label_values(&[sink_id]).inc_by(count as f64);
    }

    fn sink_write_errors_total(&self, sink_id: &str) {
        self.sink_write_errors_total.with_label_values(&[sink_id]).inc();
    }

    fn processing_duration_seconds(&self, sink_id: &str, seconds: f64) {
        self.processing_duration_seconds.with_label_values(&[sink_id]).observe(seconds);
    }

    fn dead_letter_total(&self, sink_id: &str, count: u64) {
        self.dead_letter_total.with_label_values(&[sink_id]).inc_by(count as f64);
    }

    fn active_total(&self, count: i64) {
        self.active_total.set(count);
    }

    fn backpressure_drop_total(&self, sink_id: &str, strategy: BackpressureStrategy, count: u64) {
        self.backpressure_drop_total
            .with_label_values(&[sink_id, strategy.as_metric_label()])
            .inc_by(count as f64);
    }

    fn backpressure_spill_total(&self, sink_id: &str, count: u64) {
        self.backpressure_spill_total.with_label_values(&[sink_id]).inc_by(count as f64);
    }

    fn idempotency_deduplicated_total(&self, sink_id: &str, count: u64) {
        self.idempotency_deduplicated_total.with_label_values(&[sink_id]).inc_by(count as f64);
    }

    fn idempotency_conflicted_total(&self, sink_id: &str, count: u64) {
        self.idempotency_conflicted_total.with_label_values(&[sink_id]).inc_by(count as f64);
    }

    fn circuit_breaker_open(&self, sink_id: &str, open: bool) {
        self.circuit_breaker_open.with_label_values(&[sink_id]).set(if open { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_writes_and_exposes_them_on_the_registry() {
        let registry = Registry::new();
        let metrics = PrometheusMetrics::new(registry).unwrap();
        metrics.sink_writes_total("warehouse", 3);
        metrics.circuit_breaker_open("warehouse", true);

        let families = metrics.registry().gather();
        let names: Vec<_> = families.iter().map(|f| f.name()).collect();
        assert!(names.contains(&"hermod_sink_writes_total"));
        assert!(names.contains(&"hermod_circuit_breaker_open"));
    }
}
