//! JSONL [`Metrics`](hermod::Metrics) adapter for Hermod. Writes one JSON object per observed
//! event to a file, one line per event. `Metrics` methods are synchronous, so each call
//! enqueues onto an unbounded channel drained by a background task that owns the file.

use hermod::{BackpressureStrategy, Metrics};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Appends one JSON line per Hermod metric event to `path`.
#[derive(Clone)]
pub struct JsonlMetrics {
    tx: mpsc::UnboundedSender<serde_json::Value>,
}

impl JsonlMetrics {
    /// Spawns the background writer task and returns a handle. Must be called from within a
    /// Tokio runtime.
    pub fn spawn<S: Into<String>>(path: S) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();
        let path = path.into();
        tokio::spawn(async move {
            let mut file = match tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(error = %e, path, "jsonl metrics sink failed to open file");
                    return;
                }
            };
            while let Some(event) = rx.recv().await {
                let line = event.to_string() + "\n";
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    tracing::warn!(error = %e, "jsonl metrics sink write failed");
                }
            }
        });
        Self { tx }
    }

    fn emit(&self, value: serde_json::Value) {
        let _ = self.tx.send(value);
    }
}

impl Metrics for JsonlMetrics {
    fn messages_processed_total(&self, source_id: &str) {
        self.emit(json!({ "kind": "messages_processed_total", "source_id": source_id }));
    }

    fn message_errors_total(&self, source_id: &str) {
        self.emit(json!({ "kind": "message_errors_total", "source_id": source_id }));
    }

    fn sink_writes_total(&self, sink_id: &str, count: u64) {
        self.emit(json!({ "kind": "sink_writes_total", "sink_id": sink_id, "count": count }));
    }

    fn sink_write_errors_total(&self, sink_id: &str) {
        self.emit(json!({ "kind": "sink_write_errors_total", "sink_id": sink_id }));
    }

    fn processing_duration_seconds(&self, sink_id: &str, seconds: f64) {
        self.emit(json!({ "kind": "processing_duration_seconds", "sink_id": sink_id, "seconds": seconds }));
    }

    fn dead_letter_total(&self, sink_id: &str, count: u64) {
        self.emit(json!({ "kind": "dead_letter_total", "sink_id": sink_id, "count": count }));
    }

    fn active_total(&self, count: i64) {
        self.emit(json!({ "kind": "active_total", "count": count }));
    }

    fn backpressure_drop_total(&self, sink_id: &str, strategy: BackpressureStrategy, count: u64) {
        self.emit(json!({
            "kind": "backpressure_drop_total",
            "sink_id": sink_id,
            "strategy": strategy.as_metric_label(),
            "count": count,
        }));
    }

    fn backpressure_spill_total(&self, sink_id: &str, count: u64) {
        self.emit(json!({ "kind": "backpressure_spill_total", "sink_id": sink_id, "count": count }));
    }

    fn idempotency_deduplicated_total(&self, sink_id: &str, count: u64) {
        self.emit(json!({ "kind": "idempotency_deduplicated_total", "sink_id": sink_id, "count": count }));
    }

    fn idempotency_conflicted_total(&self, sink_id: &str, count: u64) {
        self.emit(json!({ "kind": "idempotency_conflicted_total", "sink_id": sink_id, "count": count }));
    }

    fn circuit_breaker_open(&self, sink_id: &str, open: bool) {
        self.emit(json!({ "kind": "circuit_breaker_open", "sink_id": sink_id, "open": open }));
    }
}
