//! Two sinks fed from one source, Prometheus + JSONL metrics wired in, status updates printed
//! as they arrive. Run with `cargo run --example multi_sink_with_metrics -p demos`.

use demos::{InMemorySource, StdoutSink};
use hermod::prelude::*;
use hermod_jsonl::JsonlMetrics;
use hermod_prometheus::PrometheusMetrics;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fans every call out to both backends; a real deployment would pick one.
struct CompositeMetrics {
    prometheus: PrometheusMetrics,
    jsonl: JsonlMetrics,
}

impl Metrics for CompositeMetrics {
    fn messages_processed_total(&self, source_id: &str) {
        self.prometheus.messages_processed_total(source_id);
        self.jsonl.messages_processed_total(source_id);
    }
    fn message_errors_total(&self, source_id: &str) {
        self.prometheus.message_errors_total(source_id);
        self.jsonl.message_errors_total(source_id);
    }
    fn sink_writes_total(&self, sink_id: &str, count: u64) {
        self.prometheus.sink_writes_total(sink_id, count);
        self.jsonl.sink_writes_total(sink_id, count);
    }
    fn sink_write_errors_total(&self, sink_id: &str) {
        self.prometheus.sink_write_errors_total(sink_id);
        self.jsonl.sink_write_errors_total(sink_id);
    }
    fn circuit_breaker_open(&self, sink_id: &str, open: bool) {
        self.prometheus.circuit_breaker_open(sink_id, open);
        self.jsonl.circuit_breaker_open(sink_id, open);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let messages = (0..20)
        .map(|i| Message { id: format!("msg-{i}"), table: "orders".into(), schema: "public".into(), ..Default::default() })
        .collect();
    let source = Arc::new(InMemorySource::new(messages));

    let registry = Registry::new();
    let metrics: Arc<dyn Metrics> = Arc::new(CompositeMetrics {
        prometheus: PrometheusMetrics::new(registry.clone()).expect("register prometheus families"),
        jsonl: JsonlMetrics::spawn("/tmp/hermod-demo-metrics.jsonl"),
    });

    let warehouse = Arc::new(StdoutSink::new("warehouse"));
    let archive = Arc::new(StdoutSink::new("archive"));
    let warehouse_writer =
        Arc::new(SinkWriter::new("warehouse", warehouse.clone(), SinkConfig::default(), metrics.clone(), None, None));
    let archive_writer =
        Arc::new(SinkWriter::new("archive", archive.clone(), SinkConfig::default(), metrics.clone(), None, None));

    let sinks = vec![
        register_sink(warehouse, warehouse_writer, CancellationToken::new()),
        register_sink(archive, archive_writer, CancellationToken::new()),
    ];

    let mut config = EngineConfig::default();
    config.status_interval = Duration::from_millis(100);

    let buffer_dir = std::env::temp_dir().join("hermod-multi-sink-demo");
    let engine = Arc::new(
        Engine::new(
            "multi-sink-demo",
            config,
            source,
            None,
            SourceConfig::default(),
            buffer_dir,
            None,
            Arc::new(BroadcastRouter),
            sinks,
            metrics,
            CancellationToken::new(),
        )
        .expect("engine construction"),
    );

    let mut status_rx = engine.subscribe_status().expect("status channel not yet taken");
    tokio::spawn(async move {
        while let Some(update) = status_rx.recv().await {
            println!("status: {:?} ring_depth={} sinks={}", update.engine_status, update.ring_depth, update.sinks.len());
        }
    });

    let cancellation = CancellationToken::new();
    let run_cancellation = cancellation.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancellation).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    cancellation.cancel();
    handle.await.expect("engine task").expect("engine run");

    println!(
        "prometheus families exposed: {}",
        registry.gather().len()
    );
}
