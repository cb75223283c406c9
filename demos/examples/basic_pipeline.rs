//! Minimal end-to-end run: one in-memory source, one stdout sink, default config.
//! Run with `cargo run --example basic_pipeline -p demos`.

use demos::{InMemorySource, StdoutSink};
use hermod::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let messages = (0..5)
        .map(|i| Message { id: format!("msg-{i}"), table: "orders".into(), schema: "public".into(), ..Default::default() })
        .collect();
    let source = Arc::new(InMemorySource::new(messages));

    let sink = Arc::new(StdoutSink::new("warehouse"));
    let metrics = Arc::new(NoopMetrics);
    let writer = Arc::new(SinkWriter::new("warehouse", sink.clone(), SinkConfig::default(), metrics.clone(), None, None));
    let sink_handle = register_sink(sink, writer, CancellationToken::new());

    let buffer_dir = std::env::temp_dir().join("hermod-basic-pipeline-demo");
    let engine = Arc::new(
        Engine::new(
            "basic-pipeline-demo",
            EngineConfig::default(),
            source,
            None,
            SourceConfig::default(),
            buffer_dir,
            None,
            Arc::new(BroadcastRouter),
            vec![sink_handle],
            metrics,
            CancellationToken::new(),
        )
        .expect("engine construction"),
    );

    let cancellation = CancellationToken::new();
    let run_cancellation = cancellation.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancellation).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancellation.cancel();
    handle.await.expect("engine task").expect("engine run");
}
