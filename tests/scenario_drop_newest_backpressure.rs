//! With `channel_capacity=1` and `dropNewest`, a second enqueue while the shard is full is
//! rejected without reaching the sink, and the backpressure-drop metric increments once.

use async_trait::async_trait;
use hermod::prelude::*;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct NeverWritesSink;

#[async_trait]
impl Sink for NeverWritesSink {
    type Error = hermod::BufferError;

    async fn write(&self, _message: &Message) -> Result<(), Self::Error> {
        Ok(())
    }
    async fn ping(&self) -> Result<(), Self::Error> {
        Ok(())
    }
    async fn close(&self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_batch_sink(&self) -> Option<&dyn BatchSink<Error = Self::Error>> {
        Some(self)
    }
}

#[async_trait]
impl BatchSink for NeverWritesSink {
    async fn write_batch(&self, _messages: &[Message]) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Default)]
struct CountingMetrics {
    drops: AtomicU64,
}

impl hermod::observability::Metrics for CountingMetrics {
    fn backpressure_drop_total(&self, _sink_id: &str, strategy: BackpressureStrategy, count: u64) {
        assert!(matches!(strategy, BackpressureStrategy::DropNewest));
        self.drops.fetch_add(count, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn second_enqueue_past_capacity_is_dropped_newest() {
    let sink = Arc::new(NeverWritesSink);
    let metrics = Arc::new(CountingMetrics::default());
    let config = SinkConfig {
        channel_capacity: 1,
        shard_count: 1,
        batch_size: 100, // never crosses the size threshold; nothing flushes during the test
        batch_timeout: Duration::from_secs(10),
        backpressure_strategy: BackpressureStrategy::DropNewest,
        ..Default::default()
    };
    let writer =
        Arc::new(SinkWriter::new("blackhole", sink, config, metrics.clone() as Arc<dyn hermod::observability::Metrics>, None, None));

    let cancellation = CancellationToken::new();
    let run_handle = tokio::spawn(writer.clone().run(cancellation.clone()));

    let _first = writer.enqueue(Message { id: "1".into(), ..Default::default() }).await;
    let second = writer.enqueue(Message { id: "2".into(), ..Default::default() }).await;

    let outcome = second.await.unwrap();
    assert!(matches!(outcome, WriteOutcome::Dropped(BackpressureStrategy::DropNewest)));
    assert_eq!(metrics.drops.load(Ordering::SeqCst), 1);

    cancellation.cancel();
    run_handle.await.unwrap();
}
