//! All 10 produced messages eventually reach a slow sink within the drain timeout even though
//! the dispatcher is cancelled partway through.

use async_trait::async_trait;
use hermod::engine::{Acker, Dispatcher};
use hermod::prelude::*;
use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct SlowSink;

#[async_trait]
impl Sink for SlowSink {
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
impl BatchSink for SlowSink {
    async fn write_batch(&self, messages: &[Message]) -> Result<(), Self::Error> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = messages.len();
        Ok(())
    }
}

struct RecordingAcker {
    acked: Mutex<Vec<String>>,
}

#[async_trait]
impl Acker for RecordingAcker {
    async fn ack(&self, message: &Message) {
        self.acked.lock().unwrap().push(message.id.clone());
    }
}

#[tokio::test]
async fn every_produced_message_is_delivered_before_the_drain_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let buffer = Arc::new(CombinedBuffer::new(dir.path(), 64, 90, Duration::from_millis(1000), None, 0).unwrap());

    for i in 0..10 {
        buffer.produce(Message { id: format!("{i:02}"), ..Default::default() }).await.unwrap();
    }

    let sink = Arc::new(SlowSink);
    let config = SinkConfig { batch_size: 1, shard_count: 1, channel_capacity: 32, ..Default::default() };
    let writer = Arc::new(SinkWriter::new("slow", sink, config, Arc::new(NoopMetrics), None, None));
    let sink_cancellation = CancellationToken::new();
    let sink_run_handle = tokio::spawn(writer.clone().run(sink_cancellation.clone()));

    let acker = Arc::new(RecordingAcker { acked: Mutex::new(Vec::new()) });
    let dispatcher = Arc::new(Dispatcher::new(
        "drain-demo",
        buffer,
        acker.clone(),
        Arc::new(BroadcastRouter),
        vec![writer.clone() as Arc<dyn hermod::sink_writer::DynSinkWriter>],
        16,
        Arc::new(NoopMetrics),
    ));

    let cancellation = CancellationToken::new();
    let run_cancellation = cancellation.clone();
    // 10 messages at 50ms/each through a single shard need ~500ms; give the drain generous room.
    let drain_handle = tokio::spawn(dispatcher.run(run_cancellation, Duration::from_millis(900)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancellation.cancel();

    drain_handle.await.unwrap();
    sink_cancellation.cancel();
    sink_run_handle.await.unwrap();

    let acked = acker.acked.lock().unwrap();
    assert_eq!(acked.len(), 10, "every produced message should be acked by the time the drain completes");
    for i in 0..10 {
        assert!(acked.contains(&format!("{i:02}")), "message {i:02} missing from acked set");
    }
}
