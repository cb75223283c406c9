//! A sink that fails twice then succeeds is delivered after the configured retry schedule
//! elapses, with exactly one successful write recorded.

use async_trait::async_trait;
use hermod::prelude::*;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct FlakyError;

impl fmt::Display for FlakyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flaky failure")
    }
}
impl std::error::Error for FlakyError {}

struct FlakySink {
    attempts: AtomicUsize,
    successes: AtomicUsize,
}

#[async_trait]
impl Sink for FlakySink {
    type Error = FlakyError;

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
impl BatchSink for FlakySink {
    async fn write_batch(&self, _messages: &[Message]) -> Result<(), Self::Error> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < 2 {
            return Err(FlakyError);
        }
        self.successes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn retry_delivers_on_third_attempt_after_the_backoff_schedule() {
    let sink = Arc::new(FlakySink { attempts: AtomicUsize::new(0), successes: AtomicUsize::new(0) });
    let config = SinkConfig {
        max_retries: 3,
        retry_interval: Duration::from_millis(10),
        batch_size: 1,
        ..Default::default()
    };
    let writer = Arc::new(SinkWriter::new("flaky", sink.clone(), config, Arc::new(NoopMetrics), None, None));

    let cancellation = CancellationToken::new();
    let run_handle = tokio::spawn(writer.clone().run(cancellation.clone()));

    let start = Instant::now();
    let done = writer.enqueue(Message { id: "1".into(), ..Default::default() }).await;
    let outcome = done.await.unwrap();
    let elapsed = start.elapsed();

    cancellation.cancel();
    run_handle.await.unwrap();

    assert!(matches!(outcome, WriteOutcome::Delivered));
    assert_eq!(sink.successes.load(Ordering::SeqCst), 1);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    assert!(elapsed >= Duration::from_millis(30), "expected at least 10+20ms of backoff, got {elapsed:?}");
}
