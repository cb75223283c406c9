//! Pulls messages from a source, transforms and produces them into the buffer (§4.1).

use crate::config::SourceConfig;
use crate::contract::{Producer, Source, Transformer};
use crate::observability::Metrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

/// `true` while the source is healthy and has read at least once since the last reconnect.
#[derive(Debug, Default)]
pub struct SourceHealth {
    reconnecting: AtomicBool,
}

impl SourceHealth {
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::Acquire)
    }

    fn set(&self, reconnecting: bool) {
        self.reconnecting.store(reconnecting, Ordering::Release);
    }
}

/// Drives one source: ping-gated reconnect loop, read, transform, produce.
pub struct SourceWorker<S: Source> {
    source_id: String,
    source: Arc<S>,
    transformer: Option<Arc<dyn Transformer>>,
    buffer: Arc<dyn Producer>,
    config: SourceConfig,
    status_interval: Duration,
    metrics: Arc<dyn Metrics>,
    health: Arc<SourceHealth>,
    last_activity: Mutex<Option<Instant>>,
    cancellation: CancellationToken,
}

impl<S> SourceWorker<S>
where
    S: Source + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_id: impl Into<String>,
        source: Arc<S>,
        transformer: Option<Arc<dyn Transformer>>,
        buffer: Arc<dyn Producer>,
        config: SourceConfig,
        status_interval: Duration,
        metrics: Arc<dyn Metrics>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source,
            transformer,
            buffer,
            config,
            status_interval,
            metrics,
            health: Arc::new(SourceHealth::default()),
            last_activity: Mutex::new(None),
            cancellation,
        }
    }

    pub fn health(&self) -> Arc<SourceHealth> {
        self.health.clone()
    }

    /// Whether a liveness check is due: currently reconnecting, no prior activity, or the
    /// last activity is older than `status_interval`.
    fn liveness_check_due(&self) -> bool {
        if self.health.is_reconnecting() {
            return true;
        }
        match *self.last_activity.lock().unwrap_or_else(|p| p.into_inner()) {
            None => true,
            Some(last) => last.elapsed() >= self.status_interval,
        }
    }

    /// Prefers the cheaper [`IsReady`](crate::contract::IsReady) probe when the driver
    /// implements it, falling back to `ping`.
    async fn check_alive(&self) -> Result<(), String> {
        match self.source.as_ready_checker() {
            Some(checker) => {
                if checker.is_ready().await {
                    Ok(())
                } else {
                    Err("not ready".to_string())
                }
            }
            None => self.source.ping().await.map_err(|e| e.to_string()),
        }
    }

    /// Runs until cancelled. Reconnects on ping/read failure with the configured backoff
    /// schedule; a transformer returning `None` silently drops the message.
    #[instrument(skip(self), fields(source_id = %self.source_id))]
    pub async fn run(&self) {
        let mut attempt: usize = 0;

        loop {
            if self.cancellation.is_cancelled() {
                return;
            }

            if self.liveness_check_due() {
                if let Err(e) = self.check_alive().await {
                    warn!(error = %e, attempt, "source liveness check failed, reconnecting");
                    self.health.set(true);
                    let delay = self.config.reconnect_delay(attempt);
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => continue,
                        _ = self.cancellation.cancelled() => return,
                    }
                }
                attempt = 0;
                self.health.set(false);
            }
            *self.last_activity.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());

            let read_result = tokio::select! {
                r = self.source.read() => r,
                _ = self.cancellation.cancelled() => return,
            };

            let message = match read_result {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "source read failed, reconnecting");
                    self.metrics.message_errors_total(&self.source_id);
                    self.health.set(true);
                    continue;
                }
            };

            let message = match &self.transformer {
                Some(t) => match t.transform(message) {
                    Some(m) => m,
                    None => continue,
                },
                None => message,
            };

            if let Err(e) = self.buffer.produce(message).await {
                warn!(error = %e, "buffer produce failed");
                self.metrics.message_errors_total(&self.source_id);
                continue;
            }
            self.metrics.messages_processed_total(&self.source_id);
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::BufferError;
    use crate::message::Message;
    use crate::observability::NoopMetrics;
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);
    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for TestError {}

    struct QueueSource {
        queue: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl Source for QueueSource {
        type Error = TestError;
        async fn read(&self) -> Result<Option<Message>, Self::Error> {
            Ok(self.queue.lock().unwrap().pop())
        }
        async fn ack(&self, _message: &Message) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn ping(&self) -> Result<(), Self::Error> {
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct RecordingBuffer {
        produced: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Producer for RecordingBuffer {
        async fn produce(&self, message: Message) -> Result<(), BufferError> {
            self.produced.lock().unwrap().push(message.id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn produces_every_read_message() {
        let source = Arc::new(QueueSource {
            queue: Mutex::new(vec![
                Message { id: "2".into(), ..Default::default() },
                Message { id: "1".into(), ..Default::default() },
            ]),
        });
        let buffer = Arc::new(RecordingBuffer { produced: Mutex::new(Vec::new()) });
        let cancellation = CancellationToken::new();
        let worker = SourceWorker::new(
            "src1",
            source,
            None,
            buffer.clone(),
            SourceConfig::default(),
            Duration::from_secs(10),
            Arc::new(NoopMetrics),
            cancellation.clone(),
        );

        let handle = tokio::spawn(async move { worker.run().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancellation.cancel();
        let _ = handle.await;

        let produced = buffer.produced.lock().unwrap().clone();
        assert_eq!(produced, vec!["1".to_string(), "2".to_string()]);
    }

    struct IdleSource {
        ping_calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Source for IdleSource {
        type Error = TestError;
        async fn read(&self) -> Result<Option<Message>, Self::Error> {
            Ok(None)
        }
        async fn ack(&self, _message: &Message) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn ping(&self) -> Result<(), Self::Error> {
            self.ping_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[tokio::test]
    async fn ping_is_not_repeated_inside_the_status_interval() {
        let source = Arc::new(IdleSource { ping_calls: std::sync::atomic::AtomicUsize::new(0) });
        let buffer = Arc::new(RecordingBuffer { produced: Mutex::new(Vec::new()) });
        let cancellation = CancellationToken::new();
        let worker = SourceWorker::new(
            "idle",
            source.clone(),
            None,
            buffer,
            SourceConfig::default(),
            Duration::from_secs(60),
            Arc::new(NoopMetrics),
            cancellation.clone(),
        );

        let handle = tokio::spawn(async move { worker.run().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancellation.cancel();
        let _ = handle.await;

        assert_eq!(
            source.ping_calls.load(Ordering::SeqCst),
            1,
            "a healthy source inside its status interval should only be pinged once"
        );
    }

    struct NeverReadySource {
        is_ready_calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Source for NeverReadySource {
        type Error = TestError;
        async fn read(&self) -> Result<Option<Message>, Self::Error> {
            Ok(Some(Message { id: "should-not-be-read".into(), ..Default::default() }))
        }
        async fn ack(&self, _message: &Message) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn ping(&self) -> Result<(), Self::Error> {
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_ready_checker(&self) -> Option<&dyn crate::contract::IsReady> {
            Some(self)
        }
    }

    #[async_trait]
    impl crate::contract::IsReady for NeverReadySource {
        async fn is_ready(&self) -> bool {
            self.is_ready_calls.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    #[tokio::test]
    async fn is_ready_takes_precedence_over_ping_and_blocks_reads() {
        let source = Arc::new(NeverReadySource { is_ready_calls: std::sync::atomic::AtomicUsize::new(0) });
        let buffer = Arc::new(RecordingBuffer { produced: Mutex::new(Vec::new()) });
        let cancellation = CancellationToken::new();
        let worker = SourceWorker::new(
            "never-ready",
            source.clone(),
            None,
            buffer.clone(),
            SourceConfig { reconnect_intervals: vec![Duration::from_millis(5)] },
            Duration::from_secs(60),
            Arc::new(NoopMetrics),
            cancellation.clone(),
        );
        let health = worker.health();

        let handle = tokio::spawn(async move { worker.run().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancellation.cancel();
        let _ = handle.await;

        assert!(source.is_ready_calls.load(Ordering::SeqCst) > 0, "is_ready should be preferred over ping");
        assert!(health.is_reconnecting(), "a source that never reports ready should stay in reconnecting state");
        assert!(buffer.produced.lock().unwrap().is_empty(), "no read should happen while never ready");
    }
}
