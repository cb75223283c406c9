//! Drains the buffer and routes messages into sink writers under a bounded in-flight cap (§4.1).

use crate::contract::{BufferError, Consumer, Router};
use crate::message::Message;
use crate::observability::Metrics;
use crate::sink_writer::{DynSinkWriter, WriteOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const IDLE_POLL: Duration = Duration::from_millis(5);

/// Acknowledges a delivered message back to whichever source produced it. A thin seam so the
/// dispatcher doesn't need to know the source's concrete driver type.
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self, message: &Message);
}

/// Adapts any [`crate::contract::Source`] into an [`Acker`], logging (not propagating) ack
/// failures — a failed ack just means the source redelivers on reconnect (at-least-once).
pub struct SourceAcker<S: crate::contract::Source> {
    source: Arc<S>,
}

impl<S: crate::contract::Source> SourceAcker<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S> Acker for SourceAcker<S>
where
    S: crate::contract::Source + 'static,
{
    async fn ack(&self, message: &Message) {
        if let Err(e) = self.source.ack(message).await {
            warn!(error = %e, "source ack failed");
        }
    }
}

/// Consumes `buffer`, routes each message to its target sink writers, and acks the source
/// only once every routed write is delivered.
pub struct Dispatcher<B: Consumer> {
    buffer: Arc<B>,
    acker: Arc<dyn Acker>,
    router: Arc<dyn Router>,
    sinks: Vec<Arc<dyn DynSinkWriter>>,
    semaphore: Arc<Semaphore>,
    metrics: Arc<dyn Metrics>,
    workflow_id: String,
}

impl<B> Dispatcher<B>
where
    B: Consumer + 'static,
{
    pub fn new(
        workflow_id: impl Into<String>,
        buffer: Arc<B>,
        acker: Arc<dyn Acker>,
        router: Arc<dyn Router>,
        sinks: Vec<Arc<dyn DynSinkWriter>>,
        max_in_flight: usize,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        Self {
            buffer,
            acker,
            router,
            sinks,
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
            metrics,
            workflow_id: workflow_id.into(),
        }
    }

    /// Drains the buffer until cancelled, sleeping briefly whenever both the buffer and the
    /// in-flight cap leave nothing to do. On cancellation, keeps consuming for up to
    /// `drain_timeout` so messages already sitting in the buffer still get dispatched.
    pub async fn run(self: Arc<Self>, cancellation: CancellationToken, drain_timeout: Duration) {
        loop {
            if cancellation.is_cancelled() {
                break;
            }

            self.consume_once().await;

            tokio::select! {
                _ = tokio::time::sleep(IDLE_POLL) => {}
                _ = cancellation.cancelled() => break,
            }
        }

        let deadline = tokio::time::Instant::now() + drain_timeout;
        while tokio::time::Instant::now() < deadline {
            self.consume_once().await;
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    async fn consume_once(self: &Arc<Self>) {
        let this = self.clone();
        let result = self.buffer.consume(move |message| this.clone().try_dispatch(message)).await;

        if let Err(e) = result {
            debug!(workflow_id = %self.workflow_id, error = %e, "consume pass ended early");
        }
    }

    /// Synchronous handler body for [`Consumer::consume`]: claims an in-flight permit and
    /// spawns the async routing/write/ack work, or signals backpressure if none are free.
    fn try_dispatch(self: Arc<Self>, message: Message) -> Result<(), BufferError> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                tokio::spawn(async move {
                    self.process(message).await;
                    drop(permit);
                });
                Ok(())
            }
            Err(_) => Err(BufferError::HandlerFailed { reason: "max in-flight reached".to_string() }),
        }
    }

    async fn process(&self, message: Message) {
        let start = Instant::now();
        let routed = self.router.route(&message, self.sinks.len());

        let mut receivers = Vec::with_capacity(routed.len());
        for entry in routed {
            let Some(sink) = self.sinks.get(entry.sink_index) else { continue };
            receivers.push((sink.sink_id().to_string(), sink.enqueue(entry.message).await));
        }

        let mut all_delivered = true;
        for (sink_id, rx) in receivers {
            match rx.await {
                Ok(WriteOutcome::Delivered) | Ok(WriteOutcome::SpilledToDisk) => {}
                Ok(WriteOutcome::Dropped(strategy)) => {
                    all_delivered = false;
                    self.metrics.backpressure_drop_total(&sink_id, strategy, 1);
                }
                Ok(WriteOutcome::CircuitOpen) => {
                    all_delivered = false;
                    warn!(sink_id = %sink_id, "write skipped: circuit open");
                }
                Ok(WriteOutcome::Failed(reason)) => {
                    all_delivered = false;
                    warn!(sink_id = %sink_id, reason = %reason, "write failed");
                }
                Err(_) => {
                    all_delivered = false;
                    warn!(sink_id = %sink_id, "writer dropped the response channel");
                }
            }
        }

        if all_delivered {
            self.acker.ack(&message).await;
            self.metrics.messages_processed_total(&self.workflow_id);
        } else {
            self.metrics.message_errors_total(&self.workflow_id);
        }
        self.metrics.processing_duration_seconds(&self.workflow_id, start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{BroadcastRouter, RoutedMessage};
    use crate::observability::NoopMetrics;
    use crate::sink_writer::writer::WriteOutcome as Outcome;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    struct RecordingAcker {
        acked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Acker for RecordingAcker {
        async fn ack(&self, message: &Message) {
            self.acked.lock().unwrap().push(message.id.clone());
        }
    }

    struct FakeConsumer {
        messages: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl Consumer for FakeConsumer {
        async fn consume<H>(&self, handler: H) -> Result<(), BufferError>
        where
            H: Fn(Message) -> Result<(), BufferError> + Send + Sync,
        {
            let mut queue = self.messages.lock().unwrap();
            while let Some(m) = queue.pop() {
                handler(m)?;
            }
            Ok(())
        }

        async fn close(&self) -> Result<(), BufferError> {
            Ok(())
        }
    }

    struct AlwaysDeliversSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DynSinkWriter for AlwaysDeliversSink {
        fn sink_id(&self) -> &str {
            "fake-sink"
        }

        async fn enqueue(&self, _message: Message) -> oneshot::Receiver<WriteOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(Outcome::Delivered);
            rx
        }

        fn status(&self) -> crate::observability::SinkState {
            crate::observability::SinkState {
                sink_id: "fake-sink".into(),
                circuit_open: false,
                in_flight: 0,
                batch_size: 0,
                dead_letter_total: 0,
                last_error: None,
            }
        }
    }

    #[tokio::test]
    async fn acks_once_every_routed_sink_delivers() {
        let buffer = Arc::new(FakeConsumer {
            messages: Mutex::new(vec![Message { id: "1".into(), ..Default::default() }]),
        });
        let acker = Arc::new(RecordingAcker { acked: Mutex::new(Vec::new()) });
        let sink = Arc::new(AlwaysDeliversSink { calls: AtomicUsize::new(0) });
        let dispatcher = Arc::new(Dispatcher::new(
            "wf1",
            buffer,
            acker.clone(),
            Arc::new(BroadcastRouter),
            vec![sink.clone() as Arc<dyn DynSinkWriter>],
            10,
            Arc::new(NoopMetrics),
        ));

        let cancellation = CancellationToken::new();
        let handle =
            tokio::spawn(dispatcher.clone().run(cancellation.clone(), Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancellation.cancel();
        let _ = handle.await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(acker.acked.lock().unwrap().as_slice(), ["1"]);
    }

    #[test]
    fn broadcast_router_routes_to_every_sink_index() {
        let router = BroadcastRouter;
        let routed: Vec<RoutedMessage> = router.route(&Message { id: "x".into(), ..Default::default() }, 2);
        assert_eq!(routed.len(), 2);
    }
}
