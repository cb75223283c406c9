//! The `Engine`: pre-flight, lifecycle wiring, status machine, and graceful shutdown (§4.1).

use crate::buffer::{CombinedBuffer, Compression};
use crate::config::{EngineConfig, SourceConfig};
use crate::contract::{BatchSink, Producer, Router, Sink, Source, Transformer};
use crate::engine::dispatcher::{Acker, Dispatcher, SourceAcker};
use crate::engine::source_worker::SourceWorker;
use crate::hermod_error::HermodError;
use crate::observability::{EngineStatus, Metrics, SourceStatus, StatusUpdate};
use crate::sink_writer::{spawn_sink_writer, DynSinkWriter, SinkWriter};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pre-flight/status liveness probe for a type-erased sink, since [`DynSinkWriter`] doesn't
/// carry the underlying driver's `ping`.
#[async_trait]
pub trait PreflightSink: Send + Sync {
    fn sink_id(&self) -> &str;
    async fn ping(&self) -> Result<(), String>;
}

struct SinkPreflightAdapter<T: Sink> {
    sink_id: String,
    sink: Arc<T>,
}

#[async_trait]
impl<T: Sink + 'static> PreflightSink for SinkPreflightAdapter<T> {
    fn sink_id(&self) -> &str {
        &self.sink_id
    }

    async fn ping(&self) -> Result<(), String> {
        self.sink.ping().await.map_err(|e| e.to_string())
    }
}

/// Everything the orchestrator needs to run one configured sink: its type-erased enqueue
/// surface, its pre-flight probe, its run-loop cancellation, and the join handle for that
/// loop so shutdown can wait for a final flush.
pub struct SinkHandle {
    writer: Arc<dyn DynSinkWriter>,
    preflight: Arc<dyn PreflightSink>,
    cancellation: CancellationToken,
    join: JoinHandle<()>,
}

/// Spawns `writer`'s run loop and bundles it with a pre-flight probe over its underlying
/// driver, ready to hand to [`Engine::new`]. `T` need only implement [`Sink`] — the writer
/// uses `T`'s `BatchSink` capability when present and falls back to sequential writes when it
/// isn't.
pub fn register_sink<T>(sink: Arc<T>, writer: Arc<SinkWriter<T>>, cancellation: CancellationToken) -> SinkHandle
where
    T: Sink + 'static,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    let preflight = Arc::new(SinkPreflightAdapter { sink_id: writer.sink_id().to_string(), sink });
    let (dyn_writer, join) = spawn_sink_writer(writer, cancellation.clone());
    SinkHandle { writer: dyn_writer, preflight, cancellation, join }
}

/// Brings a source and its sinks to a healthy state, streams messages through the buffer,
/// publishes live status, and drains cleanly on cancellation.
pub struct Engine<S: Source> {
    workflow_id: String,
    config: EngineConfig,
    source: Arc<S>,
    source_worker: Arc<SourceWorker<S>>,
    buffer: Arc<CombinedBuffer>,
    dispatcher: Arc<Dispatcher<CombinedBuffer>>,
    writers: Vec<Arc<dyn DynSinkWriter>>,
    preflight_sinks: Vec<Arc<dyn PreflightSink>>,
    sink_joins: Mutex<Vec<JoinHandle<()>>>,
    sink_cancellations: Vec<CancellationToken>,
    status_tx: tokio::sync::mpsc::Sender<StatusUpdate>,
    status_rx: Mutex<Option<tokio::sync::mpsc::Receiver<StatusUpdate>>>,
    metrics: Arc<dyn Metrics>,
}

impl<S> Engine<S>
where
    S: Source + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workflow_id: impl Into<String>,
        config: EngineConfig,
        source: Arc<S>,
        transformer: Option<Arc<dyn Transformer>>,
        source_config: SourceConfig,
        buffer_dir: impl AsRef<Path>,
        compression: Option<Compression>,
        router: Arc<dyn Router>,
        sinks: Vec<SinkHandle>,
        metrics: Arc<dyn Metrics>,
        source_cancellation: CancellationToken,
    ) -> Result<Self, HermodError<S::Error>> {
        let workflow_id = workflow_id.into();
        let buffer = Arc::new(
            CombinedBuffer::new(
                buffer_dir,
                config.ring_capacity,
                config.spill_high_pct,
                config.produce_timeout,
                compression,
                config.file_buffer_bound,
            )
            .map_err(|e| HermodError::Unexpected(e.to_string()))?,
        );

        let acker: Arc<dyn Acker> = Arc::new(SourceAcker::new(source.clone()));
        let source_worker = Arc::new(SourceWorker::new(
            workflow_id.clone(),
            source.clone(),
            transformer,
            buffer.clone() as Arc<dyn Producer>,
            source_config,
            config.status_interval,
            metrics.clone(),
            source_cancellation,
        ));

        let writers: Vec<Arc<dyn DynSinkWriter>> = sinks.iter().map(|h| h.writer.clone()).collect();
        let preflight_sinks: Vec<Arc<dyn PreflightSink>> = sinks.iter().map(|h| h.preflight.clone()).collect();
        let sink_cancellations: Vec<CancellationToken> = sinks.iter().map(|h| h.cancellation.clone()).collect();
        let sink_joins = Mutex::new(sinks.into_iter().map(|h| h.join).collect());

        let dispatcher = Arc::new(Dispatcher::new(
            workflow_id.clone(),
            buffer.clone(),
            acker,
            router,
            writers.clone(),
            config.max_in_flight,
            metrics.clone(),
        ));
        let (status_tx, status_rx) = tokio::sync::mpsc::channel(config.status_channel_capacity.max(1));

        Ok(Self {
            workflow_id,
            config,
            source,
            source_worker,
            buffer,
            dispatcher,
            writers,
            preflight_sinks,
            sink_joins,
            sink_cancellations,
            status_tx,
            status_rx: Mutex::new(Some(status_rx)),
            metrics,
        })
    }

    /// Returns the status-update receiver. Only the first call gets `Some`; the channel has a
    /// single observer, matching a bounded status feed drained by one subscriber.
    pub fn subscribe_status(&self) -> Option<tokio::sync::mpsc::Receiver<StatusUpdate>> {
        self.status_rx.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    /// Pings the source and every sink up to 3 times, 100ms apart. Any still failing aborts
    /// startup entirely rather than running with a half-healthy pipeline.
    async fn preflight(&self) -> Result<(), HermodError<S::Error>> {
        self.ping_with_retries("source", || async { self.source.ping().await.map_err(|e| e.to_string()) })
            .await
            .map_err(|_| HermodError::PreflightFailed { sink_id: "source".to_string() })?;

        for sink in &self.preflight_sinks {
            let sink_id = sink.sink_id().to_string();
            self.ping_with_retries(&sink_id, || async { sink.ping().await })
                .await
                .map_err(|_| HermodError::PreflightFailed { sink_id: sink_id.clone() })?;
        }
        Ok(())
    }

    async fn ping_with_retries<F, Fut>(&self, label: &str, mut ping: F) -> Result<(), ()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(), String>>,
    {
        for attempt in 0..3 {
            match ping().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(target = %label, attempt, error = %e, "pre-flight ping failed");
                    if attempt < 2 {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
        Err(())
    }

    /// Runs the full pipeline until `cancellation` fires, then drains and shuts down.
    pub async fn run(self: Arc<Self>, cancellation: CancellationToken) -> Result<(), HermodError<S::Error>> {
        self.preflight().await?;
        self.send_status(EngineStatus::Starting).await;
        info!(workflow_id = %self.workflow_id, "engine starting");

        let source_handle: JoinHandle<()> = {
            let worker = self.source_worker.clone();
            tokio::spawn(async move { worker.run().await })
        };
        let dispatcher_handle =
            tokio::spawn(self.dispatcher.clone().run(cancellation.clone(), self.config.drain_timeout));
        let status_handle = tokio::spawn(self.clone().run_status_loop(cancellation.clone()));

        self.send_status(self.engine_status()).await;
        cancellation.cancelled().await;

        info!(workflow_id = %self.workflow_id, "draining");
        self.send_status(EngineStatus::Draining).await;

        let _ = source_handle.await;
        let _ = Producer::close(self.buffer.as_ref()).await;
        let _ = dispatcher_handle.await;

        for token in &self.sink_cancellations {
            token.cancel();
        }
        let joins = std::mem::take(&mut *self.sink_joins.lock().unwrap_or_else(|p| p.into_inner()));
        for join in joins {
            let _ = join.await;
        }

        status_handle.abort();
        self.send_status(EngineStatus::Stopped).await;
        info!(workflow_id = %self.workflow_id, "engine stopped");
        Ok(())
    }

    async fn run_status_loop(self: Arc<Self>, cancellation: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.status_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => self.send_status(self.engine_status()).await,
                _ = cancellation.cancelled() => return,
            }
        }
    }

    /// `running` if the source and every sink are healthy, else `reconnecting:<offender>` for
    /// the first unhealthy source/sink found (source checked first).
    fn engine_status(&self) -> EngineStatus {
        if self.source_worker.health().is_reconnecting() {
            return EngineStatus::Reconnecting { offender: "source".to_string() };
        }
        for writer in &self.writers {
            let status = writer.status();
            if status.circuit_open {
                return EngineStatus::Reconnecting { offender: format!("sink:{}", status.sink_id) };
            }
        }
        EngineStatus::Running
    }

    async fn send_status(&self, engine_status: EngineStatus) {
        let health = self.source_worker.health();
        let update = StatusUpdate {
            engine_status,
            sources: vec![SourceStatus {
                source_id: self.source_worker.source_id().to_string(),
                connected: !health.is_reconnecting(),
                last_error: None,
                messages_read: 0,
            }],
            sinks: self.writers.iter().map(|w| w.status()).collect(),
            ring_depth: self.buffer.ring_len(),
            file_buffer_depth: self.buffer.file_record_count(),
            extra: Default::default(),
        };
        match self.status_tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(workflow_id = %self.workflow_id, "status channel full, dropping update");
            }
            Err(TrySendError::Closed(_)) => {}
        }
        self.metrics.active_total(self.writers.len() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::observability::NoopMetrics;
    use crate::sink_writer::SinkWriter;
    use async_trait::async_trait;
    use std::any::Any;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);
    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for TestError {}

    struct AlwaysUpSource;

    #[async_trait]
    impl Source for AlwaysUpSource {
        type Error = TestError;
        async fn read(&self) -> Result<Option<Message>, Self::Error> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(None)
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

    struct AlwaysUpSink;

    #[async_trait]
    impl Sink for AlwaysUpSink {
        type Error = TestError;
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
    impl BatchSink for AlwaysUpSink {
        async fn write_batch(&self, _messages: &[Message]) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn runs_preflight_and_shuts_down_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(AlwaysUpSink);
        let writer = Arc::new(SinkWriter::new(
            "sink1",
            sink.clone(),
            crate::config::SinkConfig::default(),
            Arc::new(NoopMetrics),
            None,
            None,
        ));
        let writer_cancellation = CancellationToken::new();
        let sink_handle = register_sink(sink, writer, writer_cancellation);

        let cancellation = CancellationToken::new();
        let engine = Arc::new(
            Engine::new(
                "wf1",
                crate::config::EngineConfig {
                    status_interval: Duration::from_millis(10),
                    drain_timeout: Duration::from_millis(20),
                    ..Default::default()
                },
                Arc::new(AlwaysUpSource),
                None,
                crate::config::SourceConfig::default(),
                dir.path(),
                None,
                Arc::new(crate::contract::BroadcastRouter),
                vec![sink_handle],
                Arc::new(NoopMetrics),
                cancellation.clone(),
            )
            .unwrap(),
        );
        let mut status_rx = engine.subscribe_status().unwrap();

        let handle = tokio::spawn(engine.run(cancellation.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancellation.cancel();
        handle.await.unwrap().unwrap();

        let mut saw_starting = false;
        while let Ok(update) = status_rx.try_recv() {
            if update.engine_status == EngineStatus::Starting {
                saw_starting = true;
            }
        }
        assert!(saw_starting);
    }
}
