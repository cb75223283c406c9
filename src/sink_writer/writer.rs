//! The sink writer run loop: batching, sharding, backpressure, retry, circuit breaking, DLQ (§4.2).

use crate::config::SinkConfig;
use crate::contract::{BatchSink, Producer, Sink};
use crate::error::ResilienceError;
use crate::hermod_error::{BackpressureStrategy, HermodError};
use crate::message::Message;
use crate::observability::metrics::Metrics;
use crate::observability::status::SinkState;
use crate::retry::RetryPolicy;
use crate::sink_writer::batch::{AdaptiveBatchSize, BatchAccumulator};
use crate::sink_writer::circuit::{CircuitState, WindowedCircuitBreaker};
use crate::sink_writer::shard::shard_for_key;
use crate::Backoff;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Type-erased enqueue surface so a dispatcher can hold sink writers over distinct
/// [`Sink`] implementations in one `Vec<Arc<dyn DynSinkWriter>>`.
#[async_trait]
pub trait DynSinkWriter: Send + Sync {
    fn sink_id(&self) -> &str;
    async fn enqueue(&self, message: Message) -> oneshot::Receiver<WriteOutcome>;
    fn status(&self) -> SinkState;
}

#[async_trait]
impl<S> DynSinkWriter for SinkWriter<S>
where
    S: Sink + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    fn sink_id(&self) -> &str {
        SinkWriter::sink_id(self)
    }

    async fn enqueue(&self, message: Message) -> oneshot::Receiver<WriteOutcome> {
        SinkWriter::enqueue(self, message).await
    }

    fn status(&self) -> SinkState {
        SinkWriter::status(self)
    }
}

/// The result of one `enqueue`d message, delivered through its `done` oneshot.
#[derive(Debug)]
pub enum WriteOutcome {
    /// Delivered to the sink, or exhausted-then-DLQ'd (treated as success per §4.2).
    Delivered,
    /// Rejected by a non-blocking backpressure strategy without reaching the sink.
    Dropped(BackpressureStrategy),
    /// The circuit was open; the write was never attempted.
    CircuitOpen,
    /// Retries were exhausted with no DLQ configured, or the driver failed terminally.
    Failed(String),
    /// Accepted via the `spillToDisk` strategy; not yet delivered to the sink.
    SpilledToDisk,
}

struct ShardState {
    batch: BatchAccumulator,
    dones: VecDeque<oneshot::Sender<WriteOutcome>>,
}

impl ShardState {
    fn new() -> Self {
        Self { batch: BatchAccumulator::new(), dones: VecDeque::new() }
    }

    fn len(&self) -> usize {
        self.dones.len()
    }
}

struct Shard {
    state: Mutex<ShardState>,
    notify: Notify,
}

impl Shard {
    fn new() -> Self {
        Self { state: Mutex::new(ShardState::new()), notify: Notify::new() }
    }
}

/// Drives one configured sink: batches incoming messages per shard, applies backpressure,
/// flushes through retry and a windowed circuit breaker, and routes exhausted batches to a
/// dead-letter sink. Flushes through [`Sink::as_batch_sink`] when the driver implements
/// `BatchSink`, otherwise loops [`Sink::write`] over the batch.
pub struct SinkWriter<S: Sink> {
    sink_id: String,
    sink: Arc<S>,
    config: SinkConfig,
    circuit: WindowedCircuitBreaker,
    retry: RetryPolicy<S::Error>,
    metrics: Arc<dyn Metrics>,
    dead_letter: Option<Arc<dyn Producer>>,
    spill: Option<Arc<dyn Producer>>,
    batch_size: AdaptiveBatchSize,
    shards: Vec<Shard>,
    dead_letter_total: AtomicU64,
}

impl<S> SinkWriter<S>
where
    S: Sink + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    pub fn new(
        sink_id: impl Into<String>,
        sink: Arc<S>,
        config: SinkConfig,
        metrics: Arc<dyn Metrics>,
        dead_letter: Option<Arc<dyn Producer>>,
        spill: Option<Arc<dyn Producer>>,
    ) -> Self {
        let backoff = if config.retry_intervals.is_empty() {
            Backoff::linear(config.retry_interval)
        } else {
            Backoff::schedule(config.retry_intervals.clone())
        };
        let retry = RetryPolicy::builder()
            .max_attempts(config.max_retries.max(1))
            .expect("max_retries > 0")
            .backoff(backoff)
            .build();
        let circuit = WindowedCircuitBreaker::new(
            config.circuit_breaker_threshold,
            config.circuit_breaker_interval.as_millis() as u64,
            config.circuit_breaker_cool_down.as_millis() as u64,
        );
        let shard_count = config.shard_count.max(1);
        let shards = (0..shard_count).map(|_| Shard::new()).collect();
        let batch_size = AdaptiveBatchSize::new(config.batch_size, 1, config.batch_size.max(1) * 10);

        Self {
            sink_id: sink_id.into(),
            sink,
            config,
            circuit,
            retry,
            metrics,
            dead_letter,
            spill,
            batch_size,
            shards,
            dead_letter_total: AtomicU64::new(0),
        }
    }

    pub fn sink_id(&self) -> &str {
        &self.sink_id
    }

    /// A point-in-time health snapshot for the status machine (§5).
    pub fn status(&self) -> SinkState {
        let in_flight: usize = self
            .shards
            .iter()
            .map(|s| s.state.lock().unwrap_or_else(|p| p.into_inner()).dones.len())
            .sum();
        SinkState {
            sink_id: self.sink_id.clone(),
            circuit_open: !matches!(self.circuit.state(), CircuitState::Closed),
            in_flight,
            batch_size: self.batch_size.current(),
            dead_letter_total: self.dead_letter_total.load(Ordering::Relaxed),
            last_error: None,
        }
    }

    fn shard_index(&self, message: &Message) -> usize {
        match &self.config.shard_key_meta {
            Some(meta_key) => {
                let key = message.metadata.get(meta_key).map(String::as_str).unwrap_or(&message.id);
                shard_for_key(key, self.shards.len())
            }
            None => shard_for_key(message.idempotency_key(), self.shards.len()),
        }
    }

    /// Accept a message under the configured [`BackpressureStrategy`]. Returns a receiver
    /// resolved once the message is delivered, dropped, or fails — see [`WriteOutcome`].
    pub async fn enqueue(&self, message: Message) -> oneshot::Receiver<WriteOutcome> {
        let (done_tx, done_rx) = oneshot::channel();
        let shard_index = self.shard_index(&message);

        match self.config.backpressure_strategy {
            BackpressureStrategy::Block => {
                loop {
                    if self.shard_len(shard_index) < self.config.channel_capacity {
                        break;
                    }
                    self.shards[shard_index].notify.notified().await;
                }
                self.push(shard_index, message, done_tx);
            }
            BackpressureStrategy::DropNewest => {
                if self.shard_len(shard_index) >= self.config.channel_capacity {
                    self.drop_message(done_tx, BackpressureStrategy::DropNewest);
                    return done_rx;
                }
                self.push(shard_index, message, done_tx);
            }
            BackpressureStrategy::DropOldest => {
                if self.shard_len(shard_index) >= self.config.channel_capacity {
                    self.evict_oldest(shard_index, BackpressureStrategy::DropOldest);
                }
                self.push(shard_index, message, done_tx);
            }
            BackpressureStrategy::Sampling => {
                if self.shard_len(shard_index) >= self.config.channel_capacity
                    && rand::random::<f64>() >= self.config.sampling_rate
                {
                    self.drop_message(done_tx, BackpressureStrategy::Sampling);
                    return done_rx;
                }
                self.push(shard_index, message, done_tx);
            }
            BackpressureStrategy::SpillToDisk => {
                if self.shard_len(shard_index) >= self.config.channel_capacity {
                    match &self.spill {
                        Some(spill) => {
                            let outcome = match spill.produce(message).await {
                                Ok(()) => {
                                    self.metrics.backpressure_spill_total(&self.sink_id, 1);
                                    WriteOutcome::SpilledToDisk
                                }
                                Err(e) => WriteOutcome::Failed(e.to_string()),
                            };
                            let _ = done_tx.send(outcome);
                            return done_rx;
                        }
                        None => {
                            self.drop_message(done_tx, BackpressureStrategy::SpillToDisk);
                            return done_rx;
                        }
                    }
                }
                self.push(shard_index, message, done_tx);
            }
        }

        done_rx
    }

    fn shard_len(&self, shard_index: usize) -> usize {
        self.shards[shard_index].state.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn drop_message(&self, done_tx: oneshot::Sender<WriteOutcome>, strategy: BackpressureStrategy) {
        self.metrics.backpressure_drop_total(&self.sink_id, strategy, 1);
        let _ = done_tx.send(WriteOutcome::Dropped(strategy));
    }

    fn evict_oldest(&self, shard_index: usize, strategy: BackpressureStrategy) {
        let evicted = {
            let mut state = self.shards[shard_index].state.lock().unwrap_or_else(|p| p.into_inner());
            let evicted_message = state.batch.pop_front();
            evicted_message.and(state.dones.pop_front())
        };
        if let Some(done) = evicted {
            self.drop_message(done, strategy);
        }
    }

    fn push(&self, shard_index: usize, message: Message, done_tx: oneshot::Sender<WriteOutcome>) {
        let crossed_threshold = {
            let mut state = self.shards[shard_index].state.lock().unwrap_or_else(|p| p.into_inner());
            state.batch.push(message);
            state.dones.push_back(done_tx);
            state.batch.should_flush(self.batch_size.current(), self.config.batch_bytes)
        };
        // Wake the shard's run loop early only once a size/byte threshold is actually
        // crossed; otherwise let it flush on its own `batch_timeout` tick.
        if crossed_threshold {
            self.shards[shard_index].notify.notify_waiters();
        }
    }

    /// Runs every shard's batcher concurrently until `cancellation` fires, flushing any
    /// partial batches before returning.
    pub async fn run(self: Arc<Self>, cancellation: CancellationToken) {
        let tasks = (0..self.shards.len()).map(|shard_index| {
            let this = self.clone();
            let cancellation = cancellation.clone();
            this.run_shard(shard_index, cancellation)
        });
        futures::future::join_all(tasks).await;
    }
}

/// Spawns a sink writer's run loop and hands back a type-erased handle alongside the
/// join handle, so an orchestrator can hold a `Vec<Arc<dyn DynSinkWriter>>` without being
/// generic over every concrete sink type.
pub fn spawn_sink_writer<S>(
    writer: Arc<SinkWriter<S>>,
    cancellation: CancellationToken,
) -> (Arc<dyn DynSinkWriter>, tokio::task::JoinHandle<()>)
where
    S: Sink + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let handle = tokio::spawn(writer.clone().run(cancellation));
    (writer as Arc<dyn DynSinkWriter>, handle)
}

impl<S> SinkWriter<S>
where
    S: Sink + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{

    async fn run_shard(self: Arc<Self>, shard_index: usize, cancellation: CancellationToken) {
        loop {
            tokio::select! {
                _ = self.shards[shard_index].notify.notified() => {}
                _ = tokio::time::sleep(self.config.batch_timeout) => {}
                _ = cancellation.cancelled() => {
                    self.flush_shard(shard_index).await;
                    return;
                }
            }
            self.flush_shard(shard_index).await;
        }
    }

    async fn flush_shard(&self, shard_index: usize) {
        let taken = {
            let mut state = self.shards[shard_index].state.lock().unwrap_or_else(|p| p.into_inner());
            if state.batch.is_empty() {
                None
            } else {
                Some((state.batch.take(), std::mem::take(&mut state.dones)))
            }
        };
        let Some((messages, dones)) = taken else { return };
        self.shards[shard_index].notify.notify_waiters();

        let result = self.flush_batch(messages).await;
        let outcome_for_all = |result: &Result<(), HermodError<S::Error>>| match result {
            Ok(()) => WriteOutcome::Delivered,
            Err(HermodError::CircuitOpen { .. }) => WriteOutcome::CircuitOpen,
            Err(HermodError::RetryExhausted { .. }) if self.dead_letter.is_some() => WriteOutcome::Delivered,
            Err(HermodError::RetryExhausted { .. }) => WriteOutcome::Failed("retry exhausted".to_string()),
            Err(HermodError::Driver(e)) => WriteOutcome::Failed(e.to_string()),
            Err(other) => WriteOutcome::Failed(other.to_string()),
        };
        for done in dones {
            let _ = done.send(outcome_for_all(&result));
        }
    }

    /// Flush one batch through retry + circuit breaker, routing to the DLQ on exhaustion.
    async fn flush_batch(&self, messages: Vec<Message>) -> Result<(), HermodError<S::Error>> {
        if messages.is_empty() {
            return Ok(());
        }
        if !self.circuit.allow_attempt() {
            self.metrics.circuit_breaker_open(&self.sink_id, true);
            return Err(HermodError::CircuitOpen { sink_id: self.sink_id.clone() });
        }

        let start = Instant::now();
        let sink = self.sink.clone();
        let attempt_messages = messages.clone();
        let result = self
            .retry
            .execute(move || {
                let sink = sink.clone();
                let messages = attempt_messages.clone();
                async move {
                    match sink.as_batch_sink() {
                        Some(batch) => batch.write_batch(&messages).await.map_err(ResilienceError::Inner),
                        None => {
                            for message in &messages {
                                sink.write(message).await.map_err(ResilienceError::Inner)?;
                            }
                            Ok(())
                        }
                    }
                }
            })
            .await;

        let elapsed = start.elapsed();
        self.batch_size.record_flush(elapsed, self.config.batch_timeout);
        self.metrics.processing_duration_seconds(&self.sink_id, elapsed.as_secs_f64());

        match result {
            Ok(()) => {
                self.circuit.record_success();
                self.metrics.circuit_breaker_open(&self.sink_id, false);
                self.metrics.sink_writes_total(&self.sink_id, messages.len() as u64);
                Ok(())
            }
            Err(ResilienceError::RetryExhausted { attempts, .. }) => {
                self.circuit.record_failure();
                self.metrics.sink_write_errors_total(&self.sink_id);
                warn!(sink_id = %self.sink_id, attempts, "retry exhausted, routing to dead letter");
                self.route_to_dead_letter(messages).await;
                Err(HermodError::RetryExhausted { sink_id: self.sink_id.clone(), attempts })
            }
            Err(ResilienceError::Inner(e)) => {
                self.circuit.record_failure();
                self.metrics.sink_write_errors_total(&self.sink_id);
                Err(HermodError::Driver(e))
            }
            Err(other) => {
                self.circuit.record_failure();
                self.metrics.sink_write_errors_total(&self.sink_id);
                Err(HermodError::Unexpected(other.to_string()))
            }
        }
    }

    async fn route_to_dead_letter(&self, messages: Vec<Message>) {
        let Some(dlq) = &self.dead_letter else { return };
        let count = messages.len() as u64;
        for message in messages {
            if let Err(e) = dlq.produce(message).await {
                debug!(sink_id = %self.sink_id, error = %e, "dead letter produce failed");
            }
        }
        self.metrics.dead_letter_total(&self.sink_id, count);
        self.dead_letter_total.fetch_add(count, Ordering::Relaxed);
    }
}
