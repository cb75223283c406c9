//! Capability contracts for sources, sinks, and buffers.
//!
//! Duck-typed capabilities in the distilled design (`BatchSink`, `ReadyChecker`, `Stateful`,
//! `Transactional`) become explicit traits here. `Source`/`Sink` carry `as_any()` for
//! downcasting to a concrete driver when the caller already knows its type (e.g. `Stateful`),
//! plus dedicated `as_ready_checker`/`as_batch_sink` query hooks for the two capabilities
//! generic pipeline code needs to probe without knowing the concrete driver type — `Any` can
//! only recover a concrete type, never a trait object, so those two go through a provided
//! method instead of a downcast.

use crate::message::Message;
use async_trait::async_trait;
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;

/// A source of messages: the engine's upstream collaborator.
#[async_trait]
pub trait Source: Send + Sync {
    type Error: StdError + Send + Sync + 'static;

    /// Read one message. `Ok(None)` means "idle, keep polling" — not an error.
    async fn read(&self) -> Result<Option<Message>, Self::Error>;

    /// Acknowledge successful downstream delivery of a previously-read message.
    async fn ack(&self, message: &Message) -> Result<(), Self::Error>;

    /// Liveness check used by pre-flight and the status machine.
    async fn ping(&self) -> Result<(), Self::Error>;

    /// Capability query hook; override to support downcasting to `Stateful`/`Transactional`
    /// extensions from generic code that only holds a `dyn Source`.
    fn as_any(&self) -> &dyn Any;

    /// Returns `Some` when the driver also implements [`IsReady`]; overriding this is how a
    /// driver opts into the cheaper probe in place of `ping` for reconnect/status checks.
    /// `Any`-downcasting can't recover a trait object (only a concrete type), so this is the
    /// vtable equivalent for that one capability.
    fn as_ready_checker(&self) -> Option<&dyn IsReady> {
        None
    }
}

/// Optional faster-than-`ping` readiness probe a [`Source`] may implement.
#[async_trait]
pub trait IsReady: Send + Sync {
    async fn is_ready(&self) -> bool;
}

/// A destination for messages.
#[async_trait]
pub trait Sink: Send + Sync {
    type Error: StdError + Send + Sync + 'static;

    async fn write(&self, message: &Message) -> Result<(), Self::Error>;

    async fn ping(&self) -> Result<(), Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn as_any(&self) -> &dyn Any;

    /// Returns `Some` when the driver also implements [`BatchSink`]; overriding this is how a
    /// driver opts into batched delivery. Left unimplemented, a sink writer falls back to
    /// looping [`Sink::write`] over the batch.
    fn as_batch_sink(&self) -> Option<&dyn BatchSink<Error = Self::Error>> {
        None
    }
}

/// Optional batch-write capability; sink writers use this for batches of size > 1 when
/// present, falling back to sequential [`Sink::write`] otherwise.
#[async_trait]
pub trait BatchSink: Sink {
    async fn write_batch(&self, messages: &[Message]) -> Result<(), Self::Error>;
}

/// Optional idempotency reporting hook for metrics (`idempotency_*`).
pub trait LastWriteIdempotent {
    /// `(deduplicated, conflicted)` for the most recent write.
    fn last_write_idempotent(&self) -> (bool, bool);
}

/// Optional state checkpoint/restore hook for sources that can persist offsets externally.
#[async_trait]
pub trait Stateful: Send + Sync {
    async fn get_state(&self) -> Result<Vec<u8>, Box<dyn StdError + Send + Sync>>;
    async fn set_state(&self, state: &[u8]) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

/// Optional transactional hook for sources whose reads participate in a transaction.
#[async_trait]
pub trait Transactional: Send + Sync {
    async fn begin(&self) -> Result<(), Box<dyn StdError + Send + Sync>>;
    async fn commit(&self) -> Result<(), Box<dyn StdError + Send + Sync>>;
    async fn rollback(&self) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

/// Optional structured-logging hook a driver can implement to contribute log fields.
pub trait Loggable {
    fn log_fields(&self) -> Vec<(&'static str, String)>;
}

/// Errors from the buffer layer itself (not a driver's errors).
#[derive(Debug)]
pub enum BufferError {
    /// The buffer is closed; no further `Produce` calls are accepted.
    Closed,
    /// The on-disk log is corrupt: bad magic, truncated frame, or failed decompression.
    Corrupt { reason: String },
    /// The handler passed to `Consume` returned an error, halting the consumer.
    HandlerFailed { reason: String },
    /// An underlying I/O error from the file tier.
    Io(String),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::Closed => write!(f, "buffer closed"),
            BufferError::Corrupt { reason } => write!(f, "buffer corrupt: {}", reason),
            BufferError::HandlerFailed { reason } => write!(f, "handler failed: {}", reason),
            BufferError::Io(msg) => write!(f, "buffer io error: {}", msg),
        }
    }
}

impl std::error::Error for BufferError {}

/// The producing half of a two-tier buffer.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(&self, message: Message) -> Result<(), BufferError>;
}

/// The consuming half of a two-tier buffer. `handler` returning an error halts the consumer.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn consume<H>(&self, handler: H) -> Result<(), BufferError>
    where
        H: Fn(Message) -> Result<(), BufferError> + Send + Sync;

    async fn close(&self) -> Result<(), BufferError>;
}

/// One routed destination for a message, produced by a [`Router`].
pub struct RoutedMessage {
    pub sink_index: usize,
    pub message: Message,
}

/// Derives per-sink routing for a message. Without a router, the dispatcher broadcasts to
/// every sink; a router lets callers do per-sink transformation or conditional delivery.
pub trait Router: Send + Sync {
    fn route(&self, message: &Message, sink_count: usize) -> Vec<RoutedMessage>;
}

/// Broadcasts the message unchanged to every configured sink.
pub struct BroadcastRouter;

impl Router for BroadcastRouter {
    fn route(&self, message: &Message, sink_count: usize) -> Vec<RoutedMessage> {
        (0..sink_count)
            .map(|sink_index| RoutedMessage { sink_index, message: message.clone() })
            .collect()
    }
}

/// Transforms or filters a message before it reaches the buffer. `None` means "drop".
pub trait Transformer: Send + Sync {
    fn transform(&self, message: Message) -> Option<Message>;
}
