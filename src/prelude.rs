//! Convenient re-exports for common Hermod types.
pub use crate::{
    buffer::{CombinedBuffer, Compression},
    config::{EngineConfig, SinkConfig, SourceConfig},
    contract::{
        BatchSink, BroadcastRouter, BufferError, Consumer, IsReady, LastWriteIdempotent, Producer,
        Router, RoutedMessage, Sink, Source, Transformer,
    },
    engine::{register_sink, Engine, PrioritySource, SinkHandle},
    hermod_error::{BackpressureStrategy, HermodError},
    message::{Message, MessagePool, Operation},
    observability::{Metrics, NoopMetrics, StatusUpdate},
    sink_writer::{SinkWriter, WriteOutcome},
    value::Value,
    Backoff, Jitter, ResilienceError, RetryPolicy,
};
