//! Sink writer subsystem: per-sink batching, sharding, circuit breaking, and retry (§4.2).

pub mod batch;
pub mod circuit;
pub mod shard;
pub mod writer;

pub use batch::{AdaptiveBatchSize, BatchAccumulator};
pub use circuit::{CircuitState, WindowedCircuitBreaker};
pub use shard::{shard_for_key, stable_hash};
pub use writer::{spawn_sink_writer, DynSinkWriter, SinkWriter, WriteOutcome};
