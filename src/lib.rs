#![forbid(unsafe_code)]

//! # Hermod
//!
//! A streaming-data engine: sources feed a durable two-tier buffer, sink writers drain it
//! with batching, sharding, backpressure, retry, and circuit breakers, and an orchestrator
//! ties the whole pipeline's lifecycle together.
//!
//! ## Quick start
//!
//! ```rust
//! use hermod::{Backoff, Jitter, ResilienceError, RetryPolicy};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! async fn flaky_operation(
//!     attempts: Arc<AtomicUsize>,
//! ) -> Result<(), ResilienceError<std::io::Error>> {
//!     let n = attempts.fetch_add(1, Ordering::Relaxed);
//!     if n < 2 {
//!         Err(ResilienceError::Inner(std::io::Error::new(
//!             std::io::ErrorKind::Other,
//!             "transient failure",
//!         )))
//!     } else {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ResilienceError<std::io::Error>> {
//!     let attempts = Arc::new(AtomicUsize::new(0));
//!     let retry = RetryPolicy::builder()
//!         .max_attempts(3)
//!         .expect("max_attempts > 0")
//!         .backoff(Backoff::exponential(Duration::from_millis(200)))
//!         .with_jitter(Jitter::full())
//!         .build();
//!
//!     retry.execute(|| flaky_operation(attempts.clone())).await?;
//!     Ok(())
//! }
//! ```

mod backoff;
mod clock;
mod config;
mod contract;
mod error;
mod hermod_error;
mod jitter;
mod message;
mod retry;
mod sleeper;
mod value;

pub mod buffer;
pub mod engine;
pub mod observability;
pub mod sink_writer;

pub use backoff::Backoff;
pub use clock::{Clock, MonotonicClock};
pub use config::{idempotency_required_from_env, EngineConfig, SinkConfig, SourceConfig};
pub use contract::{
    BatchSink, BroadcastRouter, BufferError, Consumer, IsReady, LastWriteIdempotent, Loggable,
    Producer, Router, RoutedMessage, Sink, Source, Stateful, Transactional, Transformer,
};
pub use error::ResilienceError;
pub use hermod_error::{BackpressureStrategy, HermodError};
pub use jitter::Jitter;
pub use message::{Message, MessagePool, Operation};
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use value::Value;

pub mod prelude;
