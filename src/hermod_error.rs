//! Error taxonomy for the engine, sink writer, and buffer layers.
//!
//! Mirrors [`crate::ResilienceError`]'s shape (hand-written `Display`/`Error`, no `thiserror`)
//! one layer up: a driver's own error type `E` is carried in [`HermodError::Driver`], and the
//! rest of the taxonomy is the component-design errors from the external-interfaces and
//! error-handling sections (circuit open, backpressure drop, buffer corruption, pre-flight,
//! retry exhaustion, cancellation).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A sink's backpressure policy, echoed back on drop errors and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureStrategy {
    Block,
    DropOldest,
    DropNewest,
    Sampling,
    SpillToDisk,
}

impl BackpressureStrategy {
    /// The metric-label spelling used on `backpressure_drop_total{...,strategy=...}`.
    pub fn as_metric_label(&self) -> &'static str {
        match self {
            BackpressureStrategy::Block => "block",
            BackpressureStrategy::DropOldest => "drop_oldest",
            BackpressureStrategy::DropNewest => "drop_newest",
            BackpressureStrategy::Sampling => "sampling",
            BackpressureStrategy::SpillToDisk => "spill_to_disk",
        }
    }
}

/// Error surface shared by the engine, sink writer, and buffer.
#[derive(Debug)]
pub enum HermodError<E> {
    /// The sink writer's circuit breaker is open; the write was not attempted.
    CircuitOpen { sink_id: String },
    /// A message was dropped by a backpressure strategy rather than delivered.
    BackpressureDropped { sink_id: String, strategy: BackpressureStrategy },
    /// The on-disk log is corrupt: bad magic, truncated frame, or a failed decompression.
    BufferCorrupt { reason: String },
    /// Pre-flight pings failed for one or more sinks; the engine did not start.
    PreflightFailed { sink_id: String },
    /// All configured retry attempts were exhausted with no DLQ configured.
    RetryExhausted { sink_id: String, attempts: usize },
    /// The buffer was closed; no further `Produce` calls are accepted.
    BufferClosed,
    /// The operation was cancelled (graceful shutdown); not a failure.
    Cancelled,
    /// A driver-reported error, from a source `Read`/`Ack`/`Ping` or a sink `Write`/`Ping`.
    Driver(E),
    /// A resilience-stack variant (timeout/bulkhead/inner circuit breaker) this layer does
    /// not otherwise compose with, preserved as text rather than dropped.
    Unexpected(String),
}

impl<E: fmt::Display> fmt::Display for HermodError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HermodError::CircuitOpen { sink_id } => {
                write!(f, "sink '{}' unavailable: circuit breaker open", sink_id)
            }
            HermodError::BackpressureDropped { sink_id, strategy } => write!(
                f,
                "message dropped for sink '{}' by backpressure strategy '{}'",
                sink_id,
                strategy.as_metric_label()
            ),
            HermodError::BufferCorrupt { reason } => write!(f, "buffer corrupt: {}", reason),
            HermodError::PreflightFailed { sink_id } => {
                write!(f, "sink pre-flight checks failed for '{}'", sink_id)
            }
            HermodError::RetryExhausted { sink_id, attempts } => write!(
                f,
                "sink '{}' retry exhausted after {} attempts",
                sink_id, attempts
            ),
            HermodError::BufferClosed => write!(f, "buffer closed"),
            HermodError::Cancelled => write!(f, "operation cancelled"),
            HermodError::Driver(e) => write!(f, "{}", e),
            HermodError::Unexpected(msg) => write!(f, "{}", msg),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for HermodError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HermodError::Driver(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> HermodError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, HermodError::CircuitOpen { .. })
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, HermodError::BackpressureDropped { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, HermodError::Cancelled)
    }

    pub fn into_driver(self) -> Option<E> {
        match self {
            HermodError::Driver(e) => Some(e),
            _ => None,
        }
    }
}
