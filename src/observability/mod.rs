//! Observability: named metrics and status snapshots (§6).

pub mod metrics;
pub mod status;

pub use metrics::{Metrics, NoopMetrics};
pub use status::{EngineStatus, SinkState, SourceStatus, StatusUpdate};
