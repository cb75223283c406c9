//! Observability snapshot types broadcast on the engine's status channel (§5).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coarse engine lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Starting,
    Running,
    /// Source or a sink is unhealthy; `offender` is `"source"` or `"sink:<id>"` (first found).
    Reconnecting { offender: String },
    Draining,
    Stopped,
    Failed,
}

/// A source's connectivity state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatus {
    pub source_id: String,
    pub connected: bool,
    pub last_error: Option<String>,
    pub messages_read: u64,
}

/// A sink writer's health: circuit state, pending/in-flight counts, DLQ totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkState {
    pub sink_id: String,
    pub circuit_open: bool,
    pub in_flight: usize,
    pub batch_size: usize,
    pub dead_letter_total: u64,
    pub last_error: Option<String>,
}

/// One snapshot of the whole engine's health, emitted on `status_interval` and on every
/// significant state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub engine_status: EngineStatus,
    pub sources: Vec<SourceStatus>,
    pub sinks: Vec<SinkState>,
    pub ring_depth: usize,
    pub file_buffer_depth: u64,
    pub extra: BTreeMap<String, String>,
}

impl StatusUpdate {
    pub fn starting() -> Self {
        Self {
            engine_status: EngineStatus::Starting,
            sources: Vec::new(),
            sinks: Vec::new(),
            ring_depth: 0,
            file_buffer_depth: 0,
            extra: BTreeMap::new(),
        }
    }
}
