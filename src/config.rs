//! Configuration types for sinks, sources, and the engine, plus environment overrides.

use crate::hermod_error::BackpressureStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn duration_millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Per-sink configuration: batching, sharding, backpressure, retry, and circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub max_retries: usize,
    #[serde(with = "duration_millis_serde")]
    pub retry_interval: Duration,
    #[serde(with = "duration_vec_millis_serde")]
    pub retry_intervals: Vec<Duration>,
    pub batch_size: usize,
    #[serde(with = "duration_millis_serde")]
    pub batch_timeout: Duration,
    pub batch_bytes: usize,
    pub adaptive_batching: bool,
    pub concurrency: usize,
    /// Bounded per-shard pending capacity before `backpressure_strategy` applies.
    pub channel_capacity: usize,
    pub shard_count: usize,
    pub shard_key_meta: Option<String>,
    pub backpressure_strategy: BackpressureStrategy,
    pub sampling_rate: f64,
    pub spill_path: Option<String>,
    pub spill_max_size: u64,
    pub circuit_breaker_threshold: usize,
    #[serde(with = "duration_millis_serde")]
    pub circuit_breaker_interval: Duration,
    #[serde(with = "duration_millis_serde")]
    pub circuit_breaker_cool_down: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval: Duration::from_millis(200),
            retry_intervals: Vec::new(),
            batch_size: 100,
            batch_timeout: Duration::from_millis(500),
            batch_bytes: 0,
            adaptive_batching: false,
            concurrency: 1,
            channel_capacity: 1000,
            shard_count: 1,
            shard_key_meta: None,
            backpressure_strategy: BackpressureStrategy::Block,
            sampling_rate: 1.0,
            spill_path: None,
            spill_max_size: 0,
            circuit_breaker_threshold: 5,
            circuit_breaker_interval: Duration::from_secs(60),
            circuit_breaker_cool_down: Duration::from_secs(30),
        }
    }
}

impl SinkConfig {
    /// The delay before retry attempt `j` (0-based): `retry_intervals[min(j, len-1)]` if
    /// set, else `(j+1) * retry_interval`.
    pub fn retry_delay(&self, attempt_index: usize) -> Duration {
        if self.retry_intervals.is_empty() {
            self.retry_interval
                .checked_mul((attempt_index + 1) as u32)
                .unwrap_or(Duration::from_secs(u64::MAX / 1000))
        } else {
            let idx = attempt_index.min(self.retry_intervals.len() - 1);
            self.retry_intervals[idx]
        }
    }
}

/// Per-source configuration: reconnect backoff schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(with = "duration_vec_millis_serde")]
    pub reconnect_intervals: Vec<Duration>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            reconnect_intervals: vec![
                Duration::from_millis(100),
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(5),
            ],
        }
    }
}

impl SourceConfig {
    /// The reconnect delay for a given attempt (0-based), reusing the last entry beyond
    /// the schedule's length.
    pub fn reconnect_delay(&self, attempt: usize) -> Duration {
        if self.reconnect_intervals.is_empty() {
            return Duration::from_secs(1);
        }
        let idx = attempt.min(self.reconnect_intervals.len() - 1);
        self.reconnect_intervals[idx]
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_retries: usize,
    #[serde(with = "duration_millis_serde")]
    pub retry_interval: Duration,
    #[serde(with = "duration_millis_serde")]
    pub reconnect_interval: Duration,
    #[serde(with = "duration_millis_serde")]
    pub status_interval: Duration,
    #[serde(with = "duration_millis_serde")]
    pub drain_timeout: Duration,
    #[serde(with = "duration_millis_serde")]
    pub outbox_relay_interval: Duration,
    pub trace_sample_rate: f64,
    pub dry_run: bool,
    /// Ring tier capacity for the combined buffer.
    pub ring_capacity: usize,
    /// Percentage (0-100) of `ring_capacity` at which produce prefers the file tier.
    pub spill_high_pct: u8,
    #[serde(with = "duration_millis_serde")]
    pub produce_timeout: Duration,
    /// Backlog bound (`produceCount - consumeCount`) on the file tier; `0` means unbounded.
    pub file_buffer_bound: u64,
    /// Bounded in-flight semaphore size for the dispatcher.
    pub max_in_flight: usize,
    /// Capacity of the bounded status-update channel.
    pub status_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval: Duration::from_millis(200),
            reconnect_interval: Duration::from_secs(1),
            status_interval: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
            outbox_relay_interval: Duration::from_secs(5),
            trace_sample_rate: 0.0,
            dry_run: false,
            ring_capacity: 1024,
            spill_high_pct: 80,
            produce_timeout: Duration::from_millis(5),
            file_buffer_bound: 0,
            max_in_flight: 1000,
            status_channel_capacity: 16,
        }
    }
}

/// Reads `HERMOD_IDEMPOTENCY_REQUIRED` from the environment, accepting `1`/`true`/`yes`
/// case-insensitively.
pub fn idempotency_required_from_env() -> bool {
    std::env::var("HERMOD_IDEMPOTENCY_REQUIRED")
        .map(|v| {
            let v = v.to_ascii_lowercase();
            v == "1" || v == "true" || v == "yes"
        })
        .unwrap_or(false)
}

mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

mod duration_vec_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ds: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        let millis: Vec<u64> = ds.iter().map(|d| d.as_millis() as u64).collect();
        millis.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        let millis = Vec::<u64>::deserialize(d)?;
        Ok(millis.into_iter().map(Duration::from_millis).collect())
    }
}
