//! Batch accumulation and adaptive batch-size control (§4.2).

use crate::message::Message;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Accumulates messages for one shard until a size, byte, or time threshold is hit.
pub struct BatchAccumulator {
    messages: Vec<Message>,
    bytes: usize,
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self { messages: Vec::new(), bytes: 0 }
    }

    pub fn push(&mut self, message: Message) {
        self.bytes += message.payload.len() + message.before.len() + message.after.len();
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Whether accumulated messages meet or exceed either threshold. `batch_bytes == 0` means
    /// "no byte limit".
    pub fn should_flush(&self, batch_size: usize, batch_bytes: usize) -> bool {
        if self.messages.is_empty() {
            return false;
        }
        self.messages.len() >= batch_size || (batch_bytes > 0 && self.bytes >= batch_bytes)
    }

    /// Drain the accumulated batch, resetting the accumulator.
    pub fn take(&mut self) -> Vec<Message> {
        self.bytes = 0;
        std::mem::take(&mut self.messages)
    }

    /// Evict the oldest queued message, for `dropOldest` backpressure. `None` if empty.
    pub fn pop_front(&mut self) -> Option<Message> {
        if self.messages.is_empty() {
            return None;
        }
        let evicted = self.messages.remove(0);
        self.bytes -= evicted.payload.len() + evicted.before.len() + evicted.after.len();
        Some(evicted)
    }
}

impl Default for BatchAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks a dynamically-adjusted batch size, growing it when flushes land comfortably under
/// `batch_timeout` and shrinking it when they run over, bounded to `[min, max]`.
pub struct AdaptiveBatchSize {
    current: AtomicUsize,
    min: usize,
    max: usize,
}

impl AdaptiveBatchSize {
    pub fn new(initial: usize, min: usize, max: usize) -> Self {
        let initial = initial.clamp(min.max(1), max.max(min.max(1)));
        Self { current: AtomicUsize::new(initial), min: min.max(1), max: max.max(min.max(1)) }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    /// Feed in the latency of the most recent flush against `target`. Flushes at or under half
    /// the target grow the batch by 25%; flushes at or over the target shrink it by 25%;
    /// anything in between leaves it unchanged.
    pub fn record_flush(&self, latency: Duration, target: Duration) {
        let size = self.current.load(Ordering::Relaxed);
        let new_size = if latency >= target {
            (size * 3 / 4).max(self.min)
        } else if latency <= target / 2 {
            (size * 5 / 4).max(size + 1).min(self.max)
        } else {
            size
        };
        self.current.store(new_size.clamp(self.min, self.max), Ordering::Relaxed);
    }
}
