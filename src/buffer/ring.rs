//! The in-memory ring tier: a bounded channel with a produce timeout and a spill watermark.

use crate::message::Message;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Outcome of a [`Ring::try_produce`] call. On every variant other than `Enqueued`, the
/// message is handed back to the caller (it was never moved into the channel), so the
/// combined buffer can fall back to the file tier without losing it.
pub enum RingProduceOutcome {
    Enqueued,
    AtWatermark(Message),
    Full(Message),
    Closed(Message),
}

/// A bounded in-memory queue with a soft watermark below hard capacity.
///
/// The watermark exists so the combined buffer tier can prefer the durable file tier before
/// the ring is actually full, smoothing the transition rather than bursting every producer
/// into `Full` at once.
pub struct Ring {
    tx: mpsc::Sender<Message>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    capacity: usize,
    watermark: usize,
    produce_timeout: Duration,
}

impl Ring {
    pub fn new(capacity: usize, spill_high_pct: u8, produce_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let watermark = (capacity as u64 * spill_high_pct.min(100) as u64 / 100) as usize;
        Self { tx, rx: tokio::sync::Mutex::new(rx), capacity, watermark, produce_timeout }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Approximate count of messages currently queued (channel capacity minus free permits).
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn at_watermark(&self) -> bool {
        self.len() >= self.watermark
    }

    /// Try to enqueue without crossing the watermark. Reserves a permit before taking
    /// ownership of `message`, so a full/closed/timed-out channel never silently drops it.
    pub async fn try_produce(&self, message: Message) -> RingProduceOutcome {
        if self.at_watermark() {
            return RingProduceOutcome::AtWatermark(message);
        }
        self.send_with_timeout(message).await
    }

    /// Enqueue regardless of the watermark (used once the file tier itself is full).
    pub async fn force_produce(&self, message: Message) -> RingProduceOutcome {
        self.send_with_timeout(message).await
    }

    async fn send_with_timeout(&self, message: Message) -> RingProduceOutcome {
        match tokio::time::timeout(self.produce_timeout, self.tx.reserve()).await {
            Ok(Ok(permit)) => {
                permit.send(message);
                RingProduceOutcome::Enqueued
            }
            Ok(Err(_)) => RingProduceOutcome::Closed(message),
            Err(_) => RingProduceOutcome::Full(message),
        }
    }

    /// Pop the next message without blocking.
    pub async fn try_consume(&self) -> Option<Message> {
        self.rx.lock().await.try_recv().ok()
    }
}
