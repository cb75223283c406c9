//! The two-tier buffer: an in-memory ring fronting a durable file tier (§4.3).
//!
//! `produce` prefers the ring until it reaches its spill watermark, then falls back to the
//! file tier; `consume` drains the ring before the file tier. That ordering means a message
//! that spilled to disk while the ring was briefly full can be delivered *after* a message
//! produced moments later that found room in the ring — an explicit, accepted reordering
//! trade for keeping the hot path lock-free.

use crate::buffer::file::FileBuffer;
use crate::buffer::ring::{Ring, RingProduceOutcome};
use crate::contract::{BufferError, Consumer, Producer};
use crate::message::Message;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct CombinedBuffer {
    ring: Ring,
    file: Arc<FileBuffer>,
    closed: AtomicBool,
}

impl CombinedBuffer {
    /// `file_bound` caps the file tier's outstanding backlog (`produceCount - consumeCount`);
    /// `0` means unbounded.
    pub fn new(
        file_dir: impl AsRef<Path>,
        ring_capacity: usize,
        spill_high_pct: u8,
        produce_timeout: Duration,
        compression: Option<crate::buffer::compression::Compression>,
        file_bound: u64,
    ) -> Result<Self, BufferError> {
        let file = FileBuffer::open(file_dir, compression, file_bound).map_err(|e| BufferError::Io(e.to_string()))?;
        Ok(Self {
            ring: Ring::new(ring_capacity, spill_high_pct, produce_timeout),
            file: Arc::new(file),
            closed: AtomicBool::new(false),
        })
    }

    pub fn ring_len(&self) -> usize {
        self.ring.len()
    }

    pub fn file_record_count(&self) -> u64 {
        self.file.record_count()
    }

    async fn spill_to_file(&self, message: Message) -> Result<(), BufferError> {
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || file.append(&message))
            .await
            .map_err(|e| BufferError::Io(e.to_string()))?
            .map_err(|e| BufferError::Io(e.to_string()))?;
        Ok(())
    }

    async fn read_file_next(&self) -> Result<Option<Message>, BufferError> {
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || file.read_next())
            .await
            .map_err(|e| BufferError::Io(e.to_string()))?
            .map_err(|e| BufferError::Corrupt { reason: e.to_string() })
    }
}

#[async_trait]
impl Producer for CombinedBuffer {
    async fn produce(&self, message: Message) -> Result<(), BufferError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BufferError::Closed);
        }
        match self.ring.try_produce(message).await {
            RingProduceOutcome::Enqueued => Ok(()),
            RingProduceOutcome::Closed(_) => Err(BufferError::Closed),
            RingProduceOutcome::AtWatermark(message) | RingProduceOutcome::Full(message) => {
                self.spill_to_file(message).await
            }
        }
    }

    async fn close(&self) -> Result<(), BufferError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl Consumer for CombinedBuffer {
    async fn consume<H>(&self, handler: H) -> Result<(), BufferError>
    where
        H: Fn(Message) -> Result<(), BufferError> + Send + Sync,
    {
        while let Some(message) = self.ring.try_consume().await {
            handler(message)?;
        }
        while let Some(message) = self.read_file_next().await? {
            handler(message)?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BufferError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn msg(id: &str) -> Message {
        Message { id: id.into(), ..Default::default() }
    }

    #[tokio::test]
    async fn produce_stays_in_ring_below_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let buf = CombinedBuffer::new(dir.path(), 10, 80, Duration::from_millis(50), None, 0).unwrap();
        buf.produce(msg("a")).await.unwrap();
        assert_eq!(buf.ring_len(), 1);
        assert_eq!(buf.file_record_count(), 0);
    }

    #[tokio::test]
    async fn produce_spills_to_file_past_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let buf = CombinedBuffer::new(dir.path(), 10, 20, Duration::from_millis(50), None, 0).unwrap();
        for i in 0..5 {
            buf.produce(msg(&i.to_string())).await.unwrap();
        }
        assert!(buf.file_record_count() > 0);
    }

    #[tokio::test]
    async fn consume_drains_ring_then_file() {
        let dir = tempfile::tempdir().unwrap();
        let buf = CombinedBuffer::new(dir.path(), 10, 100, Duration::from_millis(50), None, 0).unwrap();
        buf.produce(msg("ring-1")).await.unwrap();
        buf.spill_to_file(msg("file-1")).await.unwrap();

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        buf.consume(move |m| {
            seen_clone.lock().unwrap().push(m.id);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["ring-1".to_string(), "file-1".to_string()]);
    }

    #[tokio::test]
    async fn closed_buffer_rejects_produce() {
        let dir = tempfile::tempdir().unwrap();
        let buf = CombinedBuffer::new(dir.path(), 10, 100, Duration::from_millis(50), None, 0).unwrap();
        Producer::close(&buf).await.unwrap();
        let err = buf.produce(msg("a")).await.unwrap_err();
        assert!(matches!(err, BufferError::Closed));
    }
}
