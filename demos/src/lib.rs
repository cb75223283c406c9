//! Ready-to-run source/sink implementations for the Hermod demos.
//! Each one is deliberately minimal: an in-memory queue standing in for a real CDC source,
//! and a stdout/file sink standing in for a real warehouse driver.

use async_trait::async_trait;
use hermod::{BatchSink, Message, Sink, Source};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A demo error type wrapping any driver failure as a string.
#[derive(Debug)]
pub struct DemoError(pub String);

impl fmt::Display for DemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DemoError {}

/// A source that replays a fixed in-memory batch of messages once, then idles.
pub struct InMemorySource {
    messages: Mutex<Vec<Message>>,
    acked: AtomicUsize,
}

impl InMemorySource {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages: Mutex::new(messages), acked: AtomicUsize::new(0) }
    }

    /// Number of messages acknowledged so far, for demo reporting.
    pub fn acked_count(&self) -> usize {
        self.acked.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Source for InMemorySource {
    type Error = DemoError;

    async fn read(&self) -> Result<Option<Message>, Self::Error> {
        let mut messages = self.messages.lock().unwrap_or_else(|p| p.into_inner());
        Ok(messages.pop())
    }

    async fn ack(&self, _message: &Message) -> Result<(), Self::Error> {
        self.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A sink that prints each delivered message to stdout, one line per message.
pub struct StdoutSink {
    label: String,
}

impl StdoutSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

#[async_trait]
impl Sink for StdoutSink {
    type Error = DemoError;

    async fn write(&self, message: &Message) -> Result<(), Self::Error> {
        println!("[{}] {} {}/{}", self.label, message.id, message.schema, message.table);
        Ok(())
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_batch_sink(&self) -> Option<&dyn BatchSink<Error = Self::Error>> {
        Some(self)
    }
}

#[async_trait]
impl BatchSink for StdoutSink {
    async fn write_batch(&self, messages: &[Message]) -> Result<(), Self::Error> {
        for message in messages {
            self.write(message).await?;
        }
        Ok(())
    }
}
