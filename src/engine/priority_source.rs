//! Wraps a recovery source and a primary source, preferring recovery (§4.5).

use crate::contract::Source;
use crate::message::Message;
use async_trait::async_trait;
use std::any::Any;
use std::time::Duration;

const RECOVERY_POLL: Duration = Duration::from_millis(50);
const SOURCE_TAG_KEY: &str = "_hermod_source";

/// Polls `recovery` briefly on every `read`; falls back to a blocking `primary` read when
/// recovery has nothing ready. Tags each returned message so `ack` can be routed back to
/// whichever source actually produced it.
pub struct PrioritySource<R, P> {
    recovery: R,
    primary: P,
}

impl<R, P, E> PrioritySource<R, P>
where
    R: Source<Error = E>,
    P: Source<Error = E>,
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new(recovery: R, primary: P) -> Self {
        Self { recovery, primary }
    }
}

#[async_trait]
impl<R, P, E> Source for PrioritySource<R, P>
where
    R: Source<Error = E>,
    P: Source<Error = E>,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    async fn read(&self) -> Result<Option<Message>, Self::Error> {
        if let Ok(Ok(Some(mut message))) = tokio::time::timeout(RECOVERY_POLL, self.recovery.read()).await {
            message.metadata.insert(SOURCE_TAG_KEY.to_string(), "recovery".to_string());
            return Ok(Some(message));
        }

        match self.primary.read().await? {
            Some(mut message) => {
                message.metadata.insert(SOURCE_TAG_KEY.to_string(), "primary".to_string());
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, message: &Message) -> Result<(), Self::Error> {
        match message.metadata.get(SOURCE_TAG_KEY).map(String::as_str) {
            Some("recovery") => self.recovery.ack(message).await,
            _ => self.primary.ack(message).await,
        }
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.recovery.ping().await?;
        self.primary.ping().await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
