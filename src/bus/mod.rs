pub mod nats;

pub use nats::{NatsBus, NatsConfig};

use crate::domain::BusMessage;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),
    #[error("Flush failed: {0}")]
    FlushFailed(String),
    #[error("Connection already closed")]
    Closed,
}

/// Messages delivered for one subscription, in arrival order. The stream
/// ends when the subscription or the connection goes away.
pub type MessageStream = BoxStream<'static, BusMessage>;

/// Pub/sub connection the relay reads from.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    async fn subscribe(&self, pattern: &str) -> Result<MessageStream, BusError>;

    async fn close(&self) -> Result<(), BusError>;
}
