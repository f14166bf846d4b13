use super::{BusError, MessageBus, MessageStream};
use crate::domain::BusMessage;
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{Span, debug};

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub uri: String,
    pub connection_timeout: Duration,
    /// Client connection name reported to the server
    pub name: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            uri: "nats://localhost:4222".to_string(),
            connection_timeout: Duration::from_secs(10),
            name: "nats-to-syslog".to_string(),
        }
    }
}

impl From<async_nats::Message> for BusMessage {
    fn from(message: async_nats::Message) -> Self {
        Self {
            subject: message.subject.to_string(),
            reply_to: message.reply.map(|reply| reply.to_string()),
            payload: message.payload,
        }
    }
}

/// NATS core (non-JetStream) connection.
pub struct NatsBus {
    client: Mutex<Option<Client>>,
    span: Span,
}

impl NatsBus {
    /// Connect once. Initial connection failures are not retried; later
    /// disconnects are handled by the client's own reconnect logic.
    pub async fn connect(config: &NatsConfig, span: Span) -> Result<Self, BusError> {
        if config.uri.trim().is_empty() {
            return Err(BusError::InvalidConfiguration(
                "NATS URI must not be empty".to_string(),
            ));
        }

        let client = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connection_timeout)
            .connect(config.uri.as_str())
            .await
            .map_err(|e| BusError::ConnectionFailed(e.to_string()))?;

        debug!(parent: &span, uri = %config.uri, "NATS connection established");

        Ok(Self {
            client: Mutex::new(Some(client)),
            span,
        })
    }

    fn client(&self) -> Result<Client, BusError> {
        self.client.lock().clone().ok_or(BusError::Closed)
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn subscribe(&self, pattern: &str) -> Result<MessageStream, BusError> {
        let client = self.client()?;
        let subscriber = client
            .subscribe(pattern.to_string())
            .await
            .map_err(|e| BusError::SubscribeFailed(e.to_string()))?;

        debug!(parent: &self.span, subject = %pattern, "NATS subscription created");
        Ok(subscriber.map(BusMessage::from).boxed())
    }

    async fn close(&self) -> Result<(), BusError> {
        let client = self.client.lock().take().ok_or(BusError::Closed)?;
        let flushed = client
            .flush()
            .await
            .map_err(|e| BusError::FlushFailed(e.to_string()));
        // The connection closes once the last client handle is dropped.
        drop(client);
        flushed
    }
}
