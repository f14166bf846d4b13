pub mod stats;
pub mod syslog;

pub use stats::{SinkStats, SinkStatsSnapshot};
pub use syslog::{SinkProtocol, SyslogConfig, SyslogSink};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Connection to {endpoint} failed: {source}")]
    ConnectionFailed {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Connection to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },
    #[error("Write to {endpoint} failed: {source}")]
    WriteFailed {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Write to {endpoint} timed out after {timeout:?}")]
    WriteTimeout { endpoint: String, timeout: Duration },
    #[error("Connection to {0} is closed")]
    Closed(String),
}

/// Remote log collector the forwarder writes to.
///
/// `send` is never retried by the caller: any error ends the relay.
#[async_trait]
pub trait LogSink: Send + 'static {
    async fn send(&mut self, entry: &[u8]) -> Result<(), SinkError>;

    async fn close(&mut self) -> Result<(), SinkError>;

    fn endpoint(&self) -> &str;

    /// Write counters, for sinks that keep them.
    fn stats(&self) -> Option<SinkStatsSnapshot> {
        None
    }
}
