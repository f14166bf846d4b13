use crate::bus::BusError;
use crate::sink::SinkError;
use thiserror::Error;

/// Top-level error type for the relay lifecycle.
///
/// Only connection failures surface here. Per-message format failures are
/// contained by the formatter, and send failures end the run through the
/// shutdown signal rather than as an error value.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::app::ConfigError),

    #[error("Failed to connect to syslog at {endpoint}: {source}")]
    SinkConnection {
        endpoint: String,
        #[source]
        source: SinkError,
    },

    #[error("Failed to connect to NATS at {uri}: {source}")]
    BusConnection {
        uri: String,
        #[source]
        source: BusError,
    },

    #[error("Failed to subscribe to subject '{subject}': {source}")]
    Subscribe {
        subject: String,
        #[source]
        source: BusError,
    },

    #[error("Buffer error: {0}")]
    Buffer(#[from] crate::buffer::BufferError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] crate::app::LoggingError),
}
