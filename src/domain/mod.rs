//! Domain layer for nats-to-syslog.
//!
//! Contains the canonical types shared across all modules:
//! - `BusMessage`: a message as delivered by the bus, before formatting
//! - `RelayError`: Top-level error type for startup and run failures

pub mod error;
pub mod message;

pub use error::RelayError;
pub use message::BusMessage;
