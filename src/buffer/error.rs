use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("Invalid buffer capacity: {capacity}")]
    InvalidCapacity { capacity: usize },

    #[error("Buffer is closed")]
    Closed,

    #[error("Buffer full for {waited:?}, dropped message on subject '{subject}'")]
    OverflowDropped { subject: String, waited: Duration },
}

impl BufferError {
    /// Whether the producer can keep delivering after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BufferError::OverflowDropped { .. })
    }
}
