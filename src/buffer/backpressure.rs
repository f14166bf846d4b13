use std::time::Duration;

/// What the producer does when the relay buffer is full.
///
/// `Block` is the default and applies backpressure into the bus delivery
/// task: once the buffer holds `capacity` messages, delivery waits for the
/// forwarder. A slow or stuck sink therefore stalls delivery, and the NATS
/// server may eventually mark the subscription as a slow consumer.
///
/// `DropAfter` bounds that wait. When the timeout expires the newest message
/// is dropped, counted and logged at warn level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    #[default]
    Block,
    DropAfter(Duration),
}

impl OverflowPolicy {
    pub fn from_timeout_ms(timeout_ms: Option<u64>) -> Self {
        match timeout_ms {
            Some(ms) => OverflowPolicy::DropAfter(Duration::from_millis(ms)),
            None => OverflowPolicy::Block,
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, OverflowPolicy::Block)
    }
}
