use bytes::Bytes;

/// A message received from the bus.
///
/// This is the unit that flows through the relay buffer. It is never
/// mutated after the bus client builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub subject: String,
    pub reply_to: Option<String>,
    pub payload: Bytes,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            reply_to: None,
            payload: payload.into(),
        }
    }

    pub fn with_reply(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
