use super::backpressure::OverflowPolicy;
use super::error::BufferError;
use super::metrics::{BufferMetrics, BufferMetricsCollector};
use crate::domain::BusMessage;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tracing::{Span, debug, warn};

pub const DEFAULT_CAPACITY: usize = 1000;

/// Largest capacity the underlying channel can represent.
pub const MAX_CAPACITY: usize = Semaphore::MAX_PERMITS;

/// Fixed-capacity FIFO between bus delivery and the forwarder.
///
/// Built on a bounded tokio channel, so `0 <= depth <= capacity` holds at all
/// times and messages leave in the order they were enqueued. Call [`split`]
/// to hand the producer and consumer halves to their tasks.
///
/// [`split`]: RelayBuffer::split
pub struct RelayBuffer {
    sender: mpsc::Sender<BusMessage>,
    receiver: mpsc::Receiver<BusMessage>,
    capacity: usize,
    policy: OverflowPolicy,
    metrics: Arc<BufferMetricsCollector>,
    span: Span,
}

impl RelayBuffer {
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        Self::with_policy(capacity, OverflowPolicy::Block, Span::none())
    }

    pub fn with_policy(
        capacity: usize,
        policy: OverflowPolicy,
        span: Span,
    ) -> Result<Self, BufferError> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(BufferError::InvalidCapacity { capacity });
        }

        let (sender, receiver) = mpsc::channel(capacity);

        Ok(Self {
            sender,
            receiver,
            capacity,
            policy,
            metrics: Arc::new(BufferMetricsCollector::new()),
            span,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn metrics(&self) -> Arc<BufferMetricsCollector> {
        self.metrics.clone()
    }

    pub fn split(self) -> (RelayBufferSender, RelayBufferReceiver) {
        let sender = RelayBufferSender {
            sender: self.sender,
            policy: self.policy,
            metrics: self.metrics.clone(),
            span: self.span.clone(),
        };

        let receiver = RelayBufferReceiver {
            receiver: self.receiver,
            capacity: self.capacity,
            metrics: self.metrics,
            span: self.span,
        };

        (sender, receiver)
    }
}

/// Producer half. Cloneable; every clone feeds the same queue.
#[derive(Clone)]
pub struct RelayBufferSender {
    sender: mpsc::Sender<BusMessage>,
    policy: OverflowPolicy,
    metrics: Arc<BufferMetricsCollector>,
    span: Span,
}

impl RelayBufferSender {
    /// Queue a message, waiting for space when the buffer is full.
    ///
    /// Under [`OverflowPolicy::Block`] this only returns once the message is
    /// queued or the consumer side is gone. Under
    /// [`OverflowPolicy::DropAfter`] the wait is bounded and the message is
    /// dropped with [`BufferError::OverflowDropped`] when it expires.
    pub async fn enqueue(&self, message: BusMessage) -> Result<(), BufferError> {
        let message = match self.sender.try_send(message) {
            Ok(()) => {
                self.metrics.record_enqueued();
                return Ok(());
            }
            Err(TrySendError::Closed(_)) => return Err(BufferError::Closed),
            Err(TrySendError::Full(message)) => message,
        };

        self.metrics.record_backpressure();
        debug!(
            parent: &self.span,
            subject = %message.subject,
            capacity = self.sender.max_capacity(),
            "relay buffer full, producer waiting"
        );

        match self.policy {
            OverflowPolicy::Block => {
                self.sender
                    .send(message)
                    .await
                    .map_err(|_| BufferError::Closed)?;
            }
            OverflowPolicy::DropAfter(wait) => {
                let subject = message.subject.clone();
                match timeout(wait, self.sender.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => return Err(BufferError::Closed),
                    Err(_) => {
                        self.metrics.record_dropped();
                        warn!(
                            parent: &self.span,
                            subject = %subject,
                            waited_ms = wait.as_millis() as u64,
                            "relay buffer still full, dropping newest message"
                        );
                        return Err(BufferError::OverflowDropped {
                            subject,
                            waited: wait,
                        });
                    }
                }
            }
        }

        self.metrics.record_enqueued();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.sender.capacity() == 0
    }
}

/// Consumer half. Owned by the forwarder.
pub struct RelayBufferReceiver {
    receiver: mpsc::Receiver<BusMessage>,
    capacity: usize,
    metrics: Arc<BufferMetricsCollector>,
    span: Span,
}

impl RelayBufferReceiver {
    /// Wait for the next message. Returns `None` once every producer is gone
    /// and the queue is drained.
    pub async fn dequeue(&mut self) -> Option<BusMessage> {
        let message = self.receiver.recv().await?;
        self.metrics.record_dequeued();
        Some(message)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn metrics(&self) -> BufferMetrics {
        self.metrics.snapshot(self.capacity, self.len())
    }

    /// Close the buffer and discard whatever is still queued.
    ///
    /// Blocked producers wake up with [`BufferError::Closed`]. Returns the
    /// number of abandoned messages.
    pub fn release(mut self) -> usize {
        self.receiver.close();
        let mut abandoned = 0;
        while self.receiver.try_recv().is_ok() {
            abandoned += 1;
        }
        if abandoned > 0 {
            debug!(parent: &self.span, abandoned, "released relay buffer");
        }
        abandoned
    }
}
