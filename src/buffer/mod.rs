pub mod backpressure;
pub mod error;
pub mod metrics;
pub mod queue;

pub use backpressure::OverflowPolicy;
pub use error::BufferError;
pub use metrics::{BufferMetrics, BufferMetricsCollector};
pub use queue::{DEFAULT_CAPACITY, MAX_CAPACITY, RelayBuffer, RelayBufferReceiver, RelayBufferSender};
