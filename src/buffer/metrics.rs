use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of relay buffer counters.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferMetrics {
    pub capacity: usize,
    pub depth: usize,
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
    pub backpressure_events: u64,
}

impl BufferMetrics {
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.depth as f64 / self.capacity as f64
    }
}

#[derive(Debug)]
pub struct BufferMetricsCollector {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
    backpressure_events: AtomicU64,
}

impl BufferMetricsCollector {
    pub(crate) fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            backpressure_events: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeued(&self) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_backpressure(&self) {
        self.backpressure_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, capacity: usize, depth: usize) -> BufferMetrics {
        BufferMetrics {
            capacity,
            depth,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            backpressure_events: self.backpressure_events.load(Ordering::Relaxed),
        }
    }
}
