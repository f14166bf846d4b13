use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStatsSnapshot {
    pub entries_sent: u64,
    pub entries_failed: u64,
    pub bytes_sent: u64,
    pub average_write_time: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    entries_sent: AtomicU64,
    entries_failed: AtomicU64,
    bytes_sent: AtomicU64,
    total_write_micros: AtomicU64,
}

/// Shared write counters for a sink connection.
#[derive(Debug, Clone, Default)]
pub struct SinkStats {
    counters: Arc<Counters>,
}

impl SinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_write(&self, success: bool, bytes: usize, write_time: Duration) {
        let counters = &self.counters;
        counters
            .total_write_micros
            .fetch_add(write_time.as_micros() as u64, Ordering::Relaxed);

        if success {
            counters.entries_sent.fetch_add(1, Ordering::Relaxed);
            counters.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        } else {
            counters.entries_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> SinkStatsSnapshot {
        let counters = &self.counters;
        let entries_sent = counters.entries_sent.load(Ordering::Relaxed);
        let entries_failed = counters.entries_failed.load(Ordering::Relaxed);
        let total_writes = entries_sent + entries_failed;
        let total_micros = counters.total_write_micros.load(Ordering::Relaxed);

        let average_write_time = if total_writes > 0 {
            Duration::from_micros(total_micros / total_writes)
        } else {
            Duration::ZERO
        };

        SinkStatsSnapshot {
            entries_sent,
            entries_failed,
            bytes_sent: counters.bytes_sent.load(Ordering::Relaxed),
            average_write_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_are_shared_between_clones() {
        let stats = SinkStats::new();
        let clone = stats.clone();

        clone.record_write(true, 10, Duration::from_micros(100));
        clone.record_write(false, 5, Duration::from_micros(300));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.entries_sent, 1);
        assert_eq!(snapshot.entries_failed, 1);
        assert_eq!(snapshot.bytes_sent, 10);
        assert_eq!(snapshot.average_write_time, Duration::from_micros(200));
    }
}
