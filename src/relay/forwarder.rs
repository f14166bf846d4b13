use super::shutdown::{ShutdownReason, ShutdownSignal};
use crate::buffer::RelayBufferReceiver;
use crate::formatter::EntryFormatter;
use crate::sink::LogSink;
use tracing::{Span, debug, error, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    pub forwarded: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Everything the forwarder hands back when its loop ends, so the
/// coordinator can close the sink and release the buffer.
pub struct ForwarderExit<S> {
    pub sink: S,
    pub buffer: RelayBufferReceiver,
    pub stats: ForwarderStats,
}

/// Single consumer of the relay buffer.
pub struct Forwarder<S> {
    buffer: RelayBufferReceiver,
    sink: S,
    formatter: EntryFormatter,
    shutdown: ShutdownSignal,
    span: Span,
}

impl<S: LogSink> Forwarder<S> {
    pub fn new(
        buffer: RelayBufferReceiver,
        sink: S,
        formatter: EntryFormatter,
        shutdown: ShutdownSignal,
        span: Span,
    ) -> Self {
        Self {
            buffer,
            sink,
            formatter,
            shutdown,
            span,
        }
    }

    /// Drain the buffer until shutdown fires, the sink fails, or every
    /// producer is gone.
    ///
    /// Shutdown is observed between messages; a send already in progress is
    /// allowed to complete. On the first send error the shutdown signal is
    /// fired and nothing further is sent.
    pub async fn run(mut self) -> ForwarderExit<S> {
        let mut stats = ForwarderStats::default();
        info!(parent: &self.span, endpoint = %self.sink.endpoint(), "forwarder started");

        loop {
            let message = tokio::select! {
                biased;
                _ = self.shutdown.fired() => break,
                message = self.buffer.dequeue() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let entry = self.formatter.format(&message);
            if entry.is_sentinel() {
                stats.skipped += 1;
                debug!(parent: &self.span, subject = %message.subject, "skipping empty entry");
                continue;
            }

            if let Err(e) = self.sink.send(entry.as_bytes()).await {
                stats.failed += 1;
                error!(
                    parent: &self.span,
                    error = %e,
                    endpoint = %self.sink.endpoint(),
                    subject = %message.subject,
                    entry_len = entry.len(),
                    "logging to syslog failed"
                );
                self.shutdown.fire(ShutdownReason::SendFailure);
                break;
            }

            stats.forwarded += 1;
            debug!(
                parent: &self.span,
                subject = %message.subject,
                entry_len = entry.len(),
                "message sent to syslog"
            );
        }

        info!(
            parent: &self.span,
            forwarded = stats.forwarded,
            skipped = stats.skipped,
            failed = stats.failed,
            pending = self.buffer.len(),
            "forwarder stopped"
        );

        ForwarderExit {
            sink: self.sink,
            buffer: self.buffer,
            stats,
        }
    }
}
