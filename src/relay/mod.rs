//! The relay pipeline: bus subscription → relay buffer → forwarder → sink,
//! plus the coordinator that tears it down exactly once.
//!
//! Lifecycle: `Starting → Running → Stopping → Stopped`.
//!
//! - [`Relay::start`] dials the sink, then connects the bus, then subscribes.
//!   Any failure there is returned as a [`RelayError`] and the relay never
//!   reaches `Running`. An unreachable sink means the bus is never contacted.
//! - [`Relay::run`] waits on the [`ShutdownSignal`], which fires on SIGINT or
//!   SIGTERM, on the first sink send failure, or when the subscription ends.
//! - Teardown waits for the forwarder to hand the sink back (an in-flight
//!   send is not interrupted), closes the sink, stops the producer, closes
//!   the bus and releases the buffer. Buffered messages are dropped.

pub mod forwarder;
pub mod shutdown;

pub use forwarder::{Forwarder, ForwarderExit, ForwarderStats};
pub use shutdown::{RelayState, ShutdownReason, ShutdownSignal, StateCell, listen_for_signals};

use crate::buffer::{BufferMetrics, OverflowPolicy, RelayBuffer, RelayBufferSender};
use crate::bus::{MessageBus, MessageStream};
use crate::domain::RelayError;
use crate::formatter::{EntryFormat, EntryFormatter};
use crate::sink::{LogSink, SinkStatsSnapshot};
use futures::StreamExt;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{Span, debug, error, info, info_span, warn};

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub subject: String,
    pub buffer_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub entry_format: EntryFormat,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            subject: ">".to_string(),
            buffer_capacity: crate::buffer::DEFAULT_CAPACITY,
            overflow_policy: OverflowPolicy::Block,
            entry_format: EntryFormat::Structured,
        }
    }
}

/// How the relay ended.
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub reason: ShutdownReason,
    pub delivered: u64,
    pub forwarder: ForwarderStats,
    pub abandoned: usize,
    pub buffer: Option<BufferMetrics>,
    /// Write counters of the sink, when it keeps them.
    pub sink: Option<SinkStatsSnapshot>,
}

impl RelayOutcome {
    pub fn exit_code(&self) -> i32 {
        self.reason.exit_code()
    }
}

/// A running relay. Dropping it without calling [`run`](Relay::run) leaves
/// the spawned tasks running until the shutdown signal fires.
pub struct Relay<S, B> {
    bus: B,
    forwarder: JoinHandle<ForwarderExit<S>>,
    producer: JoinHandle<u64>,
    shutdown: ShutdownSignal,
    state: StateCell,
    span: Span,
}

impl<S: LogSink, B: MessageBus> Relay<S, B> {
    pub async fn start<DS, CB>(
        settings: RelaySettings,
        shutdown: ShutdownSignal,
        span: Span,
        dial_sink: DS,
        connect_bus: CB,
    ) -> Result<Self, RelayError>
    where
        DS: Future<Output = Result<S, RelayError>>,
        CB: Future<Output = Result<B, RelayError>>,
    {
        let buffer = RelayBuffer::with_policy(
            settings.buffer_capacity,
            settings.overflow_policy,
            info_span!(parent: &span, "buffer"),
        )?;

        let mut sink = dial_sink.await?;
        info!(parent: &span, endpoint = %sink.endpoint(), "connected to syslog");

        let bus = match connect_bus.await {
            Ok(bus) => bus,
            Err(e) => {
                close_sink(&mut sink, &span).await;
                return Err(e);
            }
        };
        info!(parent: &span, "connected to NATS");

        let stream = match bus.subscribe(&settings.subject).await {
            Ok(stream) => stream,
            Err(source) => {
                close_sink(&mut sink, &span).await;
                close_bus(&bus, &span).await;
                return Err(RelayError::Subscribe {
                    subject: settings.subject,
                    source,
                });
            }
        };
        info!(parent: &span, subject = %settings.subject, "subscribed to subject");

        let (sender, receiver) = buffer.split();
        let formatter = EntryFormatter::new(
            settings.entry_format,
            info_span!(parent: &span, "formatter"),
        );

        let forwarder = Forwarder::new(
            receiver,
            sink,
            formatter,
            shutdown.clone(),
            info_span!(parent: &span, "forwarder"),
        );
        let forwarder = tokio::spawn(forwarder.run());

        let producer = tokio::spawn(produce(
            stream,
            sender,
            shutdown.clone(),
            info_span!(parent: &span, "producer", subject = %settings.subject),
        ));

        let state = StateCell::new();
        state.mark_running();
        info!(
            parent: &span,
            capacity = settings.buffer_capacity,
            policy = ?settings.overflow_policy,
            format = ?settings.entry_format,
            "relay running"
        );

        Ok(Self {
            bus,
            forwarder,
            producer,
            shutdown,
            state,
            span,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn state(&self) -> StateCell {
        self.state.clone()
    }

    /// Block until the shutdown signal fires, then tear down.
    pub async fn run(self) -> RelayOutcome {
        let reason = self.shutdown.wait().await;
        self.teardown(reason).await
    }

    async fn teardown(self, reason: ShutdownReason) -> RelayOutcome {
        let Self {
            bus,
            forwarder,
            producer,
            state,
            span,
            ..
        } = self;

        if !state.begin_stopping() {
            warn!(parent: &span, state = ?state.get(), "teardown already in progress");
        }
        info!(parent: &span, reason = %reason, "relay stopping");

        let mut outcome = RelayOutcome {
            reason,
            delivered: 0,
            forwarder: ForwarderStats::default(),
            abandoned: 0,
            buffer: None,
            sink: None,
        };

        let released = match forwarder.await {
            Ok(mut exit) => {
                close_sink(&mut exit.sink, &span).await;
                outcome.sink = exit.sink.stats();
                outcome.forwarder = exit.stats;
                Some(exit.buffer)
            }
            Err(e) => {
                error!(parent: &span, error = %e, "forwarder task failed, syslog connection lost");
                None
            }
        };

        match producer.await {
            Ok(delivered) => outcome.delivered = delivered,
            Err(e) => error!(parent: &span, error = %e, "producer task failed"),
        }

        close_bus(&bus, &span).await;

        if let Some(buffer) = released {
            outcome.buffer = Some(buffer.metrics());
            outcome.abandoned = buffer.release();
        }

        state.mark_stopped();
        let sink_stats = outcome.sink.clone().unwrap_or_default();
        info!(
            parent: &span,
            delivered = outcome.delivered,
            forwarded = outcome.forwarder.forwarded,
            abandoned = outcome.abandoned,
            bytes_sent = sink_stats.bytes_sent,
            failed_writes = sink_stats.entries_failed,
            avg_write_us = sink_stats.average_write_time.as_micros() as u64,
            "bye."
        );
        outcome
    }
}

/// Move messages from the subscription into the relay buffer.
///
/// Blocks on a full buffer (see [`OverflowPolicy`]) and gives up as soon as
/// shutdown fires. Returns the number of messages queued.
async fn produce(
    mut stream: MessageStream,
    sender: RelayBufferSender,
    shutdown: ShutdownSignal,
    span: Span,
) -> u64 {
    let mut delivered = 0;

    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.fired() => break,
            message = stream.next() => match message {
                Some(message) => message,
                None => {
                    if shutdown.fire(ShutdownReason::BusClosed) {
                        error!(parent: &span, "NATS subscription ended unexpectedly");
                    }
                    break;
                }
            },
        };

        tokio::select! {
            biased;
            _ = shutdown.fired() => break,
            result = sender.enqueue(message) => match result {
                Ok(()) => delivered += 1,
                Err(e) if e.is_recoverable() => {}
                Err(e) => {
                    debug!(parent: &span, error = %e, "relay buffer closed, producer stopping");
                    break;
                }
            },
        }
    }

    debug!(parent: &span, delivered, "producer stopped");
    delivered
}

async fn close_sink<S: LogSink>(sink: &mut S, span: &Span) {
    match sink.close().await {
        Ok(()) => info!(parent: span, endpoint = %sink.endpoint(), "closed syslog connection"),
        Err(e) => warn!(parent: span, error = %e, "closing syslog connection failed"),
    }
}

async fn close_bus<B: MessageBus>(bus: &B, span: &Span) {
    match bus.close().await {
        Ok(()) => info!(parent: span, "closed NATS connection"),
        Err(e) => warn!(parent: span, error = %e, "closing NATS connection failed"),
    }
}
