use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio_util::sync::CancellationToken;
use tracing::{Span, error, info, warn};

/// Why the relay is stopping. Only the first reason is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM
    Signal(&'static str),
    /// The sink rejected a write
    SendFailure,
    /// The bus subscription ended while the relay was running
    BusClosed,
}

impl ShutdownReason {
    pub fn is_graceful(&self) -> bool {
        matches!(self, ShutdownReason::Signal(_))
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_graceful() { 0 } else { 1 }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {name}"),
            ShutdownReason::SendFailure => f.write_str("syslog send failed"),
            ShutdownReason::BusClosed => f.write_str("NATS subscription closed"),
        }
    }
}

/// Single-fire shutdown event shared by every task of the relay.
///
/// `fire` stores the reason in a guarded slot and cancels a broadcast token.
/// Only the first call wins; later calls return `false` and change nothing.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    reason: Arc<Mutex<Option<ShutdownReason>>>,
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self, reason: ShutdownReason) -> bool {
        {
            let mut slot = self.reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
        }
        self.token.cancel();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().clone()
    }

    /// Resolves once the signal has fired.
    pub async fn fired(&self) {
        self.token.cancelled().await;
    }

    /// Wait for the signal and return the reason that fired it.
    pub async fn wait(&self) -> ShutdownReason {
        self.fired().await;
        // fire() fills the slot before cancelling the token, and the token
        // is never handed out, so the slot is always set here.
        self.reason().unwrap_or(ShutdownReason::BusClosed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelayState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl RelayState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RelayState::Starting,
            1 => RelayState::Running,
            2 => RelayState::Stopping,
            _ => RelayState::Stopped,
        }
    }
}

/// Lifecycle state shared between the coordinator and observers.
#[derive(Debug, Clone)]
pub struct StateCell {
    state: Arc<AtomicU8>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(RelayState::Starting as u8)),
        }
    }

    pub fn get(&self) -> RelayState {
        RelayState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn mark_running(&self) -> bool {
        self.transition(RelayState::Starting, RelayState::Running)
    }

    /// `Running -> Stopping`. Returns `false` if teardown already began, so
    /// the caller must not run it again.
    pub(crate) fn begin_stopping(&self) -> bool {
        self.transition(RelayState::Running, RelayState::Stopping)
    }

    pub(crate) fn mark_stopped(&self) -> bool {
        self.transition(RelayState::Stopping, RelayState::Stopped)
    }

    fn transition(&self, from: RelayState, to: RelayState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Fire `shutdown` on SIGINT or SIGTERM.
///
/// Runs until a signal arrives or the shutdown fires for another reason.
pub async fn listen_for_signals(shutdown: ShutdownSignal, span: Span) {
    tokio::select! {
        name = wait_for_signal(&span) => {
            if let Some(name) = name {
                info!(parent: &span, signal = name, "signal caught, initiating shutdown");
                shutdown.fire(ShutdownReason::Signal(name));
            }
        }
        _ = shutdown.fired() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal(span: &Span) -> Option<&'static str> {
    let mut sigterm = match unix_signal(SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(err) => {
            warn!(parent: span, error = %err, "failed to install SIGTERM handler");
            None
        }
    };

    let sigterm_recv = async {
        match sigterm.as_mut() {
            Some(sigterm) => sigterm.recv().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => Some("SIGINT"),
            Err(err) => {
                error!(parent: span, error = %err, "failed to listen for SIGINT");
                std::future::pending().await
            }
        },
        _ = sigterm_recv => Some("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal(span: &Span) -> Option<&'static str> {
    match signal::ctrl_c().await {
        Ok(()) => Some("SIGINT"),
        Err(err) => {
            error!(parent: span, error = %err, "failed to listen for SIGINT");
            None
        }
    }
}
