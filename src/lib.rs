#![warn(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
#![allow(
    clippy::cast_possible_truncation, // Durations and counters stay well within range
    clippy::cast_precision_loss,      // Acceptable for metrics/display
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,  // e.g. SinkError in sink module
    clippy::must_use_candidate
)]

pub mod app;
pub mod buffer;
pub mod bus;
pub mod domain;
pub mod formatter;
pub mod relay;
pub mod sink;

pub use app::{App, Config};
pub use domain::{BusMessage, RelayError};
pub use relay::{Relay, RelayOutcome, RelaySettings, ShutdownReason, ShutdownSignal};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
