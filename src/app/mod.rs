pub mod config;
pub mod logging_system;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use logging_system::{LogDirective, LoggingError, LoggingSystem, setup_logging};

use crate::bus::NatsBus;
use crate::domain::RelayError;
use crate::relay::{Relay, RelayOutcome, ShutdownSignal, listen_for_signals};
use crate::sink::SyslogSink;
use tracing::{Span, error, info, info_span};

pub struct App {
    config: Config,
    span: Span,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, RelayError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args(args)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        let span = info_span!("relay", subject = %config.nats_subject);
        Self { config, span }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run until a signal, a syslog send failure, or loss of the subscription.
    pub async fn run(self) -> Result<RelayOutcome, RelayError> {
        let shutdown = ShutdownSignal::new();
        let signals = tokio::spawn(listen_for_signals(
            shutdown.clone(),
            info_span!(parent: &self.span, "signals"),
        ));

        info!(
            parent: &self.span,
            nats_uri = %self.config.nats_uri,
            syslog_endpoint = %self.config.syslog_endpoint,
            "starting nats-to-syslog v{}",
            crate::VERSION
        );

        let syslog_config = self.config.syslog_config();
        let nats_config = self.config.nats_config();

        let dial_sink = async {
            SyslogSink::dial(&syslog_config, info_span!(parent: &self.span, "sink"))
                .await
                .map_err(|source| RelayError::SinkConnection {
                    endpoint: syslog_config.address.clone(),
                    source,
                })
        };
        let connect_bus = async {
            NatsBus::connect(&nats_config, info_span!(parent: &self.span, "bus"))
                .await
                .map_err(|source| RelayError::BusConnection {
                    uri: nats_config.uri.clone(),
                    source,
                })
        };

        let started = Relay::start(
            self.config.relay_settings(),
            shutdown.clone(),
            self.span.clone(),
            dial_sink,
            connect_bus,
        )
        .await;

        let relay = match started {
            Ok(relay) => relay,
            Err(e) => {
                signals.abort();
                return Err(e);
            }
        };

        let outcome = relay.run().await;
        signals.abort();
        Ok(outcome)
    }
}

/// Process entry point. Returns the exit status.
pub async fn main() -> u8 {
    let config = match Config::from_args(std::env::args_os()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return 1;
        }
    };

    if let Err(e) = setup_logging(
        config.effective_log_level(),
        config.log_format,
        &config.log_directives,
    ) {
        eprintln!("Failed to initialize logging: {e}");
        return 1;
    }

    match App::from_config(config).run().await {
        Ok(outcome) => {
            if outcome.exit_code() != 0 {
                error!(reason = %outcome.reason, "relay stopped abnormally");
            }
            u8::try_from(outcome.exit_code()).unwrap_or(1)
        }
        Err(e) => {
            error!(error = %e, "relay failed to start");
            1
        }
    }
}
