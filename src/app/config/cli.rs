use super::{ConfigError, LogFormat, LogLevel};
use crate::buffer::OverflowPolicy;
use crate::bus::NatsConfig;
use crate::formatter::EntryFormat;
use crate::relay::RelaySettings;
use crate::sink::{SinkProtocol, SyslogConfig};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about = "Relay NATS messages to a remote syslog collector", long_about = None)]
#[serde(default)]
pub struct Config {
    /// The NATS server URI
    #[arg(long, env = "NATS_URI", default_value = "nats://localhost:4222")]
    pub nats_uri: String,

    /// The NATS subject to subscribe to (wildcards allowed)
    #[arg(long, env = "NATS_SUBJECT", default_value = ">")]
    pub nats_subject: String,

    /// The remote syslog server host:port
    #[arg(long, env = "SYSLOG_ENDPOINT", default_value = "localhost:514")]
    pub syslog_endpoint: String,

    /// Transport to the syslog server
    #[arg(long, env = "SYSLOG_PROTOCOL", default_value = "tcp")]
    pub syslog_protocol: SinkProtocol,

    /// Tag written in front of every syslog entry
    #[arg(long, env = "SYSLOG_TAG", default_value = "nats-to-syslog")]
    pub syslog_tag: String,

    /// Messages held between NATS delivery and syslog sending
    #[arg(long, env = "BUFFER_CAPACITY", default_value = "1000")]
    pub buffer_capacity: usize,

    /// Drop a message after waiting this long for buffer space (blocks forever if unset)
    #[arg(long, env = "OVERFLOW_TIMEOUT_MS")]
    pub overflow_timeout_ms: Option<u64>,

    /// Shape of the entries written to syslog
    #[arg(long, env = "ENTRY_FORMAT", default_value = "structured")]
    pub entry_format: EntryFormat,

    /// Connection timeout in seconds, for both NATS and syslog
    #[arg(long, env = "CONNECTION_TIMEOUT_SECS", default_value = "10")]
    pub connection_timeout_secs: u64,

    /// Syslog write timeout in seconds
    #[arg(long, env = "WRITE_TIMEOUT_SECS", default_value = "30")]
    pub write_timeout_secs: u64,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Extra per-target log directive, e.g. `async_nats=debug` (repeatable)
    #[arg(long = "log-directive")]
    pub log_directives: Vec<String>,

    /// Debug logging (overrides --log-level)
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// Configuration file path (optional, TOML)
    #[arg(long, env = "CONFIG_FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nats_uri: "nats://localhost:4222".to_string(),
            nats_subject: ">".to_string(),
            syslog_endpoint: "localhost:514".to_string(),
            syslog_protocol: SinkProtocol::Tcp,
            syslog_tag: "nats-to-syslog".to_string(),
            buffer_capacity: crate::buffer::DEFAULT_CAPACITY,
            overflow_timeout_ms: None,
            entry_format: EntryFormat::Structured,
            connection_timeout_secs: 10,
            write_timeout_secs: 30,
            log_level: LogLevel::Info,
            log_format: LogFormat::Text,
            log_directives: Vec::new(),
            debug: false,
            config_file: None,
        }
    }
}

impl Config {
    /// Parse flags (with env fallbacks). When `--config-file` is given, the
    /// file replaces the flag values.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::parse_from(args);

        if let Some(config_file) = &config.config_file {
            let mut from_file = Self::from_file(config_file)?;
            from_file.config_file = Some(config_file.clone());
            return Ok(from_file);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn effective_log_level(&self) -> LogLevel {
        if self.debug {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        OverflowPolicy::from_timeout_ms(self.overflow_timeout_ms)
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            subject: self.nats_subject.clone(),
            buffer_capacity: self.buffer_capacity,
            overflow_policy: self.overflow_policy(),
            entry_format: self.entry_format,
        }
    }

    pub fn syslog_config(&self) -> SyslogConfig {
        SyslogConfig {
            protocol: self.syslog_protocol,
            address: self.syslog_endpoint.clone(),
            tag: self.syslog_tag.clone(),
            connection_timeout: self.connection_timeout(),
            write_timeout: self.write_timeout(),
            ..SyslogConfig::default()
        }
    }

    pub fn nats_config(&self) -> NatsConfig {
        NatsConfig {
            uri: self.nats_uri.clone(),
            connection_timeout: self.connection_timeout(),
            name: self.syslog_tag.clone(),
        }
    }
}
