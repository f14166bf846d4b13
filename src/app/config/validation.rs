use super::{Config, ConfigError};
use crate::buffer::MAX_CAPACITY;
use url::Url;

const NATS_SCHEMES: [&str; 4] = ["nats", "tls", "ws", "wss"];

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate NATS URI
        let uri = Url::parse(&self.nats_uri).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid NATS URI '{}': {}", self.nats_uri, e))
        })?;
        if !NATS_SCHEMES.contains(&uri.scheme()) {
            return Err(ConfigError::InvalidUrl(format!(
                "Unsupported NATS URI scheme '{}' (expected one of {:?})",
                uri.scheme(),
                NATS_SCHEMES
            )));
        }

        // Validate subject
        if self.nats_subject.is_empty() || self.nats_subject.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidConfig(format!(
                "NATS subject '{}' must be non-empty and contain no whitespace",
                self.nats_subject
            )));
        }

        validate_endpoint(&self.syslog_endpoint)?;

        if self.syslog_tag.is_empty() || self.syslog_tag.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidConfig(format!(
                "Syslog tag '{}' must be non-empty and contain no whitespace",
                self.syslog_tag
            )));
        }

        // Validate buffer capacity
        if self.buffer_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "Buffer capacity must be greater than 0".to_string(),
            ));
        }
        if self.buffer_capacity > MAX_CAPACITY {
            return Err(ConfigError::InvalidConfig(format!(
                "Buffer capacity {} exceeds the maximum of {}",
                self.buffer_capacity, MAX_CAPACITY
            )));
        }

        if self.overflow_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "Overflow timeout must be greater than 0 (omit it to block)".to_string(),
            ));
        }

        // Validate timeouts
        if self.connection_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Connection timeout must be greater than 0".to_string(),
            ));
        }
        if self.write_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Write timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let invalid = || {
        ConfigError::InvalidConfig(format!(
            "Syslog endpoint '{endpoint}' must be host:port"
        ))
    };

    let (host, port) = endpoint.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }
    port.parse::<u16>().map_err(|_| invalid())?;
    Ok(())
}
