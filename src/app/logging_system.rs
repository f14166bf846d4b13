use super::config::{LogFormat, LogLevel};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log level '{input}'. Valid levels: {valid_levels:?}")]
    InvalidLogLevel {
        input: String,
        valid_levels: Vec<String>,
    },
    #[error("Invalid log directive '{input}', expected 'target=level'")]
    InvalidDirectiveFormat { input: String },
    #[error("Empty target in log directive '{input}'")]
    EmptyTarget { input: String },
    #[error("Logging initialization failed: {details}")]
    InitFailed {
        details: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// What to do with a directive that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    UseDefaultLevel,
    SkipDirective,
    Abort,
}

impl LoggingError {
    pub fn fallback_strategy(&self) -> FallbackStrategy {
        match self {
            LoggingError::InvalidLogLevel { .. } => FallbackStrategy::UseDefaultLevel,
            LoggingError::InvalidDirectiveFormat { .. } | LoggingError::EmptyTarget { .. } => {
                FallbackStrategy::SkipDirective
            }
            LoggingError::InitFailed { .. } => FallbackStrategy::Abort,
        }
    }
}

/// A per-target filter such as `async_nats=warn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDirective {
    pub target: String,
    pub level: LogLevel,
}

impl LogDirective {
    pub fn new(target: impl Into<String>, level: LogLevel) -> Self {
        Self {
            target: target.into(),
            level,
        }
    }

    pub fn parse(directive: &str) -> Result<Self, LoggingError> {
        let Some((target, level)) = directive.split_once('=') else {
            return Err(LoggingError::InvalidDirectiveFormat {
                input: directive.to_string(),
            });
        };
        if level.contains('=') {
            return Err(LoggingError::InvalidDirectiveFormat {
                input: directive.to_string(),
            });
        }

        let target = target.trim();
        if target.is_empty() {
            return Err(LoggingError::EmptyTarget {
                input: directive.to_string(),
            });
        }

        let level = level
            .parse::<LogLevel>()
            .map_err(|_| LoggingError::InvalidLogLevel {
                input: level.to_string(),
                valid_levels: LogLevel::VALID.iter().map(|s| s.to_string()).collect(),
            })?;

        Ok(LogDirective::new(target, level))
    }

    pub fn to_filter_string(&self) -> String {
        format!("{}={}", self.target, self.level.as_str())
    }
}

pub struct LoggingSystem {
    directives: Arc<RwLock<Vec<LogDirective>>>,
    fallback_level: LogLevel,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self {
            directives: Arc::new(RwLock::new(Vec::new())),
            fallback_level: LogLevel::Info,
        }
    }

    /// Add a user directive. Malformed input is reported on stderr and
    /// either skipped or demoted to the fallback level; logging is not up yet.
    pub fn add_directive(&self, directive_str: &str) -> Result<(), LoggingError> {
        match LogDirective::parse(directive_str) {
            Ok(directive) => {
                self.directives.write().push(directive);
                Ok(())
            }
            Err(e) => match e.fallback_strategy() {
                FallbackStrategy::UseDefaultLevel => {
                    eprintln!("Warning: {e}, using default level");
                    let target = directive_str.split('=').next().unwrap_or_default().trim();
                    self.directives
                        .write()
                        .push(LogDirective::new(target, self.fallback_level));
                    Ok(())
                }
                FallbackStrategy::SkipDirective => {
                    eprintln!("Warning: {e}, skipping directive");
                    Ok(())
                }
                FallbackStrategy::Abort => Err(e),
            },
        }
    }

    /// Quiet the NATS client's connection chatter unless asked for.
    pub fn add_default_directives(&self) {
        let mut directives = self.directives.write();
        for target in ["async_nats", "rustls"] {
            directives.push(LogDirective::new(target, LogLevel::Warn));
        }
    }

    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        let directives = self.directives.read();

        let mut filter_parts = Vec::with_capacity(directives.len() + 1);
        filter_parts.push(default_level.as_str().to_string());
        filter_parts.extend(directives.iter().map(LogDirective::to_filter_string));

        filter_parts.join(",")
    }

    pub fn initialize(&self, default_level: LogLevel, format: LogFormat) -> Result<(), LoggingError> {
        let filter_string = self.build_filter_string(default_level);
        let env_filter =
            EnvFilter::try_new(&filter_string).map_err(|e| LoggingError::InitFailed {
                details: format!("Failed to create EnvFilter with '{filter_string}'"),
                source: Box::new(e),
            })?;

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = match format {
            LogFormat::Text => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };

        result.map_err(|e| LoggingError::InitFailed {
            details: "Failed to set global tracing subscriber".to_string(),
            source: Box::new(e),
        })
    }

    pub fn directive_count(&self) -> usize {
        self.directives.read().len()
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global subscriber for the relay's own diagnostics.
pub fn setup_logging(
    level: LogLevel,
    format: LogFormat,
    extra_directives: &[String],
) -> Result<(), LoggingError> {
    let system = LoggingSystem::new();
    system.add_default_directives();
    for directive in extra_directives {
        system.add_directive(directive)?;
    }
    system.initialize(level, format)
}
