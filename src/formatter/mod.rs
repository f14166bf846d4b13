//! Turns bus messages into syslog entries.
//!
//! Formatting never fails the pipeline. A message that cannot be rendered is
//! logged once and replaced by the sentinel (empty) entry, which the
//! forwarder skips.

use crate::domain::BusMessage;
use bytes::Bytes;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Span, error};

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("payload on subject '{subject}' is not valid UTF-8: {source}")]
    InvalidUtf8 {
        subject: String,
        #[source]
        source: std::str::Utf8Error,
    },
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Shape of the entry written to syslog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryFormat {
    /// JSON record with `Data`, `Reply` and `Subject` keys.
    ///
    /// `Data` must be valid UTF-8. Messages carrying binary payloads are
    /// dropped in this shape; relay them with `--entry-format raw`.
    #[default]
    Structured,
    /// Payload bytes as-is
    Raw,
}

/// Wire representation of one message. Empty means "do not forward".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogEntry(Bytes);

impl LogEntry {
    pub fn sentinel() -> Self {
        Self(Bytes::new())
    }

    pub fn is_sentinel(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for LogEntry {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<Bytes> for LogEntry {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

// Key casing matches records already produced by earlier relays.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StructuredRecord<'a> {
    data: &'a str,
    reply: &'a str,
    subject: &'a str,
}

#[derive(Debug, Clone)]
pub struct EntryFormatter {
    format: EntryFormat,
    span: Span,
}

impl EntryFormatter {
    pub fn new(format: EntryFormat, span: Span) -> Self {
        Self { format, span }
    }

    /// Render a message, logging and returning the sentinel on failure.
    pub fn format(&self, message: &BusMessage) -> LogEntry {
        match self.try_format(message) {
            Ok(entry) => entry,
            Err(e) => {
                error!(
                    parent: &self.span,
                    error = %e,
                    subject = %message.subject,
                    payload_len = message.payload_len(),
                    data = %String::from_utf8_lossy(&message.payload),
                    "formatting log entry failed, dropping message"
                );
                LogEntry::sentinel()
            }
        }
    }

    pub fn try_format(&self, message: &BusMessage) -> Result<LogEntry, FormatError> {
        match self.format {
            EntryFormat::Raw => Ok(LogEntry::from(message.payload.clone())),
            EntryFormat::Structured => {
                let data = std::str::from_utf8(&message.payload).map_err(|source| {
                    FormatError::InvalidUtf8 {
                        subject: message.subject.clone(),
                        source,
                    }
                })?;
                let record = StructuredRecord {
                    data,
                    reply: message.reply_to.as_deref().unwrap_or(""),
                    subject: &message.subject,
                };
                Ok(LogEntry::from(serde_json::to_vec(&record)?))
            }
        }
    }
}
