use super::{LogSink, SinkError, SinkStats, SinkStatsSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{Span, debug};

/// Syslog severity `info`. Every relayed entry is logged at this level.
pub const SEVERITY_INFO: u8 = 6;

/// Transport used to reach the syslog collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkProtocol {
    /// Persistent stream connection, one line per entry
    #[default]
    Tcp,
    /// One datagram per entry
    Udp,
}

#[derive(Debug, Clone)]
pub struct SyslogConfig {
    pub protocol: SinkProtocol,
    pub address: String,
    pub tag: String,
    pub facility: u8,
    pub connection_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            protocol: SinkProtocol::Tcp,
            address: "localhost:514".to_string(),
            tag: "nats-to-syslog".to_string(),
            facility: 0,
            connection_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(30),
        }
    }
}

impl SyslogConfig {
    pub fn priority(&self) -> u8 {
        (self.facility << 3) | SEVERITY_INFO
    }
}

enum Transport {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// Header fields that stay fixed for the lifetime of a connection.
#[derive(Debug, Clone)]
struct LineHeader {
    priority: u8,
    hostname: String,
    tag: String,
    pid: u32,
}

/// Build one RFC 3164-style line: `<PRI>TIMESTAMP HOST TAG[PID]: MSG\n`.
///
/// A newline is appended only when `message` does not already end with one.
pub fn frame_line<Tz: TimeZone>(
    priority: u8,
    timestamp: &DateTime<Tz>,
    hostname: &str,
    tag: &str,
    pid: u32,
    message: &[u8],
) -> Vec<u8>
where
    Tz::Offset: std::fmt::Display,
{
    let header = format!(
        "<{priority}>{} {hostname} {tag}[{pid}]: ",
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    let mut line = Vec::with_capacity(header.len() + message.len() + 1);
    line.extend_from_slice(header.as_bytes());
    line.extend_from_slice(message);
    if !message.ends_with(b"\n") {
        line.push(b'\n');
    }
    line
}

async fn open_transport(protocol: SinkProtocol, endpoint: &str) -> std::io::Result<Transport> {
    match protocol {
        SinkProtocol::Tcp => TcpStream::connect(endpoint).await.map(Transport::Tcp),
        SinkProtocol::Udp => {
            let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
            socket.connect(endpoint).await?;
            Ok(Transport::Udp(socket))
        }
    }
}

/// Connection to a remote syslog collector.
pub struct SyslogSink {
    transport: Option<Transport>,
    header: LineHeader,
    endpoint: String,
    write_timeout: Duration,
    stats: SinkStats,
    span: Span,
}

impl SyslogSink {
    /// Open the connection. For TCP this performs the full handshake, so an
    /// unreachable collector fails here rather than on the first send.
    pub async fn dial(config: &SyslogConfig, span: Span) -> Result<Self, SinkError> {
        if config.address.trim().is_empty() {
            return Err(SinkError::InvalidConfiguration(
                "syslog endpoint must not be empty".to_string(),
            ));
        }
        if config.facility > 23 {
            return Err(SinkError::InvalidConfiguration(format!(
                "syslog facility {} is out of range (0-23)",
                config.facility
            )));
        }

        let endpoint = config.address.clone();
        let connect = open_transport(config.protocol, &endpoint);
        let transport = timeout(config.connection_timeout, connect)
            .await
            .map_err(|_| SinkError::ConnectTimeout {
                endpoint: endpoint.clone(),
                timeout: config.connection_timeout,
            })?
            .map_err(|source| SinkError::ConnectionFailed {
                endpoint: endpoint.clone(),
                source,
            })?;

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());

        debug!(
            parent: &span,
            endpoint = %endpoint,
            protocol = ?config.protocol,
            hostname = %hostname,
            "syslog connection established"
        );

        Ok(Self {
            transport: Some(transport),
            header: LineHeader {
                priority: config.priority(),
                hostname,
                tag: config.tag.clone(),
                pid: std::process::id(),
            },
            endpoint,
            write_timeout: config.write_timeout,
            stats: SinkStats::new(),
            span,
        })
    }

    fn frame(&self, entry: &[u8]) -> Vec<u8> {
        frame_line(
            self.header.priority,
            &Local::now(),
            &self.header.hostname,
            &self.header.tag,
            self.header.pid,
            entry,
        )
    }
}

#[async_trait]
impl LogSink for SyslogSink {
    async fn send(&mut self, entry: &[u8]) -> Result<(), SinkError> {
        let line = self.frame(entry);
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| SinkError::Closed(self.endpoint.clone()))?;

        let start = Instant::now();
        let write = async {
            match transport {
                Transport::Tcp(stream) => stream.write_all(&line).await,
                Transport::Udp(socket) => socket.send(&line).await.map(|_| ()),
            }
        };

        let result = match timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(SinkError::WriteFailed {
                endpoint: self.endpoint.clone(),
                source,
            }),
            Err(_) => Err(SinkError::WriteTimeout {
                endpoint: self.endpoint.clone(),
                timeout: self.write_timeout,
            }),
        };

        self.stats
            .record_write(result.is_ok(), line.len(), start.elapsed());
        result
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        let result = match self.transport.take() {
            Some(Transport::Tcp(mut stream)) => {
                stream
                    .shutdown()
                    .await
                    .map_err(|source| SinkError::WriteFailed {
                        endpoint: self.endpoint.clone(),
                        source,
                    })
            }
            Some(Transport::Udp(_)) | None => Ok(()),
        };
        debug!(parent: &self.span, endpoint = %self.endpoint, "syslog connection closed");
        result
    }

    fn stats(&self) -> Option<SinkStatsSnapshot> {
        Some(self.stats.snapshot())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
