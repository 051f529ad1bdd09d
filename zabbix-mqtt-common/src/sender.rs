//! Zabbix trapper client.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::metric::Metric;
use crate::protocol::{SenderResponse, encode_request, read_response};

/// Default trapper port.
pub const DEFAULT_TRAPPER_PORT: u16 = 10051;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum number of metrics per request.
pub const DEFAULT_CHUNK_SIZE: usize = 250;

/// Errors returned by [`ZabbixSender`].
#[derive(Debug, Error)]
pub enum SenderError {
    #[error("Failed to connect to {server}: {source}")]
    Connect {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {timeout:?} talking to {server}")]
    Timeout { server: String, timeout: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server answered '{response}': {info}")]
    Rejected { response: String, info: String },

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid server address '{0}'")]
    InvalidAddress(String),

    #[error("No Zabbix server configured")]
    NoServers,
}

/// A trapper endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ServerAddr {
    type Err = SenderError;

    /// Parse `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6 address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || SenderError::InvalidAddress(s.to_string());

        if s.is_empty() {
            return Err(invalid());
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            if host.is_empty() {
                return Err(invalid());
            }
            let port = match tail {
                "" => DEFAULT_TRAPPER_PORT,
                _ => tail
                    .strip_prefix(':')
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(invalid)?,
            };
            return Ok(Self::new(host, port));
        }

        match s.matches(':').count() {
            0 => Ok(Self::new(s, DEFAULT_TRAPPER_PORT)),
            1 => {
                let (host, port) = s.split_once(':').ok_or_else(invalid)?;
                if host.is_empty() {
                    return Err(invalid());
                }
                let port = port.parse().map_err(|_| invalid())?;
                Ok(Self::new(host, port))
            }
            // Unbracketed IPv6 cannot carry a port.
            _ => Ok(Self::new(s, DEFAULT_TRAPPER_PORT)),
        }
    }
}

/// Client for the Zabbix sender protocol.
///
/// Holds no connection state: every request opens its own TCP connection,
/// so a single sender can be shared freely between tasks.
#[derive(Debug, Clone)]
pub struct ZabbixSender {
    servers: Vec<ServerAddr>,
    timeout: Duration,
    chunk_size: usize,
}

impl ZabbixSender {
    /// Create a sender for the given servers.
    pub fn new(servers: Vec<ServerAddr>) -> Self {
        Self {
            servers,
            timeout: DEFAULT_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Bound each request (connect, write and read) by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Limit how many metrics go into a single request.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn servers(&self) -> &[ServerAddr] {
        &self.servers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Send metrics to every configured server.
    ///
    /// Metrics are split into chunks of at most `chunk_size`. The first
    /// failing request aborts the send; nothing is retried.
    pub async fn send(&self, metrics: &[Metric]) -> Result<SenderResponse, SenderError> {
        if self.servers.is_empty() {
            return Err(SenderError::NoServers);
        }

        let mut total = SenderResponse::default();

        for chunk in metrics.chunks(self.chunk_size) {
            let request = encode_request(chunk)?;

            for server in &self.servers {
                let response = timeout(self.timeout, self.send_request(server, &request))
                    .await
                    .map_err(|_| SenderError::Timeout {
                        server: server.to_string(),
                        timeout: self.timeout,
                    })??;

                debug!(
                    server = %server,
                    processed = response.processed,
                    failed = response.failed,
                    total = response.total,
                    "Zabbix accepted request"
                );
                total.merge(&response);
            }
        }

        Ok(total)
    }

    async fn send_request(
        &self,
        server: &ServerAddr,
        request: &[u8],
    ) -> Result<SenderResponse, SenderError> {
        let mut stream = TcpStream::connect((server.host.as_str(), server.port))
            .await
            .map_err(|source| SenderError::Connect {
                server: server.to_string(),
                source,
            })?;

        trace!(server = %server, bytes = request.len(), "Sending request");

        stream.write_all(request).await?;
        stream.flush().await?;

        read_response(&mut stream).await
    }
}
