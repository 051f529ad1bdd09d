//! Zabbix sender protocol framing.
//!
//! Every message on the trapper port is framed as:
//!
//! ```text
//! +------+-------+----------------------+-------------------+
//! | ZBXD | flags | data length (u64 LE) | JSON payload      |
//! | 4 B  | 1 B   | 8 B                  | data length bytes |
//! +------+-------+----------------------+-------------------+
//! ```
//!
//! Only the plain (`0x01`) flag is produced and accepted. Compressed and
//! large-packet responses are rejected as protocol errors.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::metric::Metric;
use crate::sender::SenderError;

/// Protocol magic.
pub const MAGIC: &[u8; 4] = b"ZBXD";

/// Standard protocol flag.
pub const FLAG_PROTOCOL: u8 = 0x01;

/// Compression flag (not supported).
pub const FLAG_COMPRESSED: u8 = 0x02;

/// Large packet flag (not supported).
pub const FLAG_LARGE: u8 = 0x04;

/// Header size: magic, flags and 8 length bytes.
pub const HEADER_LEN: usize = 13;

/// Upper bound on an accepted response body.
pub const MAX_RESPONSE_LEN: u64 = 16 * 1024 * 1024;

/// Request type for trapper items.
const SENDER_DATA: &str = "sender data";

#[derive(Serialize)]
struct SenderRequest<'a> {
    request: &'static str,
    data: &'a [Metric],
}

#[derive(Deserialize)]
struct RawResponse {
    response: String,
    #[serde(default)]
    info: String,
}

/// Parsed server reply to a `sender data` request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SenderResponse {
    /// Values accepted by the server.
    pub processed: u64,
    /// Values rejected (unknown host/item, wrong type, ...).
    pub failed: u64,
    /// Values received.
    pub total: u64,
    /// Server-side processing time.
    pub seconds_spent: f64,
    /// Number of requests aggregated into this response.
    pub chunks: u64,
}

impl SenderResponse {
    /// Accumulate another response into this one.
    pub fn merge(&mut self, other: &SenderResponse) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.total += other.total;
        self.seconds_spent += other.seconds_spent;
        self.chunks += other.chunks;
    }
}

/// Frame a payload with the protocol header.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(MAGIC);
    buf.push(FLAG_PROTOCOL);
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Build a framed `sender data` request for a batch of metrics.
pub fn encode_request(metrics: &[Metric]) -> Result<Vec<u8>, SenderError> {
    let body = serde_json::to_vec(&SenderRequest {
        request: SENDER_DATA,
        data: metrics,
    })?;
    Ok(frame(&body))
}

/// Validate a response header and return the body length.
pub fn parse_header(header: &[u8; HEADER_LEN]) -> Result<u64, SenderError> {
    if &header[..4] != MAGIC {
        return Err(SenderError::Protocol(format!(
            "Invalid response header: {:02x?}",
            &header[..4]
        )));
    }

    let flags = header[4];
    if flags & FLAG_PROTOCOL == 0 {
        return Err(SenderError::Protocol(format!(
            "Unknown protocol flags: {:#04x}",
            flags
        )));
    }
    if flags & (FLAG_COMPRESSED | FLAG_LARGE) != 0 {
        return Err(SenderError::Protocol(format!(
            "Unsupported protocol flags: {:#04x}",
            flags
        )));
    }

    let mut len = [0u8; 8];
    len.copy_from_slice(&header[5..]);
    let len = u64::from_le_bytes(len);

    if len > MAX_RESPONSE_LEN {
        return Err(SenderError::Protocol(format!(
            "Response too large: {} bytes",
            len
        )));
    }

    Ok(len)
}

/// Read and decode one framed response.
pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> Result<SenderResponse, SenderError> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let len = parse_header(&header)?;

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    decode_response(&body)
}

/// Decode a response body. A `response` other than `success` is an error.
pub fn decode_response(body: &[u8]) -> Result<SenderResponse, SenderError> {
    let raw: RawResponse = serde_json::from_slice(body)
        .map_err(|e| SenderError::Protocol(format!("Malformed response body: {}", e)))?;

    if raw.response != "success" {
        return Err(SenderError::Rejected {
            response: raw.response,
            info: raw.info,
        });
    }

    let mut response = parse_info(&raw.info);
    response.chunks = 1;
    Ok(response)
}

/// Parse the `info` string of a response.
///
/// Format: `processed: 1; failed: 0; total: 1; seconds spent: 0.000055`.
/// Unknown or malformed fields are ignored.
pub fn parse_info(info: &str) -> SenderResponse {
    let mut response = SenderResponse::default();

    for field in info.split(';') {
        let Some((name, value)) = field.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match name.trim() {
            "processed" => response.processed = value.parse().unwrap_or(0),
            "failed" => response.failed = value.parse().unwrap_or(0),
            "total" => response.total = value.parse().unwrap_or(0),
            "seconds spent" => response.seconds_spent = value.parse().unwrap_or(0.0),
            _ => {}
        }
    }

    response
}
