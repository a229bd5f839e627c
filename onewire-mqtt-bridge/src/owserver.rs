//! Client for the owserver network protocol.
//!
//! owserver (part of owfs) exposes the 1-Wire bus over TCP. Every request and
//! response starts with a 24-byte header of six big-endian `i32` fields:
//!
//! ```text
//! version | payload length | message type (request) / return code (response) | flags | size | offset
//! ```
//!
//! A request is followed by a NUL-terminated path, a response by `payload`
//! bytes of which the first `size` are the value. Responses with a negative
//! payload length are keep-alive pings sent while the server is busy.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

/// Default owserver TCP port.
pub const DEFAULT_OWSERVER_PORT: u16 = 4304;

/// Header length in bytes.
pub const HEADER_LEN: usize = 24;

/// No-op, used to probe the server.
pub const MSG_NOP: i32 = 1;
/// Read a property.
pub const MSG_READ: i32 = 2;
/// Check whether a path exists on the bus.
pub const MSG_PRESENCE: i32 = 6;

/// Marks the request as coming from an ownet client.
const FLG_OWNET: i32 = 0x0000_0100;

/// Largest value buffer requested from the server.
const READ_SIZE: i32 = 8192;

/// Largest payload accepted in a response.
const MAX_PAYLOAD: i32 = 65536;

/// `ENOENT`, returned (negated) for unknown devices or properties.
const ENOENT: i32 = 2;

/// Errors talking to owserver.
#[derive(Debug, Error)]
pub enum OwError {
    #[error("owserver I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("owserver request for '{path}' timed out after {timeout_ms}ms")]
    Timeout { path: String, timeout_ms: u64 },

    #[error("'{path}' not found on the bus")]
    NotFound { path: String },

    #[error("owserver returned error {code} for '{path}'")]
    Server { path: String, code: i32 },

    #[error("Malformed owserver response: {0}")]
    Malformed(String),
}

/// Message header shared by requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub version: i32,
    pub payload: i32,
    /// Message type in a request, return code in a response.
    pub kind: i32,
    pub flags: i32,
    pub size: i32,
    pub offset: i32,
}

impl Header {
    /// Request header for `msg_type` carrying `path`.
    pub fn request(msg_type: i32, path: &str, size: i32) -> Self {
        let payload = if path.is_empty() {
            0
        } else {
            path.len() as i32 + 1
        };

        Self {
            version: 0,
            payload,
            kind: msg_type,
            flags: FLG_OWNET,
            size,
            offset: 0,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let fields = [
            self.version,
            self.payload,
            self.kind,
            self.flags,
            self.size,
            self.offset,
        ];
        for (chunk, field) in buf.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&field.to_be_bytes());
        }
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        let field = |i: usize| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&buf[i * 4..i * 4 + 4]);
            i32::from_be_bytes(bytes)
        };

        Self {
            version: field(0),
            payload: field(1),
            kind: field(2),
            flags: field(3),
            size: field(4),
            offset: field(5),
        }
    }

    /// Keep-alive pings carry a negative payload length.
    pub fn is_ping(&self) -> bool {
        self.payload < 0
    }
}

/// A decoded owserver response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Return code; negative values are negated errno codes.
    pub ret: i32,
    pub data: Vec<u8>,
}

/// owserver client. Each request opens its own connection.
#[derive(Debug, Clone)]
pub struct OwServerClient {
    addr: String,
    timeout: Duration,
}

impl OwServerClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            timeout,
        }
    }

    /// `host:port` of the server.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Check that the server answers.
    pub async fn ping(&self) -> Result<(), OwError> {
        let response = self.transact(MSG_NOP, "", 0).await?;
        if response.ret < 0 {
            return Err(OwError::Server {
                path: String::new(),
                code: -response.ret,
            });
        }
        Ok(())
    }

    /// Read the property at `path`, with owserver's column padding trimmed.
    pub async fn read(&self, path: &str) -> Result<String, OwError> {
        let response = self.transact(MSG_READ, path, READ_SIZE).await?;

        match response.ret {
            ret if ret == -ENOENT => Err(OwError::NotFound {
                path: path.to_string(),
            }),
            ret if ret < 0 => Err(OwError::Server {
                path: path.to_string(),
                code: -ret,
            }),
            _ => Ok(String::from_utf8_lossy(&response.data).trim().to_string()),
        }
    }

    /// Whether `path` currently exists on the bus.
    pub async fn present(&self, path: &str) -> Result<bool, OwError> {
        let response = self.transact(MSG_PRESENCE, path, 0).await?;
        Ok(response.ret == 0)
    }

    /// Send one request and wait for its response, bounded by the client timeout.
    pub async fn transact(&self, msg_type: i32, path: &str, size: i32) -> Result<Response, OwError> {
        match tokio::time::timeout(self.timeout, self.exchange(msg_type, path, size)).await {
            Ok(result) => result,
            Err(_) => Err(OwError::Timeout {
                path: path.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn exchange(&self, msg_type: i32, path: &str, size: i32) -> Result<Response, OwError> {
        let mut stream = TcpStream::connect(&self.addr).await?;

        let header = Header::request(msg_type, path, size);
        let mut request = Vec::with_capacity(HEADER_LEN + header.payload as usize);
        request.extend_from_slice(&header.encode());
        if !path.is_empty() {
            request.extend_from_slice(path.as_bytes());
            request.push(0);
        }
        stream.write_all(&request).await?;
        trace!(addr = %self.addr, msg_type, path = %path, "Sent owserver request");

        loop {
            let mut buf = [0u8; HEADER_LEN];
            stream.read_exact(&mut buf).await?;
            let header = Header::decode(&buf);

            if header.is_ping() {
                trace!(path = %path, "owserver ping");
                continue;
            }

            if header.payload > MAX_PAYLOAD {
                return Err(OwError::Malformed(format!(
                    "payload of {} bytes exceeds {}",
                    header.payload, MAX_PAYLOAD
                )));
            }

            let mut data = vec![0u8; header.payload as usize];
            stream.read_exact(&mut data).await?;

            if header.size >= 0 && (header.size as usize) < data.len() {
                data.truncate(header.size as usize);
            }

            return Ok(Response {
                ret: header.kind,
                data,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header_layout() {
        let header = Header::request(MSG_READ, "/10.67C6697351FF/temperature", READ_SIZE);
        let bytes = header.encode();

        assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
        // Path length plus the NUL terminator.
        assert_eq!(&bytes[4..8], &29i32.to_be_bytes());
        assert_eq!(&bytes[8..12], &MSG_READ.to_be_bytes());
        assert_eq!(&bytes[12..16], &[0, 0, 1, 0]);
        assert_eq!(&bytes[16..20], &8192i32.to_be_bytes());
        assert_eq!(&bytes[20..24], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_nop_has_no_payload() {
        let header = Header::request(MSG_NOP, "", 0);
        assert_eq!(header.payload, 0);
    }

    #[test]
    fn test_decode_error_response() {
        let mut buf = [0u8; HEADER_LEN];
        buf[8..12].copy_from_slice(&(-ENOENT).to_be_bytes());

        let header = Header::decode(&buf);
        assert_eq!(header.kind, -2);
        assert_eq!(header.payload, 0);
        assert!(!header.is_ping());
    }

    #[test]
    fn test_ping_detection() {
        let header = Header {
            payload: -1,
            ..Header::default()
        };
        assert!(Header::decode(&header.encode()).is_ping());
    }

    #[test]
    fn test_client_addr() {
        let client = OwServerClient::new("owserver.local", DEFAULT_OWSERVER_PORT, Duration::from_secs(1));
        assert_eq!(client.addr(), "owserver.local:4304");
    }
}
