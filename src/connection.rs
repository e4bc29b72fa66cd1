//! A single TCP connection to a tracker or storage node.
//!
//! Connections are exclusively owned between pool acquire and
//! release/discard. Every read and write runs under the configured network
//! timeout; any transport failure marks the connection broken so the pool
//! never hands it out again.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{ClientConfig, Endpoint};
use crate::errors::{Error, Result};
use crate::protocol::{self, PROTO_HEADER_LEN};
use crate::types::FrameHeader;

/// One live transport bound to one endpoint.
pub struct Connection {
    stream: TcpStream,
    endpoint: Endpoint,
    network_timeout: Duration,
    last_active: Instant,
    needs_active_test: bool,
    broken: bool,
}

impl Connection {
    /// Opens a new transport, honoring the connect timeout.
    pub(crate) async fn open(endpoint: &Endpoint, config: &ClientConfig) -> Result<Self> {
        let connect = TcpStream::connect((endpoint.host(), endpoint.port()));
        match timeout(config.connect_timeout, connect).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(Self {
                    stream,
                    endpoint: endpoint.clone(),
                    network_timeout: config.network_timeout,
                    last_active: Instant::now(),
                    needs_active_test: false,
                    broken: false,
                })
            }
            Ok(Err(source)) => Err(Error::Network {
                operation: "connect",
                endpoint: endpoint.to_string(),
                source,
            }),
            Err(_) => Err(Error::ConnectTimeout {
                endpoint: endpoint.to_string(),
                timeout: config.connect_timeout,
            }),
        }
    }

    /// The endpoint this connection is bound to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    pub(crate) fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub(crate) fn is_broken(&self) -> bool {
        self.broken
    }

    pub(crate) fn needs_active_test(&self) -> bool {
        self.needs_active_test
    }

    pub(crate) fn set_needs_active_test(&mut self, flag: bool) {
        self.needs_active_test = flag;
    }

    /// Writes the whole buffer, honoring the network timeout.
    pub(crate) async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match timeout(self.network_timeout, self.stream.write_all(data)).await {
            Ok(Ok(())) => {
                self.last_active = Instant::now();
                Ok(())
            }
            Ok(Err(source)) => {
                self.broken = true;
                Err(Error::Network {
                    operation: "write",
                    endpoint: self.endpoint.to_string(),
                    source,
                })
            }
            Err(_) => {
                self.broken = true;
                Err(Error::NetworkTimeout {
                    operation: "write",
                    endpoint: self.endpoint.to_string(),
                })
            }
        }
    }

    /// Reads exactly `len` bytes, honoring the network timeout.
    pub(crate) async fn read_exact(&mut self, len: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; len];
        match timeout(self.network_timeout, self.stream.read_exact(&mut buf)).await {
            Ok(Ok(_)) => {
                self.last_active = Instant::now();
                Ok(Bytes::from(buf))
            }
            Ok(Err(source)) => {
                self.broken = true;
                Err(Error::Network {
                    operation: "read",
                    endpoint: self.endpoint.to_string(),
                    source,
                })
            }
            Err(_) => {
                self.broken = true;
                Err(Error::NetworkTimeout {
                    operation: "read",
                    endpoint: self.endpoint.to_string(),
                })
            }
        }
    }

    /// Reads up to `buf.len()` bytes; 0 means the peer closed the stream.
    pub(crate) async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        match timeout(self.network_timeout, self.stream.read(buf)).await {
            Ok(Ok(n)) => {
                self.last_active = Instant::now();
                Ok(n)
            }
            Ok(Err(source)) => {
                self.broken = true;
                Err(Error::Network {
                    operation: "read",
                    endpoint: self.endpoint.to_string(),
                    source,
                })
            }
            Err(_) => {
                self.broken = true;
                Err(Error::NetworkTimeout {
                    operation: "read",
                    endpoint: self.endpoint.to_string(),
                })
            }
        }
    }

    /// Receives a frame header, validating the command byte and, when
    /// `expect_len` is given, the exact body length.
    ///
    /// A nonzero status byte is returned to the caller as-is; no body
    /// follows an error status.
    pub(crate) async fn recv_header(
        &mut self,
        expect_cmd: u8,
        expect_len: Option<u64>,
    ) -> Result<FrameHeader> {
        let raw = self.read_exact(PROTO_HEADER_LEN).await?;
        let header = protocol::parse_header(&raw)?;
        if header.cmd != expect_cmd {
            self.broken = true;
            return Err(Error::Protocol(format!(
                "unexpected response command {}, expected {}",
                header.cmd, expect_cmd
            )));
        }
        if header.status != 0 {
            return Ok(header);
        }
        if header.length > i64::MAX as u64 {
            self.broken = true;
            return Err(Error::Protocol(format!(
                "invalid response body length {}",
                header.length
            )));
        }
        if let Some(expected) = expect_len {
            if header.length != expected {
                self.broken = true;
                return Err(Error::Protocol(format!(
                    "response body length {} does not match expected {}",
                    header.length, expected
                )));
            }
        }
        Ok(header)
    }

    /// Receives a whole frame: header plus exactly `length` body bytes.
    ///
    /// A nonzero status surfaces as a server error; the exchange is still
    /// clean and the connection stays reusable.
    pub(crate) async fn recv_package(
        &mut self,
        expect_cmd: u8,
        expect_len: Option<u64>,
    ) -> Result<Bytes> {
        let header = self.recv_header(expect_cmd, expect_len).await?;
        header.ensure_ok()?;
        if header.length == 0 {
            return Ok(Bytes::new());
        }
        self.read_exact(header.length as usize).await
    }

    /// Writes a whole request and receives the whole response frame.
    pub(crate) async fn request(
        &mut self,
        request: &[u8],
        expect_cmd: u8,
        expect_len: Option<u64>,
    ) -> Result<Bytes> {
        self.write_all(request).await?;
        self.recv_package(expect_cmd, expect_len).await
    }

    /// Lightweight no-op exchange confirming the peer still serves this
    /// connection.
    pub(crate) async fn active_test(&mut self) -> Result<()> {
        let header = protocol::pack_header(protocol::PROTO_CMD_ACTIVE_TEST, 0, 0);
        self.write_all(&header).await?;
        let response = self.recv_header(protocol::PROTO_CMD_RESP, Some(0)).await?;
        response.ensure_ok()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("broken", &self.broken)
            .field("needs_active_test", &self.needs_active_test)
            .finish()
    }
}
