//! Client configuration and endpoint identity.
//!
//! The client consumes an already-resolved configuration value; it never
//! reads configuration files itself. One [`ClientConfig`] is built once,
//! wrapped in an `Arc`, and threaded into the tracker group, the pool
//! registry, and every client instance.

use std::fmt;
use std::time::Duration;

use crate::errors::{Error, Result};

/// A network endpoint identified by host and port.
///
/// Endpoints are the keys of the connection-pool registry; equality and
/// hashing go by host and port only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates an endpoint from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses a "host:port" string.
    pub fn parse(addr: &str) -> Result<Self> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("endpoint {addr:?} is not in host:port form")))?;
        let host = host.trim();
        if host.is_empty() {
            return Err(Error::Config(format!("endpoint {addr:?} has an empty host")));
        }
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("endpoint {addr:?} has an invalid port")))?;
        Ok(Self::new(host, port))
    }

    /// The host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connection-pool limits, applied per endpoint.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Whether pooling is enabled at all. When disabled every acquire opens
    /// a fresh transport and every release closes it.
    pub enabled: bool,
    /// Maximum live connections per endpoint; 0 means unlimited.
    pub max_per_endpoint: usize,
    /// A pooled connection idle longer than this is destroyed on acquire.
    pub max_idle_time: Duration,
    /// How long an acquire may wait for a free slot before failing.
    pub max_wait_time: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_endpoint: 100,
            max_idle_time: Duration::from_secs(3600),
            max_wait_time: Duration::from_millis(1000),
        }
    }
}

/// Resolved client configuration.
///
/// # Example
///
/// ```
/// use dfstore::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::from_tracker_addrs(&["192.168.1.10:22122"])
///     .unwrap()
///     .with_connect_timeout(Duration::from_secs(2))
///     .with_max_per_endpoint(8);
/// assert_eq!(config.tracker_endpoints.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Tracker endpoints, rotated round-robin across calls.
    pub tracker_endpoints: Vec<Endpoint>,
    /// Timeout for establishing a TCP connection.
    pub connect_timeout: Duration,
    /// Idle timeout applied to every read and write on a connection.
    pub network_timeout: Duration,
    /// Per-endpoint connection-pool limits.
    pub pool: PoolConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tracker_endpoints: Vec::new(),
            connect_timeout: Duration::from_secs(5),
            network_timeout: Duration::from_secs(30),
            pool: PoolConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with the given tracker endpoints and
    /// defaults for everything else.
    pub fn new(tracker_endpoints: Vec<Endpoint>) -> Self {
        Self {
            tracker_endpoints,
            ..Default::default()
        }
    }

    /// Creates a configuration from "host:port" tracker addresses.
    pub fn from_tracker_addrs<S: AsRef<str>>(addrs: &[S]) -> Result<Self> {
        let endpoints = addrs
            .iter()
            .map(|a| Endpoint::parse(a.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(endpoints))
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the network read/write timeout.
    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    /// Disables connection pooling.
    pub fn with_pool_disabled(mut self) -> Self {
        self.pool.enabled = false;
        self
    }

    /// Sets the per-endpoint connection cap; 0 means unlimited.
    pub fn with_max_per_endpoint(mut self, max: usize) -> Self {
        self.pool.max_per_endpoint = max;
        self
    }

    /// Sets the pooled-connection idle limit.
    pub fn with_max_idle_time(mut self, max_idle: Duration) -> Self {
        self.pool.max_idle_time = max_idle;
        self
    }

    /// Sets the pool-acquire wait limit.
    pub fn with_max_wait_time(mut self, max_wait: Duration) -> Self {
        self.pool.max_wait_time = max_wait;
        self
    }
}
