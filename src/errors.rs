//! Error definitions for the dfstore client.
//!
//! Server-reported failures keep their numeric status code so callers can
//! react to specific conditions (missing file, busy node) the same way the
//! wire protocol expresses them.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for dfstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Server status codes, mirrored from errno values.
pub mod status_code {
    /// File or storage node not found
    pub const ENOENT: u8 = 2;
    /// Generic I/O failure on the server side
    pub const EIO: u8 = 5;
    /// Storage node is still online/active
    pub const EBUSY: u8 = 16;
    /// Malformed request
    pub const EINVAL: u8 = 22;
    /// No space left, also used as a capacity guard
    pub const ENOSPC: u8 = 28;
    /// Operation already performed
    pub const EALREADY: u8 = 114;
}

/// Base error type for all dfstore client failures
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration value is unusable (empty tracker list, bad endpoint)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// File id does not follow the "group/filename" form
    #[error("invalid file id: {0}")]
    InvalidFileId(String),

    /// A required argument is missing or empty
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Response frame violated the protocol (bad command or length)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server answered the exchange with a nonzero status code
    #[error("server error (status code {code})")]
    Server {
        /// The raw status byte from the response header
        code: u8,
    },

    /// Tracker query produced no usable storage node
    #[error("no storage node available")]
    NoStorageNode,

    /// Establishing the transport took longer than the connect timeout
    #[error("connect to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Server the client was connecting to
        endpoint: String,
        /// Configured connect timeout
        timeout: Duration,
    },

    /// A read or write sat idle longer than the network timeout
    #[error("network timeout during {operation} on {endpoint}")]
    NetworkTimeout {
        /// The operation that timed out ("read", "write")
        operation: &'static str,
        /// Server the connection was bound to
        endpoint: String,
    },

    /// Transport-level failure on an established connection
    #[error("network error during {operation} on {endpoint}: {source}")]
    Network {
        /// The operation that failed ("connect", "read", "write")
        operation: &'static str,
        /// Server the connection was bound to
        endpoint: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Pool acquire waited the full max-wait-time without a free slot
    #[error("connection pool for {endpoint} exhausted after waiting {waited:?}")]
    PoolExhausted {
        /// The endpoint whose pool is saturated
        endpoint: String,
        /// How long the acquire waited before giving up
        waited: Duration,
    },

    /// Local I/O error (content sources, download targets)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps a raw server status byte.
    pub fn server(code: u8) -> Self {
        Error::Server { code }
    }

    /// True when the server reported the file or node as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Server { code } if *code == status_code::ENOENT)
    }

    /// True when the server reported the target as busy (online/active).
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Server { code } if *code == status_code::EBUSY)
    }

    /// True when the server reported the operation as already performed.
    pub fn is_already_done(&self) -> bool {
        matches!(self, Error::Server { code } if *code == status_code::EALREADY)
    }

    /// Whether the connection's stream state is unknown after this error.
    ///
    /// Transport failures and protocol violations leave unread or unsent
    /// bytes on the wire; the connection must be destroyed rather than
    /// returned to the pool. A clean exchange ending in a server status
    /// code keeps the stream aligned and the connection reusable.
    pub(crate) fn poisons_connection(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_)
                | Error::Network { .. }
                | Error::NetworkTimeout { .. }
                | Error::Io(_)
        )
    }
}
