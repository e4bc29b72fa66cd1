//! dfstore client library
//!
//! Async Rust client for two-tier distributed file-storage clusters:
//! lightweight tracker nodes route requests and storage nodes hold file
//! content. The client resolves which storage node serves a request,
//! speaks the cluster's binary framing protocol over TCP, streams file
//! content without buffering it whole, and reuses connections through a
//! bounded per-endpoint pool.
//!
//! # Features
//!
//! - File upload (normal, appender, and slave files), streamed from
//!   buffers, local files, or arbitrary readers
//! - Append, modify, and truncate for appender files
//! - Download into memory, a writer, or a local file
//! - Metadata get/set with overwrite or merge semantics
//! - File information decoded from the filename where possible, with a
//!   live query fallback
//! - Tracker rotation and cluster administration (list groups, list
//!   storage nodes, delete a storage node)
//! - Bounded connection pooling with idle eviction and liveness re-checks
//!
//! # Example
//!
//! ```no_run
//! use dfstore::{ClientConfig, Cluster};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_tracker_addrs(&["192.168.1.100:22122"])?;
//!     let cluster = Cluster::new(config)?;
//!
//!     let mut storage = cluster.storage_client();
//!     let file = storage.upload_buffer(None, b"hello, cluster", "txt", None).await?;
//!     let data = storage.download_bytes(&file).await?;
//!     storage.delete_file(&file).await?;
//!     assert_eq!(&data[..], b"hello, cluster");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod config;
pub mod connection;
pub mod errors;
pub mod pool;
pub mod protocol;
pub mod stat;
pub mod storage;
pub mod tracker;
pub mod types;

pub use client::Cluster;
pub use config::{ClientConfig, Endpoint, PoolConfig};
pub use errors::{status_code, Error, Result};
pub use pool::{ConnectionManager, PoolRegistry, PoolStats};
pub use stat::{GroupStat, StorageStat};
pub use storage::StorageClient;
pub use tracker::{TrackerClient, TrackerGroup};
pub use types::{
    FileId, FileInfo, FileKind, Metadata, MetadataFlag, StorageCommand, StorageNode,
    StorageStatus, TrackerCommand,
};
