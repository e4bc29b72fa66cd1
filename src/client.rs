//! Shared cluster state and client construction.
//!
//! A [`Cluster`] holds the immutable configuration, the tracker group, and
//! the connection-pool registry. Those three are the only things client
//! instances share: callers needing parallelism mint one client per task.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::errors::Result;
use crate::pool::PoolRegistry;
use crate::storage::StorageClient;
use crate::tracker::{TrackerClient, TrackerGroup};

/// Entry point tying configuration, tracker group, and pool registry
/// together.
///
/// # Example
///
/// ```no_run
/// use dfstore::{ClientConfig, Cluster};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::from_tracker_addrs(&["192.168.1.100:22122"])?;
///     let cluster = Cluster::new(config)?;
///
///     let mut storage = cluster.storage_client();
///     let file = storage.upload_buffer(None, b"hello", "txt", None).await?;
///     let content = storage.download_bytes(&file).await?;
///     assert_eq!(&content[..], b"hello");
///     storage.delete_file(&file).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Cluster {
    config: Arc<ClientConfig>,
    trackers: Arc<TrackerGroup>,
    pools: Arc<PoolRegistry>,
}

impl Cluster {
    /// Validates the configuration and builds the shared state.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let config = Arc::new(config);
        let trackers = Arc::new(TrackerGroup::from_config(&config)?);
        let pools = Arc::new(PoolRegistry::new(config.clone()));
        Ok(Self {
            config,
            trackers,
            pools,
        })
    }

    /// The resolved configuration this cluster was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The shared tracker group.
    pub fn trackers(&self) -> &Arc<TrackerGroup> {
        &self.trackers
    }

    /// The shared connection-pool registry.
    pub fn pools(&self) -> &Arc<PoolRegistry> {
        &self.pools
    }

    /// Mints a tracker client for cluster queries and administration.
    pub fn tracker_client(&self) -> TrackerClient {
        TrackerClient::new(self.trackers.clone(), self.pools.clone())
    }

    /// Mints a storage client for file operations.
    ///
    /// Each task should hold its own instance; only the state inside the
    /// cluster is shared.
    pub fn storage_client(&self) -> StorageClient {
        StorageClient::new(self.pools.clone(), self.tracker_client())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_rejects_empty_tracker_list() {
        assert!(Cluster::new(ClientConfig::default()).is_err());
    }

    #[test]
    fn cluster_clones_share_the_pool_registry() {
        let config = ClientConfig::from_tracker_addrs(&["127.0.0.1:22122"]).unwrap();
        let cluster = Cluster::new(config).unwrap();
        let other = cluster.clone();
        assert!(Arc::ptr_eq(cluster.pools(), other.pools()));
        assert!(Arc::ptr_eq(cluster.trackers(), other.trackers()));
    }
}
