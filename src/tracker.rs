//! Tracker endpoint rotation and storage-node resolution.
//!
//! Trackers answer "which storage node serves this request" queries. The
//! group rotates through its endpoints round-robin without testing
//! connectivity up front; a dead tracker surfaces when the pool fails to
//! hand out a connection for it, which only affects that one call.

use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::config::{ClientConfig, Endpoint};
use crate::errors::{status_code, Error, Result};
use crate::pool::PoolRegistry;
use crate::protocol::{
    self, GROUP_NAME_MAX_LEN, IP_ADDR_SIZE, MAX_STORE_NODES_PER_QUERY, PKG_LEN_SIZE,
    PROTO_CMD_RESP, QUERY_FETCH_BODY_LEN, QUERY_STORE_BODY_LEN,
};
use crate::stat::{decode_records, GroupStat, StorageStat};
use crate::types::{StorageNode, StorageStatus, TrackerCommand};

/// Ordered tracker endpoints plus the shared rotation cursor.
pub struct TrackerGroup {
    endpoints: Vec<Endpoint>,
    cursor: Mutex<usize>,
}

impl TrackerGroup {
    /// Builds a group from a non-empty endpoint list.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::Config("tracker endpoint list is empty".to_string()));
        }
        Ok(Self {
            endpoints,
            cursor: Mutex::new(0),
        })
    }

    /// Builds a group from a configuration's tracker endpoints.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.tracker_endpoints.clone())
    }

    /// Advances the rotation cursor and returns the endpoint it lands on.
    pub fn select(&self) -> Endpoint {
        let mut cursor = self
            .cursor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cursor = (*cursor + 1) % self.endpoints.len();
        self.endpoints[*cursor].clone()
    }

    /// All endpoints, in configuration order.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Number of trackers in the group.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; construction rejects empty groups.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Client for tracker queries and administrative operations.
pub struct TrackerClient {
    group: Arc<TrackerGroup>,
    pools: Arc<PoolRegistry>,
}

impl TrackerClient {
    /// Creates a client over a shared tracker group and pool registry.
    pub fn new(group: Arc<TrackerGroup>, pools: Arc<PoolRegistry>) -> Self {
        Self { group, pools }
    }

    /// The tracker group this client rotates over.
    pub fn group(&self) -> &Arc<TrackerGroup> {
        &self.group
    }

    /// Resolves one writable storage node, optionally within a group.
    pub async fn resolve_store(&self, group_name: Option<&str>) -> Result<StorageNode> {
        let request = store_query_request(
            group_name,
            TrackerCommand::QueryStoreWithoutGroupOne,
            TrackerCommand::QueryStoreWithGroupOne,
        );
        let body = self
            .round_trip(&request, Some(QUERY_STORE_BODY_LEN as u64))
            .await?;
        Ok(decode_store_node(&body[GROUP_NAME_MAX_LEN..]))
    }

    /// Resolves every writable storage node of a group (or of the default
    /// group when none is given).
    pub async fn resolve_store_all(&self, group_name: Option<&str>) -> Result<Vec<StorageNode>> {
        let request = store_query_request(
            group_name,
            TrackerCommand::QueryStoreWithoutGroupAll,
            TrackerCommand::QueryStoreWithGroupAll,
        );
        let body = self.round_trip(&request, None).await?;
        if body.len() < QUERY_STORE_BODY_LEN {
            return Err(Error::Protocol(format!(
                "store-query response body too short: {} bytes",
                body.len()
            )));
        }
        let record_len = IP_ADDR_SIZE - 1 + PKG_LEN_SIZE;
        let records_len = body.len() - (GROUP_NAME_MAX_LEN + 1);
        if records_len % record_len != 0 {
            return Err(Error::Protocol(format!(
                "store-query response body length {} does not frame whole records",
                body.len()
            )));
        }
        let count = records_len / record_len;
        if count > MAX_STORE_NODES_PER_QUERY {
            return Err(Error::Protocol(format!(
                "store-query response carries {count} nodes, more than the protocol allows"
            )));
        }
        let store_path_index = body[body.len() - 1];
        let mut nodes = Vec::with_capacity(count);
        let mut offset = GROUP_NAME_MAX_LEN;
        for _ in 0..count {
            let ip = protocol::unpad_text(&body[offset..offset + IP_ADDR_SIZE - 1]);
            offset += IP_ADDR_SIZE - 1;
            let port = protocol::decode_u64(&body[offset..offset + PKG_LEN_SIZE]) as u16;
            offset += PKG_LEN_SIZE;
            nodes.push(StorageNode {
                endpoint: Endpoint::new(ip, port),
                store_path_index,
            });
        }
        Ok(nodes)
    }

    /// Resolves one readable storage node for a file.
    pub async fn resolve_fetch(&self, group_name: &str, remote_path: &str) -> Result<StorageNode> {
        let endpoints = self
            .query_storages(TrackerCommand::QueryFetchOne, group_name, remote_path)
            .await?;
        first_node(endpoints)
    }

    /// Resolves one updatable storage node for a file (delete, metadata).
    pub async fn resolve_update(&self, group_name: &str, remote_path: &str) -> Result<StorageNode> {
        let endpoints = self
            .query_storages(TrackerCommand::QueryUpdate, group_name, remote_path)
            .await?;
        first_node(endpoints)
    }

    /// Resolves every storage node holding a replica of a file.
    pub async fn resolve_fetch_all(
        &self,
        group_name: &str,
        remote_path: &str,
    ) -> Result<Vec<Endpoint>> {
        self.query_storages(TrackerCommand::QueryFetchAll, group_name, remote_path)
            .await
    }

    /// Lists statistics for every group in the cluster.
    pub async fn list_groups(&self) -> Result<Vec<GroupStat>> {
        let request = protocol::pack_header(TrackerCommand::ServerListAllGroups.into(), 0, 0);
        let body = self.round_trip(&request, None).await?;
        decode_records(&body)
    }

    /// Lists statistics for a group's storage nodes, optionally filtered to
    /// one node address.
    pub async fn list_storages(
        &self,
        group_name: &str,
        node_addr: Option<&str>,
    ) -> Result<Vec<StorageStat>> {
        let endpoint = self.group.select();
        self.list_storages_on(&endpoint, group_name, node_addr).await
    }

    async fn list_storages_on(
        &self,
        endpoint: &Endpoint,
        group_name: &str,
        node_addr: Option<&str>,
    ) -> Result<Vec<StorageStat>> {
        let request = group_and_addr_request(
            TrackerCommand::ServerListStorage.into(),
            group_name,
            node_addr,
        );
        let body = self.round_trip_on(endpoint, &request, None).await?;
        decode_records(&body)
    }

    /// Removes a storage node from the cluster.
    ///
    /// Two phases across every tracker: first each tracker's view of the
    /// node is polled, failing busy if any still sees it online or active
    /// and not-found only if none knows it; then the delete is issued to
    /// each tracker, tolerating per-tracker "not found" and "already
    /// deleted" answers. Any other per-tracker error aborts the whole
    /// operation.
    pub async fn delete_storage(&self, group_name: &str, node_addr: &str) -> Result<()> {
        let mut not_found = 0usize;
        for endpoint in self.group.endpoints() {
            match self
                .list_storages_on(endpoint, group_name, Some(node_addr))
                .await
            {
                Ok(stats) if stats.is_empty() => not_found += 1,
                Ok(stats) => {
                    if matches!(stats[0].status, StorageStatus::Online | StorageStatus::Active) {
                        return Err(Error::server(status_code::EBUSY));
                    }
                }
                Err(err) if err.is_not_found() => not_found += 1,
                Err(err) => return Err(err),
            }
        }
        if not_found == self.group.len() {
            return Err(Error::server(status_code::ENOENT));
        }

        let mut not_found = 0usize;
        for endpoint in self.group.endpoints() {
            match self.delete_storage_on(endpoint, group_name, node_addr).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => not_found += 1,
                Err(err) if err.is_already_done() => {
                    debug!(tracker = %endpoint, "storage node already deleted on this tracker");
                }
                Err(err) => return Err(err),
            }
        }
        if not_found == self.group.len() {
            return Err(Error::server(status_code::ENOENT));
        }
        Ok(())
    }

    async fn delete_storage_on(
        &self,
        endpoint: &Endpoint,
        group_name: &str,
        node_addr: &str,
    ) -> Result<()> {
        let request = group_and_addr_request(
            TrackerCommand::ServerDeleteStorage.into(),
            group_name,
            Some(node_addr),
        );
        self.round_trip_on(endpoint, &request, Some(0)).await?;
        Ok(())
    }

    /// Shared decoder for the fetch/update/fetch-all queries: one leading
    /// (group, address, port) record followed by extra replica addresses
    /// sharing the same port.
    async fn query_storages(
        &self,
        cmd: TrackerCommand,
        group_name: &str,
        remote_path: &str,
    ) -> Result<Vec<Endpoint>> {
        let mut request =
            BytesMut::with_capacity(protocol::PROTO_HEADER_LEN + GROUP_NAME_MAX_LEN + remote_path.len());
        request.put_slice(&protocol::pack_header(
            cmd.into(),
            (GROUP_NAME_MAX_LEN + remote_path.len()) as u64,
            0,
        ));
        request.put(protocol::pad_text(group_name, GROUP_NAME_MAX_LEN));
        request.put_slice(remote_path.as_bytes());

        let body = self.round_trip(&request, None).await?;
        if body.len() < QUERY_FETCH_BODY_LEN {
            return Err(Error::Protocol(format!(
                "fetch-query response body too short: {} bytes",
                body.len()
            )));
        }
        if (body.len() - QUERY_FETCH_BODY_LEN) % (IP_ADDR_SIZE - 1) != 0 {
            return Err(Error::Protocol(format!(
                "fetch-query response body length {} does not frame whole records",
                body.len()
            )));
        }

        let count = 1 + (body.len() - QUERY_FETCH_BODY_LEN) / (IP_ADDR_SIZE - 1);
        let ip = protocol::unpad_text(&body[GROUP_NAME_MAX_LEN..GROUP_NAME_MAX_LEN + IP_ADDR_SIZE - 1]);
        let mut offset = GROUP_NAME_MAX_LEN + IP_ADDR_SIZE - 1;
        let port = protocol::decode_u64(&body[offset..offset + PKG_LEN_SIZE]) as u16;
        offset += PKG_LEN_SIZE;

        let mut endpoints = Vec::with_capacity(count);
        endpoints.push(Endpoint::new(ip, port));
        for _ in 1..count {
            let ip = protocol::unpad_text(&body[offset..offset + IP_ADDR_SIZE - 1]);
            offset += IP_ADDR_SIZE - 1;
            endpoints.push(Endpoint::new(ip, port));
        }
        Ok(endpoints)
    }

    /// One request/response exchange against the next tracker in rotation.
    async fn round_trip(&self, request: &[u8], expect_len: Option<u64>) -> Result<Bytes> {
        let endpoint = self.group.select();
        self.round_trip_on(&endpoint, request, expect_len).await
    }

    /// One request/response exchange against a specific tracker.
    async fn round_trip_on(
        &self,
        endpoint: &Endpoint,
        request: &[u8],
        expect_len: Option<u64>,
    ) -> Result<Bytes> {
        let mut conn = self.pools.acquire(endpoint).await?;
        let result = conn.request(request, PROTO_CMD_RESP, expect_len).await;
        self.pools.settle(conn, result).await
    }
}

/// Builds a store-resolution request, picking the grouped or ungrouped
/// command by whether a group name was given.
fn store_query_request(
    group_name: Option<&str>,
    without_group: TrackerCommand,
    with_group: TrackerCommand,
) -> Bytes {
    let mut request = BytesMut::with_capacity(protocol::PROTO_HEADER_LEN + GROUP_NAME_MAX_LEN);
    match group_name {
        Some(group) if !group.is_empty() => {
            request.put_slice(&protocol::pack_header(
                with_group.into(),
                GROUP_NAME_MAX_LEN as u64,
                0,
            ));
            request.put(protocol::pad_text(group, GROUP_NAME_MAX_LEN));
        }
        _ => {
            request.put_slice(&protocol::pack_header(without_group.into(), 0, 0));
        }
    }
    request.freeze()
}

/// Builds a request carrying a padded group name plus an optional node
/// address truncated to the protocol's address width.
fn group_and_addr_request(cmd: u8, group_name: &str, node_addr: Option<&str>) -> Bytes {
    let addr = node_addr.unwrap_or("");
    let addr_len = addr.len().min(IP_ADDR_SIZE - 1);
    let mut request =
        BytesMut::with_capacity(protocol::PROTO_HEADER_LEN + GROUP_NAME_MAX_LEN + addr_len);
    request.put_slice(&protocol::pack_header(
        cmd,
        (GROUP_NAME_MAX_LEN + addr_len) as u64,
        0,
    ));
    request.put(protocol::pad_text(group_name, GROUP_NAME_MAX_LEN));
    request.put_slice(&addr.as_bytes()[..addr_len]);
    request.freeze()
}

/// Decodes the (address, port, store-path) tail of a store-query response.
fn decode_store_node(tail: &[u8]) -> StorageNode {
    let ip = protocol::unpad_text(&tail[..IP_ADDR_SIZE - 1]);
    let port = protocol::decode_u64(&tail[IP_ADDR_SIZE - 1..IP_ADDR_SIZE - 1 + PKG_LEN_SIZE]) as u16;
    let store_path_index = tail[IP_ADDR_SIZE - 1 + PKG_LEN_SIZE];
    StorageNode {
        endpoint: Endpoint::new(ip, port),
        store_path_index,
    }
}

fn first_node(endpoints: Vec<Endpoint>) -> Result<StorageNode> {
    let endpoint = endpoints.into_iter().next().ok_or(Error::NoStorageNode)?;
    Ok(StorageNode {
        endpoint,
        store_path_index: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_of(n: u16) -> TrackerGroup {
        let endpoints = (0..n)
            .map(|i| Endpoint::new(format!("10.0.0.{}", i + 1), 22122))
            .collect();
        TrackerGroup::new(endpoints).unwrap()
    }

    #[test]
    fn rotation_visits_each_endpoint_once_per_cycle() {
        let group = group_of(3);
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(group.select());
        }
        let unique: std::collections::HashSet<_> =
            seen.iter().map(|ep| ep.to_string()).collect();
        assert_eq!(unique.len(), 3, "each endpoint should be visited once");
        assert_eq!(group.select(), seen[0], "fourth call should wrap to the first");
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(TrackerGroup::new(Vec::new()).is_err());
    }

    #[test]
    fn store_query_request_switches_command_on_group() {
        let ungrouped = store_query_request(
            None,
            TrackerCommand::QueryStoreWithoutGroupOne,
            TrackerCommand::QueryStoreWithGroupOne,
        );
        assert_eq!(ungrouped.len(), protocol::PROTO_HEADER_LEN);
        assert_eq!(ungrouped[8], TrackerCommand::QueryStoreWithoutGroupOne as u8);

        let grouped = store_query_request(
            Some("group1"),
            TrackerCommand::QueryStoreWithoutGroupOne,
            TrackerCommand::QueryStoreWithGroupOne,
        );
        assert_eq!(grouped.len(), protocol::PROTO_HEADER_LEN + GROUP_NAME_MAX_LEN);
        assert_eq!(grouped[8], TrackerCommand::QueryStoreWithGroupOne as u8);
    }

    #[test]
    fn store_node_tail_decodes_address_port_and_path() {
        let mut tail = Vec::new();
        tail.extend_from_slice(&protocol::pad_text("192.168.0.5", IP_ADDR_SIZE - 1));
        tail.extend_from_slice(&23000u64.to_be_bytes());
        tail.push(2);
        let node = decode_store_node(&tail);
        assert_eq!(node.endpoint, Endpoint::new("192.168.0.5", 23000));
        assert_eq!(node.store_path_index, 2);
    }
}
