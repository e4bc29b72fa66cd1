//! Cluster inspection and administration.
//!
//! Tracker clients answer questions about the cluster itself rather than
//! about individual files. Demonstrates:
//! - Listing every group and its capacity
//! - Listing the storage nodes of one group
//! - Resolving which storage node would take the next upload
//! - Enumerating every node holding a replica of a file
//!
//! Run this example with:
//! ```bash
//! cargo run --example cluster_admin_example
//! ```

use dfstore::{ClientConfig, Cluster};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tracker_addr =
        std::env::var("DFSTORE_TRACKER_ADDR").unwrap_or_else(|_| "192.168.1.100:22122".to_string());
    let config = ClientConfig::from_tracker_addrs(&[tracker_addr])?;
    let cluster = Cluster::new(config)?;
    let tracker = cluster.tracker_client();

    // 1. Every group, with capacity and membership counts.
    let groups = tracker.list_groups().await?;
    println!("{} group(s):", groups.len());
    for group in &groups {
        println!(
            "  {}: {} MB free of {} MB, {}/{} nodes active",
            group.group_name, group.free_mb, group.total_mb, group.active_count, group.storage_count
        );
    }

    // 2. The storage nodes of the first group, with their status and
    //    traffic counters.
    if let Some(group) = groups.first() {
        let storages = tracker.list_storages(&group.group_name, None).await?;
        for node in &storages {
            println!(
                "  {} {:?} uploads={} downloads={}",
                node.ip_addr, node.status, node.success_upload_count, node.success_download_count
            );
        }
    }

    // 3. Where would the next upload go?
    let node = tracker.resolve_store(None).await?;
    println!(
        "next upload goes to {} (store path {})",
        node.endpoint, node.store_path_index
    );

    // 4. Replica enumeration for a stored file.
    let mut client = cluster.storage_client();
    let file = client.upload_buffer(None, b"replica probe", "txt", None).await?;
    let replicas = tracker
        .resolve_fetch_all(file.group(), file.remote_path())
        .await?;
    println!("{file} is readable from {} node(s)", replicas.len());
    client.delete_file(&file).await?;

    Ok(())
}
