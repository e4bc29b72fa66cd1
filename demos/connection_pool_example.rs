//! Connection pooling and concurrent clients.
//!
//! Client instances are single-task; parallel work mints one client per
//! task from the shared cluster. All of them draw connections from the
//! same bounded per-endpoint pools. Demonstrates:
//! - Tuning pool limits
//! - Running uploads from several tasks at once
//! - Reading pool counters after the burst
//!
//! Run this example with:
//! ```bash
//! cargo run --example connection_pool_example
//! ```

use std::time::Duration;

use dfstore::{ClientConfig, Cluster};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tracker_addr =
        std::env::var("DFSTORE_TRACKER_ADDR").unwrap_or_else(|_| "192.168.1.100:22122".to_string());

    // Four connections per endpoint at most; an acquire waits up to two
    // seconds for a free slot before failing.
    let config = ClientConfig::from_tracker_addrs(&[tracker_addr])?
        .with_max_per_endpoint(4)
        .with_max_idle_time(Duration::from_secs(300))
        .with_max_wait_time(Duration::from_secs(2));
    let cluster = Cluster::new(config)?;

    // 1. Eight tasks, each with its own client, sharing the pools.
    let mut tasks = Vec::new();
    for i in 0..8 {
        let cluster = cluster.clone();
        tasks.push(tokio::spawn(async move {
            let mut client = cluster.storage_client();
            let payload = format!("payload from task {i}");
            let file = client
                .upload_buffer(None, payload.as_bytes(), "txt", None)
                .await?;
            client.delete_file(&file).await?;
            Ok::<_, dfstore::Error>(file)
        }));
    }

    for task in tasks {
        match task.await? {
            Ok(file) => println!("round-tripped {file}"),
            Err(err) => println!("task failed: {err}"),
        }
    }

    // 2. The pool kept at most four connections per endpoint alive.
    let node = cluster.tracker_client().resolve_store(None).await?;
    let stats = cluster.pools().manager(&node.endpoint).stats().await;
    println!(
        "storage pool for {}: {} total, {} idle",
        node.endpoint, stats.total, stats.free
    );

    Ok(())
}
