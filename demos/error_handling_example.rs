//! Error handling patterns.
//!
//! Demonstrates matching on the client's error type:
//! - Server status codes and their named helpers
//! - Transport errors versus clean server-reported failures
//! - Connect timeouts against unreachable nodes
//!
//! Run this example with:
//! ```bash
//! cargo run --example error_handling_example
//! ```

use std::time::Duration;

use dfstore::{ClientConfig, Cluster, Error, FileId};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tracker_addr =
        std::env::var("DFSTORE_TRACKER_ADDR").unwrap_or_else(|_| "192.168.1.100:22122".to_string());
    let config = ClientConfig::from_tracker_addrs(&[tracker_addr])?
        .with_connect_timeout(Duration::from_secs(3))
        .with_network_timeout(Duration::from_secs(10));
    let cluster = Cluster::new(config)?;
    let mut client = cluster.storage_client();

    // 1. Downloading a file that does not exist is a clean exchange: the
    //    server answers with a status code and the connection stays
    //    pooled.
    let missing = FileId::parse("group1/M00/00/00/does-not-exist.txt")?;
    match client.download_bytes(&missing).await {
        Ok(_) => println!("unexpectedly found the file"),
        Err(err) if err.is_not_found() => println!("not found, as expected"),
        Err(Error::Server { code }) => println!("server answered with status {code}"),
        Err(err) => println!("transport-level failure: {err}"),
    }

    // 2. Malformed file ids are rejected locally.
    match FileId::parse("no-slash-here") {
        Err(Error::InvalidFileId(id)) => println!("rejected locally: {id:?}"),
        other => println!("unexpected outcome: {other:?}"),
    }

    // 3. An unreachable tracker surfaces as a connect failure on the call
    //    that needed it; the next call rotates to the following tracker.
    let dead = ClientConfig::from_tracker_addrs(&["203.0.113.1:22122"])?
        .with_connect_timeout(Duration::from_millis(500));
    let mut unreachable = Cluster::new(dead)?.storage_client();
    match unreachable.upload_buffer(None, b"x", "txt", None).await {
        Err(Error::ConnectTimeout { endpoint, timeout }) => {
            println!("connect to {endpoint} timed out after {timeout:?}")
        }
        Err(err) => println!("connect failed: {err}"),
        Ok(file) => println!("unexpected upload: {file}"),
    }

    Ok(())
}
