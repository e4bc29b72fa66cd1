//! Slave files derived from a master file.
//!
//! A slave file is linked to a master file and named after it with a
//! prefix, so related content (a thumbnail next to its photo) lands on the
//! same storage node and can be addressed predictably. Demonstrates:
//! - Uploading a master file
//! - Uploading slave files with distinct prefixes
//! - The argument validation slave uploads enforce
//!
//! Run this example with:
//! ```bash
//! cargo run --example slave_file_example
//! ```

use dfstore::{ClientConfig, Cluster, Error};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tracker_addr =
        std::env::var("DFSTORE_TRACKER_ADDR").unwrap_or_else(|_| "192.168.1.100:22122".to_string());
    let config = ClientConfig::from_tracker_addrs(&[tracker_addr])?;
    let cluster = Cluster::new(config)?;
    let mut client = cluster.storage_client();

    // 1. The master file: a full-size image.
    let master = client
        .upload_buffer(None, b"full resolution image bytes", "jpg", None)
        .await?;
    println!("master: {master}");

    // 2. Slaves carry a prefix naming their relationship to the master.
    let thumb = client
        .upload_slave_buffer(&master, "_150x150", b"thumbnail bytes", "jpg", None)
        .await?;
    println!("thumbnail: {thumb}");

    let medium = client
        .upload_slave_buffer(&master, "_800x600", b"medium size bytes", "jpg", None)
        .await?;
    println!("medium: {medium}");

    // 3. A slave upload without a prefix is rejected before any network
    //    traffic happens.
    match client
        .upload_slave_buffer(&master, "", b"bytes", "jpg", None)
        .await
    {
        Err(Error::InvalidArgument(reason)) => println!("rejected as expected: {reason}"),
        other => println!("unexpected outcome: {other:?}"),
    }

    client.delete_file(&thumb).await?;
    client.delete_file(&medium).await?;
    client.delete_file(&master).await?;
    Ok(())
}
