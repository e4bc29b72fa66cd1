//! Basic upload / download / delete cycle.
//!
//! Demonstrates the minimal client workflow:
//! - Building a configuration and a cluster handle
//! - Uploading an in-memory buffer
//! - Downloading the file back and checking its content
//! - Reading file information decoded from the filename
//! - Deleting the file
//!
//! Run this example with:
//! ```bash
//! cargo run --example basic_usage
//! ```

use dfstore::{ClientConfig, Cluster};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tracker_addr =
        std::env::var("DFSTORE_TRACKER_ADDR").unwrap_or_else(|_| "192.168.1.100:22122".to_string());

    // One cluster per process: it owns the configuration, the tracker
    // group, and the connection pools. Clients are minted from it.
    let config = ClientConfig::from_tracker_addrs(&[tracker_addr])?;
    let cluster = Cluster::new(config)?;
    let mut client = cluster.storage_client();

    // 1. Upload a buffer; the storage node assigns the filename.
    let payload = b"hello, cluster";
    let file = client.upload_buffer(None, payload, "txt", None).await?;
    println!("uploaded as {file}");

    // 2. Download it back into memory.
    let data = client.download_bytes(&file).await?;
    assert_eq!(&data[..], payload);
    println!("downloaded {} bytes", data.len());

    // 3. Normal files answer metadata queries straight from the filename,
    //    with zero network calls.
    let info = client.get_file_info(&file).await?;
    println!(
        "size {} bytes, crc32 {:08x}, from server: {}",
        info.size, info.crc32, info.fetched_from_server
    );

    // 4. Clean up.
    client.delete_file(&file).await?;
    println!("deleted {file}");

    Ok(())
}
