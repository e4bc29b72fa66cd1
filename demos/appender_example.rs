//! Appender file lifecycle.
//!
//! Appender files can be mutated after creation, so their metadata always
//! comes from a live query rather than the filename. Demonstrates:
//! - Uploading an appender file
//! - Appending content
//! - Overwriting a region with modify
//! - Truncating to a target size
//! - Regenerating the filename to freeze the file as a normal one
//!
//! Run this example with:
//! ```bash
//! cargo run --example appender_example
//! ```

use dfstore::{ClientConfig, Cluster};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tracker_addr =
        std::env::var("DFSTORE_TRACKER_ADDR").unwrap_or_else(|_| "192.168.1.100:22122".to_string());
    let config = ClientConfig::from_tracker_addrs(&[tracker_addr])?;
    let cluster = Cluster::new(config)?;
    let mut client = cluster.storage_client();

    // 1. Create the appender file with its first chunk of content.
    let file = client
        .upload_appender_buffer(None, b"2026-08-05 service started\n", "log", None)
        .await?;
    println!("appender file: {file}");

    // 2. Grow it. Appends land at the end of the file.
    client
        .append_buffer(&file, b"2026-08-05 first request served\n")
        .await?;

    // 3. The appender mark in the filename forces a live query here.
    let info = client.get_file_info(&file).await?;
    println!(
        "size after append: {} bytes (from server: {})",
        info.size, info.fetched_from_server
    );

    // 4. Overwrite the first 10 bytes in place.
    client.modify_buffer(&file, 0, b"2026-08-06").await?;

    // 5. Truncate back to the first line.
    client.truncate_file(&file, 27).await?;
    let info = client.query_file_info(&file).await?;
    println!("size after truncate: {} bytes", info.size);

    // 6. Regenerating the filename converts the appender into a normal
    //    file with a fresh identity; the old one stops resolving.
    let frozen = client.regenerate_appender_filename(&file).await?;
    println!("regenerated as {frozen}");

    client.delete_file(&frozen).await?;
    Ok(())
}
