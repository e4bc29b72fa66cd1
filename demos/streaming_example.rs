//! Streaming uploads and downloads.
//!
//! File content is pumped in fixed-size chunks in both directions, so file
//! size is never bounded by memory. Demonstrates:
//! - Uploading from an arbitrary `AsyncRead` with a declared size
//! - Uploading a local file without reading it into memory
//! - Downloading into any `AsyncWrite`
//! - Downloading to a local file, with partial output removed on failure
//!
//! Run this example with:
//! ```bash
//! cargo run --example streaming_example
//! ```

use dfstore::{ClientConfig, Cluster};
use tokio::io::AsyncWriteExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tracker_addr =
        std::env::var("DFSTORE_TRACKER_ADDR").unwrap_or_else(|_| "192.168.1.100:22122".to_string());
    let config = ClientConfig::from_tracker_addrs(&[tracker_addr])?;
    let cluster = Cluster::new(config)?;
    let mut client = cluster.storage_client();

    // 1. Upload from a reader. The size is declared up front and the
    //    content source must deliver exactly that many bytes.
    let content = vec![0x5a_u8; 4 * 1024 * 1024];
    let mut reader = &content[..];
    let file = client
        .upload_from_reader(None, &mut reader, content.len() as u64, "bin", None)
        .await?;
    println!("uploaded {} bytes as {file}", content.len());

    // 2. Stream the file into a local path. A short or failed transfer
    //    removes the partial output file.
    let local = std::env::temp_dir().join("dfstore-streaming-demo.bin");
    let written = client.download_to_file(&file, &local).await?;
    println!("downloaded {written} bytes to {}", local.display());

    // 3. Stream a byte range into any writer.
    let mut head = Vec::new();
    client.download_to_writer(&file, 0, 1024, &mut head).await?;
    println!("first {} bytes fetched separately", head.len());

    // 4. Stage a local file and upload it without buffering it whole.
    let staged = std::env::temp_dir().join("dfstore-streaming-stage.bin");
    let mut staging = tokio::fs::File::create(&staged).await?;
    staging.write_all(&content).await?;
    staging.sync_all().await?;
    drop(staging);

    let second = client.upload_file(None, &staged, None, None).await?;
    println!("uploaded staged file as {second}");

    client.delete_file(&file).await?;
    client.delete_file(&second).await?;
    tokio::fs::remove_file(&local).await.ok();
    tokio::fs::remove_file(&staged).await.ok();
    Ok(())
}
