//! Metadata operations.
//!
//! Demonstrates working with the key-value pairs attached to stored files:
//! - Uploading a file with initial metadata
//! - Reading metadata back
//! - Overwrite mode, which replaces every existing pair
//! - Merge mode, which inserts missing pairs and updates existing ones
//!
//! Run this example with:
//! ```bash
//! cargo run --example metadata_example
//! ```

use dfstore::{ClientConfig, Cluster, Metadata, MetadataFlag};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tracker_addr =
        std::env::var("DFSTORE_TRACKER_ADDR").unwrap_or_else(|_| "192.168.1.100:22122".to_string());
    let config = ClientConfig::from_tracker_addrs(&[tracker_addr])?;
    let cluster = Cluster::new(config)?;
    let mut client = cluster.storage_client();

    // 1. Upload with initial metadata. If the metadata write fails after
    //    the upload, the client deletes the new file best-effort and
    //    reports the metadata error.
    let metadata: Metadata = vec![
        ("author".to_string(), "jane".to_string()),
        ("version".to_string(), "1.0".to_string()),
    ];
    let file = client
        .upload_buffer(None, b"document content", "txt", Some(&metadata))
        .await?;
    println!("uploaded {file} with {} metadata pairs", metadata.len());

    // 2. Read all pairs back; order is preserved.
    for (name, value) in client.get_metadata(&file).await? {
        println!("  {name}: {value}");
    }

    // 3. Overwrite mode drops every pair not listed here.
    let replacement: Metadata = vec![("version".to_string(), "2.0".to_string())];
    client
        .set_metadata(&file, &replacement, MetadataFlag::Overwrite)
        .await?;
    println!("after overwrite: {:?}", client.get_metadata(&file).await?);

    // 4. Merge mode keeps existing pairs and adds or updates the given
    //    ones.
    let extra: Metadata = vec![("reviewed".to_string(), "yes".to_string())];
    client
        .set_metadata(&file, &extra, MetadataFlag::Merge)
        .await?;
    println!("after merge: {:?}", client.get_metadata(&file).await?);

    client.delete_file(&file).await?;
    Ok(())
}
