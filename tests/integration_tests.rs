//! Integration tests against a live cluster.
//!
//! These tests only run when DFSTORE_TRACKER_ADDR points at a reachable
//! tracker, e.g.:
//!
//! ```bash
//! DFSTORE_TRACKER_ADDR=192.168.1.100:22122 cargo test --test integration_tests
//! ```

use std::env;

use dfstore::{ClientConfig, Cluster, MetadataFlag};

fn live_cluster() -> Option<Cluster> {
    let addr = env::var("DFSTORE_TRACKER_ADDR").ok()?;
    let config = ClientConfig::from_tracker_addrs(&[addr]).ok()?;
    Cluster::new(config).ok()
}

#[tokio::test]
async fn upload_download_delete_cycle() {
    let Some(cluster) = live_cluster() else {
        eprintln!("skipping: set DFSTORE_TRACKER_ADDR to run live tests");
        return;
    };
    let mut client = cluster.storage_client();

    let payload = b"integration test payload";
    let file = client
        .upload_buffer(None, payload, "txt", None)
        .await
        .expect("upload should succeed");

    let data = client
        .download_bytes(&file)
        .await
        .expect("download should succeed");
    assert_eq!(&data[..], payload);

    let info = client
        .get_file_info(&file)
        .await
        .expect("file info should resolve");
    assert_eq!(info.size, payload.len() as u64);

    client
        .delete_file(&file)
        .await
        .expect("delete should succeed");

    let err = client
        .download_bytes(&file)
        .await
        .expect_err("deleted file should not download");
    assert!(err.is_not_found(), "got {err:?}");
}

#[tokio::test]
async fn metadata_survives_a_round_trip() {
    let Some(cluster) = live_cluster() else {
        eprintln!("skipping: set DFSTORE_TRACKER_ADDR to run live tests");
        return;
    };
    let mut client = cluster.storage_client();

    let metadata = vec![
        ("author".to_string(), "integration".to_string()),
        ("purpose".to_string(), "round trip".to_string()),
    ];
    let file = client
        .upload_buffer(None, b"with metadata", "bin", Some(&metadata))
        .await
        .expect("upload with metadata should succeed");

    let fetched = client
        .get_metadata(&file)
        .await
        .expect("metadata fetch should succeed");
    for pair in &metadata {
        assert!(fetched.contains(pair), "missing pair {pair:?}");
    }

    client
        .set_metadata(
            &file,
            &vec![("rev".to_string(), "2".to_string())],
            MetadataFlag::Merge,
        )
        .await
        .expect("metadata merge should succeed");

    client.delete_file(&file).await.expect("cleanup delete");
}

#[tokio::test]
async fn appender_files_grow_and_truncate() {
    let Some(cluster) = live_cluster() else {
        eprintln!("skipping: set DFSTORE_TRACKER_ADDR to run live tests");
        return;
    };
    let mut client = cluster.storage_client();

    let file = client
        .upload_appender_buffer(None, b"first", "log", None)
        .await
        .expect("appender upload should succeed");

    client
        .append_buffer(&file, b" second")
        .await
        .expect("append should succeed");

    let info = client
        .get_file_info(&file)
        .await
        .expect("appender info should come from a live query");
    assert!(info.fetched_from_server);
    assert_eq!(info.size, b"first second".len() as u64);

    client
        .truncate_file_to_zero(&file)
        .await
        .expect("truncate should succeed");

    let info = client.get_file_info(&file).await.expect("file info");
    assert_eq!(info.size, 0);

    client.delete_file(&file).await.expect("cleanup delete");
}
