//! End-to-end client tests against in-process scripted tracker and
//! storage nodes.
//!
//! The mocks speak the real framing: they read one request frame, log the
//! command byte, and answer with whatever the test scripted. Running both
//! node kinds locally lets the tests observe compensating actions and
//! partial-stream failures without a live cluster.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use dfstore::{ClientConfig, Cluster, Error, FileId, MetadataFlag};

const RESP_CMD: u8 = 100;

enum Reply {
    /// A complete response frame
    Frame { status: u8, body: Vec<u8> },
    /// A header claiming `claimed` body bytes followed by fewer bytes and
    /// a closed connection
    Truncated { claimed: u64, body: Vec<u8> },
}

type Responder = Arc<dyn Fn(u8, &[u8]) -> Reply + Send + Sync>;

struct MockNode {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<u8>>>,
}

impl MockNode {
    async fn spawn(responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let log = commands.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, responder.clone(), log.clone()));
            }
        });
        Self { addr, commands }
    }

    fn seen_commands(&self) -> Vec<u8> {
        self.commands.lock().unwrap().clone()
    }
}

async fn serve(mut stream: TcpStream, responder: Responder, log: Arc<Mutex<Vec<u8>>>) {
    loop {
        let mut header = [0u8; 10];
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }
        let body_len = u64::from_be_bytes(header[..8].try_into().unwrap()) as usize;
        let cmd = header[8];
        let mut body = vec![0u8; body_len];
        if stream.read_exact(&mut body).await.is_err() {
            return;
        }
        log.lock().unwrap().push(cmd);
        match responder(cmd, &body) {
            Reply::Frame { status, body } => {
                let mut frame = Vec::with_capacity(10 + body.len());
                frame.extend_from_slice(&(body.len() as u64).to_be_bytes());
                frame.push(RESP_CMD);
                frame.push(status);
                frame.extend_from_slice(&body);
                if stream.write_all(&frame).await.is_err() {
                    return;
                }
            }
            Reply::Truncated { claimed, body } => {
                let mut frame = Vec::with_capacity(10 + body.len());
                frame.extend_from_slice(&claimed.to_be_bytes());
                frame.push(RESP_CMD);
                frame.push(0);
                frame.extend_from_slice(&body);
                let _ = stream.write_all(&frame).await;
                let _ = stream.flush().await;
                return;
            }
        }
    }
}

fn pad(text: &str, width: usize) -> Vec<u8> {
    let mut field = vec![0u8; width];
    field[..text.len()].copy_from_slice(text.as_bytes());
    field
}

fn new_file_body(group: &str, remote_path: &str) -> Vec<u8> {
    let mut body = pad(group, 16);
    body.extend_from_slice(remote_path.as_bytes());
    body
}

/// A tracker that resolves every store/fetch/update query to one storage
/// node.
fn tracker_responder(storage_addr: SocketAddr) -> Responder {
    Arc::new(move |cmd, _body| {
        let ip = storage_addr.ip().to_string();
        let port = u64::from(storage_addr.port());
        match cmd {
            101 | 104 => {
                let mut body = pad("group1", 16);
                body.extend_from_slice(&pad(&ip, 15));
                body.extend_from_slice(&port.to_be_bytes());
                body.push(0);
                Reply::Frame { status: 0, body }
            }
            102 | 103 | 105 => {
                let mut body = pad("group1", 16);
                body.extend_from_slice(&pad(&ip, 15));
                body.extend_from_slice(&port.to_be_bytes());
                Reply::Frame { status: 0, body }
            }
            _ => Reply::Frame {
                status: 22,
                body: Vec::new(),
            },
        }
    })
}

fn cluster_for(tracker_addr: SocketAddr) -> Cluster {
    let config = ClientConfig::from_tracker_addrs(&[tracker_addr.to_string()])
        .unwrap()
        .with_connect_timeout(Duration::from_secs(2))
        .with_network_timeout(Duration::from_secs(2));
    Cluster::new(config).unwrap()
}

fn test_file_id() -> FileId {
    FileId::parse("group1/M00/00/00/existing.txt").unwrap()
}

#[tokio::test]
async fn upload_returns_the_new_file_identity() {
    let storage = MockNode::spawn(Arc::new(|cmd, _| match cmd {
        11 => Reply::Frame {
            status: 0,
            body: new_file_body("group1", "M00/00/00/generated.txt"),
        },
        _ => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
    }))
    .await;
    let tracker = MockNode::spawn(tracker_responder(storage.addr)).await;
    let cluster = cluster_for(tracker.addr);

    let mut client = cluster.storage_client();
    let file = client
        .upload_buffer(None, b"hello, cluster", "txt", None)
        .await
        .unwrap();

    assert_eq!(file.group(), "group1");
    assert_eq!(file.remote_path(), "M00/00/00/generated.txt");
    assert_eq!(storage.seen_commands(), vec![11]);
    assert_eq!(tracker.seen_commands(), vec![101]);
}

#[tokio::test]
async fn failed_metadata_write_triggers_a_cleanup_delete() {
    let storage = MockNode::spawn(Arc::new(|cmd, _| match cmd {
        11 => Reply::Frame {
            status: 0,
            body: new_file_body("group1", "M00/00/00/generated.txt"),
        },
        // the follow-up metadata write fails with EINVAL
        13 => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
        12 => Reply::Frame {
            status: 0,
            body: Vec::new(),
        },
        _ => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
    }))
    .await;
    let tracker = MockNode::spawn(tracker_responder(storage.addr)).await;
    let cluster = cluster_for(tracker.addr);

    let metadata = vec![("author".to_string(), "tester".to_string())];
    let mut client = cluster.storage_client();
    let err = client
        .upload_buffer(None, b"payload", "txt", Some(&metadata))
        .await
        .expect_err("metadata failure must fail the upload");

    assert!(matches!(err, Error::Server { code: 22 }), "got {err:?}");
    assert_eq!(
        storage.seen_commands(),
        vec![11, 13, 12],
        "upload, metadata write, then the compensating delete"
    );
}

#[tokio::test]
async fn cleanup_delete_failure_is_swallowed_and_metadata_error_reported() {
    let storage = MockNode::spawn(Arc::new(|cmd, _| match cmd {
        11 => Reply::Frame {
            status: 0,
            body: new_file_body("group1", "M00/00/00/generated.txt"),
        },
        13 => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
        // even the cleanup delete fails; the caller still sees the
        // metadata error, not this one
        12 => Reply::Frame {
            status: 5,
            body: Vec::new(),
        },
        _ => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
    }))
    .await;
    let tracker = MockNode::spawn(tracker_responder(storage.addr)).await;
    let cluster = cluster_for(tracker.addr);

    let metadata = vec![("author".to_string(), "tester".to_string())];
    let mut client = cluster.storage_client();
    let err = client
        .upload_buffer(None, b"payload", "txt", Some(&metadata))
        .await
        .expect_err("metadata failure must fail the upload");

    assert!(matches!(err, Error::Server { code: 22 }), "got {err:?}");
    assert_eq!(storage.seen_commands(), vec![11, 13, 12]);
}

#[tokio::test]
async fn bulk_download_returns_the_whole_body() {
    let storage = MockNode::spawn(Arc::new(|cmd, _| match cmd {
        14 => Reply::Frame {
            status: 0,
            body: b"file content bytes".to_vec(),
        },
        _ => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
    }))
    .await;
    let tracker = MockNode::spawn(tracker_responder(storage.addr)).await;
    let cluster = cluster_for(tracker.addr);

    let mut client = cluster.storage_client();
    let data = client.download_bytes(&test_file_id()).await.unwrap();
    assert_eq!(&data[..], b"file content bytes");
}

#[tokio::test]
async fn truncated_download_fails_and_removes_the_partial_file() {
    let storage = MockNode::spawn(Arc::new(|cmd, _| match cmd {
        14 => Reply::Truncated {
            claimed: 1 << 16,
            body: vec![7u8; 1000],
        },
        _ => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
    }))
    .await;
    let tracker = MockNode::spawn(tracker_responder(storage.addr)).await;
    let cluster = cluster_for(tracker.addr);

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("partial.bin");

    let mut client = cluster.storage_client();
    let err = client
        .download_to_file(&test_file_id(), &target)
        .await
        .expect_err("short body must fail the download");

    assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
    assert!(!target.exists(), "partial output file must be removed");
}

#[tokio::test]
async fn streamed_download_delivers_exactly_the_declared_bytes() {
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();
    let storage = MockNode::spawn(Arc::new(move |cmd, _| match cmd {
        14 => Reply::Frame {
            status: 0,
            body: payload.clone(),
        },
        _ => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
    }))
    .await;
    let tracker = MockNode::spawn(tracker_responder(storage.addr)).await;
    let cluster = cluster_for(tracker.addr);

    let mut client = cluster.storage_client();
    let mut sink = Vec::new();
    let written = client
        .download_to_writer(&test_file_id(), 0, 0, &mut sink)
        .await
        .unwrap();

    assert_eq!(written, expected.len() as u64);
    assert_eq!(sink, expected);
}

#[tokio::test]
async fn server_error_status_propagates_and_the_connection_stays_usable() {
    let storage = MockNode::spawn(Arc::new(|cmd, _| match cmd {
        12 => Reply::Frame {
            status: 2,
            body: Vec::new(),
        },
        _ => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
    }))
    .await;
    let tracker = MockNode::spawn(tracker_responder(storage.addr)).await;
    let cluster = cluster_for(tracker.addr);

    let mut client = cluster.storage_client();
    let err = client.delete_file(&test_file_id()).await.expect_err("delete must fail");
    assert!(err.is_not_found());

    // the exchange was clean, so the pooled connection serves the retry
    let err = client.delete_file(&test_file_id()).await.expect_err("delete must fail again");
    assert!(err.is_not_found());
    assert_eq!(storage.seen_commands(), vec![12, 12]);
}

#[tokio::test]
async fn metadata_round_trip_preserves_order() {
    let storage = MockNode::spawn(Arc::new(|cmd, _| match cmd {
        13 => Reply::Frame {
            status: 0,
            body: Vec::new(),
        },
        15 => Reply::Frame {
            status: 0,
            body: b"author\x02tester\x01rev\x022".to_vec(),
        },
        _ => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
    }))
    .await;
    let tracker = MockNode::spawn(tracker_responder(storage.addr)).await;
    let cluster = cluster_for(tracker.addr);

    let mut client = cluster.storage_client();
    let pairs = vec![
        ("author".to_string(), "tester".to_string()),
        ("rev".to_string(), "2".to_string()),
    ];
    client
        .set_metadata(&test_file_id(), &pairs, MetadataFlag::Merge)
        .await
        .unwrap();

    let fetched = client.get_metadata(&test_file_id()).await.unwrap();
    assert_eq!(fetched, pairs);
}

#[tokio::test]
async fn append_and_truncate_round_trip() {
    let storage = MockNode::spawn(Arc::new(|cmd, _| match cmd {
        24 | 36 => Reply::Frame {
            status: 0,
            body: Vec::new(),
        },
        _ => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
    }))
    .await;
    let tracker = MockNode::spawn(tracker_responder(storage.addr)).await;
    let cluster = cluster_for(tracker.addr);

    let mut client = cluster.storage_client();
    let file = test_file_id();
    client.append_buffer(&file, b"more bytes").await.unwrap();
    client.truncate_file(&file, 4).await.unwrap();
    assert_eq!(storage.seen_commands(), vec![24, 36]);
}

#[tokio::test]
async fn slave_upload_requires_master_identity_and_prefix() {
    let tracker = MockNode::spawn(tracker_responder("127.0.0.1:1".parse().unwrap())).await;
    let cluster = cluster_for(tracker.addr);

    let mut client = cluster.storage_client();
    let master = FileId::new("", "M00/00/00/master.txt");
    let err = client
        .upload_slave_buffer(&master, "thumb", b"data", "jpg", None)
        .await
        .expect_err("empty master group must be rejected");
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");

    let master = test_file_id();
    let err = client
        .upload_slave_buffer(&master, "", b"data", "jpg", None)
        .await
        .expect_err("empty prefix must be rejected");
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");

    // no request may have reached the tracker before validation
    assert!(tracker.seen_commands().is_empty());
}

#[tokio::test]
async fn list_groups_decodes_tracker_records() {
    fn group_record(name: &str, free_mb: u64) -> Vec<u8> {
        let mut record = pad(name, 17);
        for value in [204_800u64, free_mb, 0, 2, 23_000, 8_888, 2, 0, 1, 256, 0] {
            record.extend_from_slice(&value.to_be_bytes());
        }
        record
    }

    let tracker = MockNode::spawn(Arc::new(|cmd, _| match cmd {
        91 => {
            let mut body = group_record("group1", 1_024);
            body.extend_from_slice(&group_record("group2", 2_048));
            Reply::Frame { status: 0, body }
        }
        _ => Reply::Frame {
            status: 22,
            body: Vec::new(),
        },
    }))
    .await;
    let cluster = cluster_for(tracker.addr);

    let groups = cluster.tracker_client().list_groups().await.unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].group_name, "group1");
    assert_eq!(groups[0].free_mb, 1_024);
    assert_eq!(groups[1].group_name, "group2");
    assert_eq!(groups[1].free_mb, 2_048);
}

#[tokio::test]
async fn cluster_construction_validates_the_tracker_list() {
    assert!(Cluster::new(ClientConfig::default()).is_err());
    assert!(ClientConfig::from_tracker_addrs(&["not-an-endpoint"]).is_err());
}
