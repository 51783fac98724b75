//! Black-box scenarios for the fan-out engine, exercised through the
//! public `StoreOrchestrator` API against in-process mock storage
//! nodes and the in-memory metadata repository — no real network or
//! database involved.

use filefan::coordinator::FanOutCoordinator;
use filefan::engine::TransferEngine;
use filefan::errors::FileStoreError;
use filefan::plan::partition_sizes;
use filefan::protocol::mock::{MockClientFactory, MockStorageNode};
use filefan::registry::InFlightRegistry;
use filefan::repository::memory::InMemoryRepository;
use filefan::repository::MetadataRepository;
use filefan::store::StoreOrchestrator;
use filefan::types::{FileInfo, StorageNode};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

struct Harness {
    orchestrator: StoreOrchestrator,
    repo: Arc<InMemoryRepository>,
    factory: Arc<MockClientFactory>,
}

fn build(min_storages: usize) -> Harness {
    let repo = Arc::new(InMemoryRepository::new());
    let factory = Arc::new(MockClientFactory::new());
    let coordinator = Arc::new(FanOutCoordinator::new(factory.clone(), min_storages));
    let engine = Arc::new(TransferEngine::default());
    let registry = Arc::new(InFlightRegistry::new());
    let orchestrator = StoreOrchestrator::new(repo.clone(), coordinator, engine, registry);
    Harness { orchestrator, repo, factory }
}

async fn register_node(h: &Harness, id: &str, capacity: u64) {
    h.factory.register(id, MockStorageNode::new(capacity));
    h.repo
        .create_or_update_storage(StorageNode::new(id.to_string(), id.to_string()))
        .await
        .unwrap();
}

/// S1: three nodes, 1792 random bytes, partition (597, 597, 598); each
/// node holds its slice and Load returns the original bytes bit-equal.
#[tokio::test]
async fn s1_three_nodes_partition_and_round_trip() {
    let h = build(3);
    for i in 0..3 {
        register_node(&h, &format!("s{i}"), 1024 * 1024).await;
    }

    let sizes = partition_sizes(1792, 3);
    assert_eq!(sizes, vec![597, 597, 598]);

    let data = random_bytes(1792);
    let file_id = h.orchestrator.prepare().await.unwrap();
    let info = FileInfo {
        name: "s1.bin".to_string(),
        content_type: None,
        size: data.len() as u64,
    };
    h.orchestrator
        .store(&file_id, info, Cursor::new(data.clone()), CancellationToken::new())
        .await
        .unwrap();

    let mut out = Vec::new();
    let written = h
        .orchestrator
        .load("s1.bin", &mut out, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(written, 1792);
    assert_eq!(out, data);

    let parts = h.repo.find_ordered_file_parts(&file_id).await.unwrap();
    let mut part_sizes: Vec<u64> = parts.iter().map(|p| p.size).collect();
    part_sizes.sort_unstable();
    let mut expected = sizes.clone();
    expected.sort_unstable();
    assert_eq!(part_sizes, expected);
}

/// S2: five registered nodes, only three pass readiness — Store
/// succeeds with K=3; a slow node (capacity zero, so it never passes)
/// is simply never admitted regardless of when it would have answered.
#[tokio::test]
async fn s2_admits_exactly_the_ready_quorum() {
    let h = build(3);
    register_node(&h, "fast-0", 1024).await;
    register_node(&h, "fast-1", 1024).await;
    register_node(&h, "fast-2", 1024).await;
    register_node(&h, "refuse-0", 0).await;
    register_node(&h, "refuse-1", 0).await;

    let file_id = h.orchestrator.prepare().await.unwrap();
    let data = random_bytes(900);
    let info = FileInfo {
        name: "s2.bin".to_string(),
        content_type: None,
        size: data.len() as u64,
    };
    h.orchestrator
        .store(&file_id, info, Cursor::new(data.clone()), CancellationToken::new())
        .await
        .unwrap();

    let parts = h.repo.find_ordered_file_parts(&file_id).await.unwrap();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts.iter().map(|p| p.seq).collect::<Vec<_>>(), vec![0, 1, 2]);
}

/// S3: only two nodes registered against `min_storages = 3` — Prepare
/// then Store fails `NotEnoughStorages`; the File stays `Created`, no
/// parts are persisted, and a second Store against the same id
/// observes the identical failure (identity keys were released).
#[tokio::test]
async fn s3_not_enough_storages_leaves_file_created() {
    let h = build(3);
    register_node(&h, "s0", 1024).await;
    register_node(&h, "s1", 1024).await;

    let file_id = h.orchestrator.prepare().await.unwrap();
    let info = FileInfo {
        name: "s3.bin".to_string(),
        content_type: None,
        size: 30,
    };
    let err = h
        .orchestrator
        .store(&file_id, info.clone(), Cursor::new(vec![0u8; 30]), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FileStoreError::NotEnoughStorages));

    let file = h.repo.get_file(&file_id).await.unwrap();
    assert_eq!(file.status, filefan::types::FileStatus::Created);
    assert!(h.repo.find_ordered_file_parts(&file_id).await.unwrap().is_empty());

    // A second Store against the same id sees the same failure — the
    // in-flight keys were released on the first failed attempt.
    let err2 = h
        .orchestrator
        .store(&file_id, info, Cursor::new(vec![0u8; 30]), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err2, FileStoreError::NotEnoughStorages));
}

/// S4: two concurrent Store calls sharing a file id — exactly one
/// wins, the other is rejected `Busy`, and only the winner's data is
/// ever retrievable afterward.
#[tokio::test]
async fn s4_concurrent_store_same_identity_one_winner() {
    let h = build(3);
    for i in 0..3 {
        register_node(&h, &format!("s{i}"), 1024 * 1024).await;
    }
    let orchestrator = Arc::new(h.orchestrator);
    let file_id = orchestrator.prepare().await.unwrap();

    let info = FileInfo {
        name: "s4.bin".to_string(),
        content_type: None,
        size: 12,
    };

    let o1 = orchestrator.clone();
    let id1 = file_id.clone();
    let info1 = info.clone();
    let a = tokio::spawn(async move {
        o1.store(&id1, info1, Cursor::new(b"aaaaaaaaaaaa".to_vec()), CancellationToken::new())
            .await
    });
    let o2 = orchestrator.clone();
    let id2 = file_id.clone();
    let b = tokio::spawn(async move {
        o2.store(&id2, info, Cursor::new(b"bbbbbbbbbbbb".to_vec()), CancellationToken::new())
            .await
    });

    let (ra, rb) = tokio::join!(a, b);
    let results = [ra.unwrap(), rb.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results.iter().filter(|r| matches!(r, Err(FileStoreError::Busy))).count(),
        1
    );

    let mut out = Vec::new();
    orchestrator.load("s4.bin", &mut out, CancellationToken::new()).await.unwrap();
    assert!(out == b"aaaaaaaaaaaa".to_vec() || out == b"bbbbbbbbbbbb".to_vec());
}

/// S5: a 10 MiB upload through the 4096-byte chunk pipeline across
/// three nodes round-trips with an identical SHA-256.
#[tokio::test]
async fn s5_large_upload_round_trips_with_matching_hash() {
    let h = build(3);
    for i in 0..3 {
        register_node(&h, &format!("s{i}"), 16 * 1024 * 1024).await;
    }

    let data = random_bytes(10 * 1024 * 1024);
    let expected_hash = hex::encode(Sha256::digest(&data));

    let file_id = h.orchestrator.prepare().await.unwrap();
    let info = FileInfo {
        name: "s5.bin".to_string(),
        content_type: None,
        size: data.len() as u64,
    };
    h.orchestrator
        .store(&file_id, info, Cursor::new(data.clone()), CancellationToken::new())
        .await
        .unwrap();

    let mut out = Vec::new();
    h.orchestrator.load("s5.bin", &mut out, CancellationToken::new()).await.unwrap();

    let actual_hash = hex::encode(Sha256::digest(&out));
    assert_eq!(actual_hash, expected_hash);
    assert_eq!(out.len(), data.len());
}

/// S6: a reader that fails partway through a part's bytes surfaces a
/// transfer-time error; Store does not finalize the File or persist
/// any FilePart rows.
#[tokio::test]
async fn s6_mid_transfer_failure_leaves_no_partial_state() {
    use tokio::io::{AsyncRead, ReadBuf};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    struct FlakyReader {
        data: Vec<u8>,
        pos: usize,
        fail_after: usize,
    }

    impl AsyncRead for FlakyReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.pos >= self.fail_after {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "simulated mid-transfer failure",
                )));
            }
            let remaining = (self.fail_after - self.pos).min(buf.remaining());
            let end = self.pos + remaining;
            buf.put_slice(&self.data[self.pos..end]);
            self.pos = end;
            Poll::Ready(Ok(()))
        }
    }

    let h = build(3);
    for i in 0..3 {
        register_node(&h, &format!("s{i}"), 1024 * 1024).await;
    }

    let total = 300usize;
    let reader = FlakyReader {
        data: random_bytes(total),
        pos: 0,
        fail_after: 100,
    };

    let file_id = h.orchestrator.prepare().await.unwrap();
    let info = FileInfo {
        name: "s6.bin".to_string(),
        content_type: None,
        size: total as u64,
    };
    let err = h
        .orchestrator
        .store(&file_id, info, reader, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FileStoreError::Transport(_)));

    let file = h.repo.get_file(&file_id).await.unwrap();
    assert_eq!(file.status, filefan::types::FileStatus::Created);
    assert!(h.repo.find_ordered_file_parts(&file_id).await.unwrap().is_empty());
}

/// Download admission is strict: a missing part at its hosting node
/// fails the whole Load, not just that part.
#[tokio::test]
async fn download_fails_when_a_part_is_missing_at_its_node() {
    let h = build(2);
    register_node(&h, "s0", 1024).await;
    register_node(&h, "s1", 1024).await;

    let file_id = h.orchestrator.prepare().await.unwrap();
    let info = FileInfo {
        name: "missing-part.bin".to_string(),
        content_type: None,
        size: 40,
    };
    h.orchestrator
        .store(&file_id, info, Cursor::new(vec![7u8; 40]), CancellationToken::new())
        .await
        .unwrap();

    // Simulate a node losing its part between Store and Load by
    // re-registering a fresh, empty mock node under the same host.
    h.factory.register("s0", MockStorageNode::new(1024));

    let mut out = Vec::new();
    let err = h
        .orchestrator
        .load("missing-part.bin", &mut out, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FileStoreError::NotFound));
}

/// Readiness probes that exceed the 200ms admission deadline are not
/// admitted, even though admission still completes promptly.
#[tokio::test]
async fn slow_node_is_excluded_by_the_admission_deadline() {
    use filefan::errors::FileStoreError as Err_;
    use filefan::protocol::{ClientFactory, ReadinessCheck, StorageNodeClient};
    use async_trait::async_trait;

    struct SlowNode;

    #[async_trait]
    impl StorageNodeClient for SlowNode {
        async fn check_readiness(&self, _size: u64) -> Result<ReadinessCheck, Err_> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(ReadinessCheck { id: "late".to_string(), ready: true })
        }
        async fn check_file_part_existence(&self, _remote_id: &str) -> Result<bool, Err_> {
            Ok(true)
        }
        async fn upload_file(&self, _remote_id: &str) -> Result<Box<dyn filefan::protocol::UploadStream>, Err_> {
            unreachable!("not exercised by this test")
        }
        async fn get_file(&self, _remote_id: &str, _chunk_size: u64) -> Result<Box<dyn filefan::protocol::DownloadStream>, Err_> {
            unreachable!("not exercised by this test")
        }
    }

    struct MixedFactory;

    #[async_trait]
    impl ClientFactory for MixedFactory {
        async fn new_storage_client(&self, host: &str) -> Result<Arc<dyn StorageNodeClient>, Err_> {
            if host == "slow" {
                Ok(Arc::new(SlowNode))
            } else {
                Ok(MockStorageNode::new(1024 * 1024) as Arc<dyn StorageNodeClient>)
            }
        }
    }

    let coordinator = FanOutCoordinator::new(Arc::new(MixedFactory), 3);
    let nodes = vec![
        StorageNode::new("s0".into(), "fast-0".into()),
        StorageNode::new("s1".into(), "fast-1".into()),
        StorageNode::new("s2".into(), "fast-2".into()),
        StorageNode::new("s3".into(), "slow".into()),
    ];

    let start = std::time::Instant::now();
    let plan = coordinator
        .admit_upload(400, &nodes, CancellationToken::new())
        .await
        .unwrap();
    // Admission must not block for the slow node's 500ms answer.
    assert!(start.elapsed() < Duration::from_millis(400));
    assert_eq!(plan.len(), 3);
}
