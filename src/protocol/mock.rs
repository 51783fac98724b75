//! In-process test double for the node protocol, used across the test
//! suite in place of a real gRPC storage-node daemon.

use super::{ClientFactory, DownloadStream, ReadinessCheck, StorageNodeClient, UploadOutcome, UploadStream};
use crate::errors::FileStoreError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

struct StoredPart {
    data: Vec<u8>,
    hash: String,
}

/// A fake storage node: accepts parts up to `capacity` bytes, keeps them
/// in memory, and answers `CheckFilePartExistence`/`GetFile` from that
/// store. `max_concurrent` bounds how many readiness checks it accepts
/// before refusing (`ready: false`), modelling a node under load.
pub struct MockStorageNode {
    capacity: u64,
    parts: DashMap<String, StoredPart>,
    outstanding: AtomicU64,
    max_concurrent: u64,
}

impl MockStorageNode {
    pub fn new(capacity: u64) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            parts: DashMap::new(),
            outstanding: AtomicU64::new(0),
            max_concurrent: u64::MAX,
        })
    }

    pub fn with_max_concurrent(capacity: u64, max_concurrent: u64) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            parts: DashMap::new(),
            outstanding: AtomicU64::new(0),
            max_concurrent,
        })
    }

    pub fn stored_len(&self) -> usize {
        self.parts.len()
    }
}

#[async_trait]
impl StorageNodeClient for MockStorageNode {
    async fn check_readiness(&self, size: u64) -> Result<ReadinessCheck, FileStoreError> {
        if size > self.capacity || self.outstanding.load(Ordering::SeqCst) >= self.max_concurrent {
            return Ok(ReadinessCheck {
                id: String::new(),
                ready: false,
            });
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(ReadinessCheck {
            id: Uuid::new_v4().to_string(),
            ready: true,
        })
    }

    async fn check_file_part_existence(&self, remote_id: &str) -> Result<bool, FileStoreError> {
        Ok(self.parts.contains_key(remote_id))
    }

    async fn upload_file(&self, remote_id: &str) -> Result<Box<dyn UploadStream>, FileStoreError> {
        Ok(Box::new(MockUploadStream {
            parts: self.parts.clone(),
            remote_id: remote_id.to_string(),
            buf: BytesMut::new(),
        }))
    }

    async fn get_file(
        &self,
        remote_id: &str,
        chunk_size: u64,
    ) -> Result<Box<dyn DownloadStream>, FileStoreError> {
        let stored = self
            .parts
            .get(remote_id)
            .ok_or(FileStoreError::NotFound)?
            .data
            .clone();
        Ok(Box::new(MockDownloadStream {
            data: stored,
            offset: 0,
            chunk_size: chunk_size.max(1) as usize,
        }))
    }
}

struct MockUploadStream {
    parts: DashMap<String, StoredPart>,
    remote_id: String,
    buf: BytesMut,
}

#[async_trait]
impl UploadStream for MockUploadStream {
    async fn send(&mut self, data: Bytes) -> Result<(), FileStoreError> {
        self.buf.extend_from_slice(&data);
        Ok(())
    }

    async fn close_and_recv(self: Box<Self>) -> Result<UploadOutcome, FileStoreError> {
        let data = self.buf.to_vec();
        let hash = hex::encode(Sha256::digest(&data));
        let size = data.len() as u64;
        self.parts.insert(
            self.remote_id.clone(),
            StoredPart {
                data,
                hash: hash.clone(),
            },
        );
        Ok(UploadOutcome {
            id: self.remote_id,
            hash,
            size,
        })
    }
}

struct MockDownloadStream {
    data: Vec<u8>,
    offset: usize,
    chunk_size: usize,
}

#[async_trait]
impl DownloadStream for MockDownloadStream {
    async fn recv(&mut self) -> Result<Option<Bytes>, FileStoreError> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = Bytes::copy_from_slice(&self.data[self.offset..end]);
        self.offset = end;
        Ok(Some(chunk))
    }
}

/// Hands out pre-registered `MockStorageNode` handles by host name,
/// standing in for dialing a real address.
pub struct MockClientFactory {
    nodes: DashMap<String, Arc<dyn StorageNodeClient>>,
}

impl Default for MockClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
        }
    }

    pub fn register(&self, host: &str, node: Arc<dyn StorageNodeClient>) {
        self.nodes.insert(host.to_string(), node);
    }
}

#[async_trait]
impl ClientFactory for MockClientFactory {
    async fn new_storage_client(
        &self,
        host: &str,
    ) -> Result<Arc<dyn StorageNodeClient>, FileStoreError> {
        self.nodes
            .get(host)
            .map(|n| n.clone())
            .ok_or_else(|| FileStoreError::Transport(format!("no mock node registered at {host}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn readiness_refuses_over_capacity() {
        let node = MockStorageNode::new(10);
        let check = node.check_readiness(20).await.unwrap();
        assert!(!check.ready);
    }

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let node = MockStorageNode::new(1024);
        let ready = node.check_readiness(11).await.unwrap();
        let mut upload = node.upload_file(&ready.id).await.unwrap();
        upload.send(Bytes::from_static(b"hello ")).await.unwrap();
        upload.send(Bytes::from_static(b"world")).await.unwrap();
        let outcome = upload.close_and_recv().await.unwrap();
        assert_eq!(outcome.size, 11);

        let mut download = node.get_file(&outcome.id, 4).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = download.recv().await.unwrap() {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, b"hello world");
    }

    #[tokio::test]
    async fn existence_check_reflects_uploaded_parts() {
        let node = MockStorageNode::new(1024);
        assert!(!node.check_file_part_existence("missing").await.unwrap());
        let ready = node.check_readiness(1).await.unwrap();
        let mut upload = node.upload_file(&ready.id).await.unwrap();
        upload.send(Bytes::from_static(b"x")).await.unwrap();
        let outcome = upload.close_and_recv().await.unwrap();
        assert!(node
            .check_file_part_existence(&outcome.id)
            .await
            .unwrap());
    }
}
