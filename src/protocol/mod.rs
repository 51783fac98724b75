//! The remote protocol consumed by the fan-out engine: a client-side
//! handle per storage node exposing readiness/existence checks and the
//! two chunked streams (upload, download). This module defines the
//! contract; `grpc` wraps the tonic-generated client for it, `mock`
//! provides an in-process test double.

pub mod grpc;
pub mod mock;

/// Generated from `proto/storage.proto`. The storage-node server side is
/// an external collaborator and is not implemented in this crate.
pub mod pb {
    tonic::include_proto!("filefan");
}

use crate::errors::FileStoreError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Result of `CheckReadiness`: whether the node accepts a part of the
/// advertised size, and the remote id it assigns if so.
#[derive(Debug, Clone)]
pub struct ReadinessCheck {
    pub id: String,
    pub ready: bool,
}

/// Terminal result of an upload stream's `CloseAndRecv`.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub id: String,
    pub hash: String,
    pub size: u64,
}

/// The producer/consumer-facing half of `UploadFile`: repeated `send`,
/// then a terminal `close_and_recv`.
#[async_trait]
pub trait UploadStream: Send {
    async fn send(&mut self, data: Bytes) -> Result<(), FileStoreError>;

    /// Consumes the stream, signalling no more chunks follow, and waits
    /// for the node's terminal response.
    async fn close_and_recv(self: Box<Self>) -> Result<UploadOutcome, FileStoreError>;
}

/// The consumer-facing half of `GetFile`: repeated `recv` until the
/// end-of-stream marker (`Ok(None)`).
#[async_trait]
pub trait DownloadStream: Send {
    async fn recv(&mut self) -> Result<Option<Bytes>, FileStoreError>;
}

/// A client-side handle to one storage node.
#[async_trait]
pub trait StorageNodeClient: Send + Sync {
    async fn check_readiness(&self, size: u64) -> Result<ReadinessCheck, FileStoreError>;

    async fn check_file_part_existence(&self, remote_id: &str) -> Result<bool, FileStoreError>;

    /// `remote_id` is the id the node itself assigned at
    /// `CheckReadiness`; it is threaded through so the node can
    /// correlate this stream with its earlier reservation.
    async fn upload_file(&self, remote_id: &str) -> Result<Box<dyn UploadStream>, FileStoreError>;

    async fn get_file(
        &self,
        remote_id: &str,
        chunk_size: u64,
    ) -> Result<Box<dyn DownloadStream>, FileStoreError>;
}

/// Produces a client handle for a node's advertised address. A failure
/// to connect is treated by the core as "node unavailable", never as a
/// fatal error in its own right.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn new_storage_client(
        &self,
        host: &str,
    ) -> Result<Arc<dyn StorageNodeClient>, FileStoreError>;
}
