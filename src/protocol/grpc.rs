//! tonic-based client for the gRPC-style node protocol.
//!
//! Only the client side is implemented — the storage-node daemon that
//! serves `Storage`/`Uploader` is an external collaborator.

use super::pb::storage_client::StorageClient as RawStorageClient;
use super::pb::{
    CheckFilePartExistenceRequest, CheckReadinessRequest, GetFileRequest, UploadFileRequest,
};
use super::{ClientFactory, DownloadStream, ReadinessCheck, StorageNodeClient, UploadOutcome, UploadStream};
use crate::errors::FileStoreError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::Request;
use tracing::debug;

/// `ClientFactory` that dials a fresh gRPC channel per node.
pub struct GrpcClientFactory;

impl Default for GrpcClientFactory {
    fn default() -> Self {
        Self
    }
}

#[async_trait]
impl ClientFactory for GrpcClientFactory {
    async fn new_storage_client(
        &self,
        host: &str,
    ) -> Result<Arc<dyn StorageNodeClient>, FileStoreError> {
        let endpoint = format!("http://{host}");
        let channel = Channel::from_shared(endpoint)
            .map_err(|e| FileStoreError::Transport(e.to_string()))?
            .connect()
            .await
            .map_err(|e| FileStoreError::Transport(e.to_string()))?;
        Ok(Arc::new(GrpcStorageNodeClient {
            inner: RawStorageClient::new(channel),
        }))
    }
}

/// `StorageNodeClient` backed by a live gRPC channel.
pub struct GrpcStorageNodeClient {
    inner: RawStorageClient<Channel>,
}

#[async_trait]
impl StorageNodeClient for GrpcStorageNodeClient {
    async fn check_readiness(&self, size: u64) -> Result<ReadinessCheck, FileStoreError> {
        let mut client = self.inner.clone();
        let resp = client
            .check_readiness(Request::new(CheckReadinessRequest { size: size as i64 }))
            .await
            .map_err(|e| FileStoreError::Transport(e.to_string()))?
            .into_inner();
        Ok(ReadinessCheck {
            id: resp.id,
            ready: resp.ready,
        })
    }

    async fn check_file_part_existence(&self, remote_id: &str) -> Result<bool, FileStoreError> {
        let mut client = self.inner.clone();
        let resp = client
            .check_file_part_existence(Request::new(CheckFilePartExistenceRequest {
                id: remote_id.to_string(),
            }))
            .await
            .map_err(|e| FileStoreError::Transport(e.to_string()))?
            .into_inner();
        Ok(resp.exists)
    }

    async fn upload_file(&self, remote_id: &str) -> Result<Box<dyn UploadStream>, FileStoreError> {
        let mut client = self.inner.clone();
        let (tx, rx) = mpsc::channel::<UploadFileRequest>(1);
        let outbound = ReceiverStream::new(rx);

        // `client.upload_file` blocks until the stream is established;
        // spawn so the caller can start sending chunks concurrently.
        let call = tokio::spawn(async move { client.upload_file(Request::new(outbound)).await });

        Ok(Box::new(GrpcUploadStream {
            remote_id: remote_id.to_string(),
            tx: Some(tx),
            call: Some(call),
        }))
    }

    async fn get_file(
        &self,
        remote_id: &str,
        chunk_size: u64,
    ) -> Result<Box<dyn DownloadStream>, FileStoreError> {
        let mut client = self.inner.clone();
        let stream = client
            .get_file(Request::new(GetFileRequest {
                id: remote_id.to_string(),
                chunk_size: chunk_size as i64,
            }))
            .await
            .map_err(|e| FileStoreError::Transport(e.to_string()))?
            .into_inner();
        Ok(Box::new(GrpcDownloadStream { inner: stream }))
    }
}

type UploadCall = tokio::task::JoinHandle<
    Result<tonic::Response<super::pb::UploadFileResponse>, tonic::Status>,
>;

struct GrpcUploadStream {
    remote_id: String,
    tx: Option<mpsc::Sender<UploadFileRequest>>,
    call: Option<UploadCall>,
}

#[async_trait]
impl UploadStream for GrpcUploadStream {
    async fn send(&mut self, data: Bytes) -> Result<(), FileStoreError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| FileStoreError::Transport("upload stream already closed".to_string()))?;
        tx.send(UploadFileRequest {
            id: self.remote_id.clone(),
            data: data.to_vec(),
        })
        .await
        .map_err(|_| FileStoreError::Transport("node dropped upload stream".to_string()))
    }

    async fn close_and_recv(mut self: Box<Self>) -> Result<UploadOutcome, FileStoreError> {
        // Dropping the sender closes the outbound stream; the node then
        // sends its terminal response.
        self.tx.take();
        let call = self
            .call
            .take()
            .ok_or_else(|| FileStoreError::Transport("upload stream already closed".to_string()))?;
        let resp = call
            .await
            .map_err(|e| FileStoreError::Transport(e.to_string()))?
            .map_err(|e| FileStoreError::Transport(e.to_string()))?
            .into_inner();
        debug!(remote_id = %resp.id, "upload stream closed");
        Ok(UploadOutcome {
            id: resp.id,
            hash: resp.hash,
            size: resp.size as u64,
        })
    }
}

struct GrpcDownloadStream {
    inner: tonic::Streaming<super::pb::GetFileResponse>,
}

#[async_trait]
impl DownloadStream for GrpcDownloadStream {
    async fn recv(&mut self) -> Result<Option<Bytes>, FileStoreError> {
        match self.inner.next().await {
            None => Ok(None),
            Some(Ok(chunk)) => Ok(Some(Bytes::from(chunk.data))),
            Some(Err(status)) => Err(FileStoreError::Transport(status.to_string())),
        }
    }
}
