//! `StoreOrchestrator`: wires admission, transfer, the in-flight guard,
//! and the metadata collaborator into the three operations a caller
//! actually sees — `Prepare`, `Store`, `Load`.

use crate::coordinator::FanOutCoordinator;
use crate::engine::TransferEngine;
use crate::errors::FileStoreError;
use crate::registry::InFlightRegistry;
use crate::repository::MetadataRepository;
use crate::types::{File, FileInfo, FileStatus};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub struct StoreOrchestrator {
    repository: Arc<dyn MetadataRepository>,
    coordinator: Arc<FanOutCoordinator>,
    engine: Arc<TransferEngine>,
    registry: Arc<InFlightRegistry>,
}

impl StoreOrchestrator {
    pub fn new(
        repository: Arc<dyn MetadataRepository>,
        coordinator: Arc<FanOutCoordinator>,
        engine: Arc<TransferEngine>,
        registry: Arc<InFlightRegistry>,
    ) -> Self {
        Self {
            repository,
            coordinator,
            engine,
            registry,
        }
    }

    /// Registers a fresh `File` in state `Created` and returns its id
    /// for a subsequent `Store`.
    #[instrument(skip(self))]
    pub async fn prepare(&self) -> Result<String, FileStoreError> {
        let file = File::new();
        let id = file.id.clone();
        self.repository.create_file(file).await?;
        Ok(id)
    }

    /// Admits, transfers, and finalizes a file. Concurrent `Store`
    /// calls against the same `file_id` or `name` are rejected with
    /// `Busy` rather than serialized — the caller is expected to
    /// retry, not queue behind the winner.
    #[instrument(skip(self, reader, cancel))]
    pub async fn store<R>(
        &self,
        file_id: &str,
        info: FileInfo,
        reader: R,
        cancel: CancellationToken,
    ) -> Result<(), FileStoreError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let keys = vec![file_id.to_string(), info.name.clone()];
        if !self.registry.lock(&keys) {
            return Err(FileStoreError::Busy);
        }
        let result = self.store_locked(file_id, info, reader, cancel).await;
        self.registry.unlock(&keys);
        result
    }

    async fn store_locked<R>(
        &self,
        file_id: &str,
        info: FileInfo,
        reader: R,
        cancel: CancellationToken,
    ) -> Result<(), FileStoreError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if self.repository.get_file_by_name(&info.name).await.is_ok() {
            return Err(FileStoreError::Exists);
        }

        let file = self.repository.get_file(file_id).await?;
        if file.status != FileStatus::Created {
            return Err(FileStoreError::Exists);
        }

        let nodes = self.repository.find_storages().await?;
        let plan = self
            .coordinator
            .admit_upload(info.size, &nodes, cancel.clone())
            .await?;

        let parts = self.engine.upload(reader, &plan, file_id, cancel).await?;

        self.repository.create_file_parts(parts).await?;
        self.repository
            .update_file_info(
                file_id,
                info.name,
                info.content_type,
                info.size,
                FileStatus::Uploaded,
            )
            .await?;
        Ok(())
    }

    /// Reassembles a named, fully-uploaded file into `writer`.
    #[instrument(skip(self, writer, cancel))]
    pub async fn load<W>(
        &self,
        name: &str,
        writer: W,
        cancel: CancellationToken,
    ) -> Result<u64, FileStoreError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let file = self
            .repository
            .get_file_by_name(name)
            .await
            .map_err(|_| FileStoreError::NotFound)?;
        if file.status != FileStatus::Uploaded {
            return Err(FileStoreError::NotFound);
        }

        let parts = self.repository.find_ordered_file_parts(&file.id).await?;
        if parts.is_empty() {
            return Err(FileStoreError::NotFound);
        }

        let nodes = self.repository.find_storages().await?;
        let plan = self
            .coordinator
            .admit_download(&parts, &nodes, cancel.clone())
            .await?;
        let sizes: Vec<u64> = parts.iter().map(|p| p.size).collect();
        self.engine.download(writer, &plan, &sizes, cancel).await
    }
}
