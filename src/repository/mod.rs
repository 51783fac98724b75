//! Metadata collaborator contract: durable records of files, their
//! parts, and registered storage nodes. Persistence itself (a real
//! database) is an external collaborator and out of scope here; this
//! module defines the trait the fan-out engine depends on plus an
//! in-memory reference implementation used for tests and the demo CLI.

pub mod memory;

use crate::types::{File, FilePart, FileStatus, StorageNode};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("already exists")]
    AlreadyExists,

    #[error("not found")]
    NotFound,
}

/// Durable state backing `Prepare`/`Store`/`Load`. All methods are
/// safe to call concurrently.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    async fn create_file(&self, file: File) -> Result<(), RepositoryError>;

    /// Finalizes a file's name/content-type/size and advances its
    /// status; used by `Store` on success.
    async fn update_file_info(
        &self,
        id: &str,
        name: String,
        content_type: Option<String>,
        size: u64,
        status: FileStatus,
    ) -> Result<(), RepositoryError>;

    async fn get_file(&self, id: &str) -> Result<File, RepositoryError>;

    async fn get_file_by_name(&self, name: &str) -> Result<File, RepositoryError>;

    /// Inserts a node, or updates its host if already registered —
    /// registration is idempotent and re-dialable under a stable id.
    async fn create_or_update_storage(&self, node: StorageNode) -> Result<(), RepositoryError>;

    async fn get_storage(&self, id: &str) -> Result<StorageNode, RepositoryError>;

    async fn find_storages(&self) -> Result<Vec<StorageNode>, RepositoryError>;

    async fn create_file_part(&self, part: FilePart) -> Result<(), RepositoryError>;

    async fn create_file_parts(&self, parts: Vec<FilePart>) -> Result<(), RepositoryError>;

    /// Returns a file's parts ordered by `seq`.
    async fn find_ordered_file_parts(&self, file_id: &str) -> Result<Vec<FilePart>, RepositoryError>;
}
