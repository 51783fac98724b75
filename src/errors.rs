//! The core error taxonomy, and its mapping onto the out-of-scope REST surface.

use thiserror::Error;

/// Errors the fan-out engine can return from `Prepare`/`Store`/`Load`.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// Another `Store` call already holds one of the identity keys.
    #[error("file is being stored")]
    Busy,

    /// A `File` with the given name already exists, or the target `File`
    /// is not in state `Created`.
    #[error("file is stored")]
    Exists,

    /// No `File` with the requested name, or a part's backing node does
    /// not vouch for existence.
    #[error("file not found")]
    NotFound,

    /// Fewer storage nodes are registered than `min_storages`.
    #[error("not enough storages")]
    NotEnoughStorages,

    /// Fewer nodes passed readiness than `min_storages`.
    #[error("not enough file parts")]
    NotEnoughFileParts,

    /// Declared size is smaller than the number of admitted parts.
    #[error("declared size too small for {parts} parts")]
    SizeTooSmall { parts: usize },

    /// The reader returned fewer bytes than the next chunk requires.
    #[error("reader returned fewer bytes than expected")]
    UnexpectedEof,

    /// Bytes received during download did not equal the recorded total.
    #[error("expected {expected} bytes, received {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// A download part produced more bytes than its recorded size.
    #[error("part {seq} exceeded its recorded size of {limit} bytes")]
    Overflow { seq: usize, limit: u64 },

    /// The caller's context was cancelled before the operation completed.
    #[error("cancelled")]
    Cancelled,

    /// Underlying RPC or dial failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Failure from the metadata collaborator not otherwise classified above.
    #[error("repository error: {0}")]
    Repository(#[from] crate::repository::RepositoryError),
}

impl FileStoreError {
    /// Stable short code, useful for logging and for REST front-ends that
    /// map this taxonomy onto HTTP status codes; the mapping itself lives
    /// outside this crate's scope.
    pub fn code(&self) -> &'static str {
        match self {
            FileStoreError::Busy => "busy",
            FileStoreError::Exists => "exists",
            FileStoreError::NotFound => "not_found",
            FileStoreError::NotEnoughStorages => "not_enough_storages",
            FileStoreError::NotEnoughFileParts => "not_enough_file_parts",
            FileStoreError::SizeTooSmall { .. } => "size_too_small",
            FileStoreError::UnexpectedEof => "unexpected_eof",
            FileStoreError::SizeMismatch { .. } => "size_mismatch",
            FileStoreError::Overflow { .. } => "overflow",
            FileStoreError::Cancelled => "cancelled",
            FileStoreError::Transport(_) => "transport",
            FileStoreError::Repository(_) => "repository",
        }
    }
}
