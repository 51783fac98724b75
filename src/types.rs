//! Core entities: `File`, `FilePart`, `StorageNode`, and the transient
//! per-upload `PartPlan` inputs that tie them together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a `File`.
///
/// `Created` is the state produced by `Prepare`; `Uploaded` is reached
/// exactly once, by a successful `Store`. Invariant: `status = Uploaded`
/// implies `name` is set, `size > 0`, and at least one `FilePart`
/// references this file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Created,
    Uploaded,
}

/// A file tracked by the metadata collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    /// Set only on successful `Store`.
    pub name: Option<String>,
    pub content_type: Option<String>,
    /// Finalized on `Store`; `0` while `Created`.
    pub size: u64,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl File {
    /// Construct a fresh `File` in state `Created`, as `Prepare` does.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: None,
            content_type: None,
            size: 0,
            status: FileStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for File {
    fn default() -> Self {
        Self::new()
    }
}

/// One contiguous byte-range part of a `File`, hosted on a single node.
///
/// For a given `File` the set of `seq` values is exactly `0..K`, sizes
/// sum to `File::size`, and `(file_id, seq)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePart {
    pub id: String,
    pub file_id: String,
    /// Identifier issued by the hosting node's readiness response.
    pub remote_id: String,
    pub seq: usize,
    pub size: u64,
    /// Hex-encoded SHA-256 of this part's bytes.
    pub hash: String,
    pub storage_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FilePart {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_id: String,
        remote_id: String,
        seq: usize,
        size: u64,
        storage_id: String,
        hash: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            file_id,
            remote_id,
            seq,
            size,
            hash,
            storage_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A registered storage node. Identity is node-chosen and stable;
/// address may change across re-registrations (upsert by id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageNode {
    pub id: String,
    pub host: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StorageNode {
    pub fn new(id: String, host: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            host,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Declared attributes of a `Store` call, finalized into the `File`
/// record on success.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub content_type: Option<String>,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_file_starts_created_with_no_name() {
        let file = File::new();
        assert_eq!(file.status, FileStatus::Created);
        assert!(file.name.is_none());
        assert_eq!(file.size, 0);
        assert!(!file.id.is_empty());
    }

    #[test]
    fn file_ids_are_unique() {
        let a = File::new();
        let b = File::new();
        assert_ne!(a.id, b.id);
    }
}
