use super::{MetadataRepository, RepositoryError};
use crate::types::{File, FilePart, FileStatus, StorageNode};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

/// In-memory `MetadataRepository`, keyed the same way a real database
/// table would be. Not durable across restarts; intended for tests and
/// the demo CLI, not production use.
#[derive(Default)]
pub struct InMemoryRepository {
    files_by_id: DashMap<String, File>,
    name_index: DashMap<String, String>,
    storages: DashMap<String, StorageNode>,
    // A single lock around part inserts keeps (file_id, seq) uniqueness
    // and ordering simple without per-file locking machinery.
    parts: Mutex<Vec<FilePart>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataRepository for InMemoryRepository {
    async fn create_file(&self, file: File) -> Result<(), RepositoryError> {
        if self.files_by_id.contains_key(&file.id) {
            return Err(RepositoryError::AlreadyExists);
        }
        self.files_by_id.insert(file.id.clone(), file);
        Ok(())
    }

    async fn update_file_info(
        &self,
        id: &str,
        name: String,
        content_type: Option<String>,
        size: u64,
        status: FileStatus,
    ) -> Result<(), RepositoryError> {
        let mut entry = self.files_by_id.get_mut(id).ok_or(RepositoryError::NotFound)?;
        entry.name = Some(name.clone());
        entry.content_type = content_type;
        entry.size = size;
        entry.status = status;
        entry.updated_at = chrono::Utc::now();
        drop(entry);
        self.name_index.insert(name, id.to_string());
        Ok(())
    }

    async fn get_file(&self, id: &str) -> Result<File, RepositoryError> {
        self.files_by_id
            .get(id)
            .map(|f| f.clone())
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_file_by_name(&self, name: &str) -> Result<File, RepositoryError> {
        let id = self
            .name_index
            .get(name)
            .map(|id| id.clone())
            .ok_or(RepositoryError::NotFound)?;
        self.get_file(&id).await
    }

    async fn create_or_update_storage(&self, node: StorageNode) -> Result<(), RepositoryError> {
        self.storages
            .entry(node.id.clone())
            .and_modify(|existing| {
                existing.host = node.host.clone();
                existing.updated_at = chrono::Utc::now();
            })
            .or_insert(node);
        Ok(())
    }

    async fn get_storage(&self, id: &str) -> Result<StorageNode, RepositoryError> {
        self.storages
            .get(id)
            .map(|n| n.clone())
            .ok_or(RepositoryError::NotFound)
    }

    async fn find_storages(&self) -> Result<Vec<StorageNode>, RepositoryError> {
        Ok(self.storages.iter().map(|e| e.value().clone()).collect())
    }

    async fn create_file_part(&self, part: FilePart) -> Result<(), RepositoryError> {
        self.parts.lock().push(part);
        Ok(())
    }

    async fn create_file_parts(&self, parts: Vec<FilePart>) -> Result<(), RepositoryError> {
        self.parts.lock().extend(parts);
        Ok(())
    }

    async fn find_ordered_file_parts(&self, file_id: &str) -> Result<Vec<FilePart>, RepositoryError> {
        let mut matching: Vec<FilePart> = self
            .parts
            .lock()
            .iter()
            .filter(|p| p.file_id == file_id)
            .cloned()
            .collect();
        matching.sort_by_key(|p| p.seq);
        Ok(matching)
    }
}
