//! The `RepositoryStore` seam and an in-memory default.

use crate::model::{Repository, RepositoryField, RepositoryId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no repository found with id {0}")]
    NotFound(RepositoryId),
}

#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn find_one(&self, id: RepositoryId) -> Result<Option<Repository>, StoreError>;
    async fn update(
        &self,
        record: &Repository,
        fields: &[RepositoryField],
    ) -> Result<(), StoreError>;
}

/// In-memory `RepositoryStore`, guarded by a `tokio::sync::RwLock` so reads
/// don't block each other while still serializing writes.
#[derive(Clone, Default)]
pub struct InMemoryRepositoryStore {
    records: Arc<RwLock<HashMap<RepositoryId, Repository>>>,
}

impl InMemoryRepositoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: Repository) {
        self.records.write().await.insert(record.id, record);
    }

    pub async fn get(&self, id: RepositoryId) -> Option<Repository> {
        self.records.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl RepositoryStore for InMemoryRepositoryStore {
    async fn find_one(&self, id: RepositoryId) -> Result<Option<Repository>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn update(
        &self,
        record: &Repository,
        // The in-memory store always writes the whole record; a real
        // SQL-backed store would use `fields` to build a targeted
        // `UPDATE ... SET` statement.
        _fields: &[RepositoryField],
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if !records.contains_key(&record.id) {
            return Err(StoreError::NotFound(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }
}
