//! In-memory backend, mostly for testing purposes

use super::{BackendError, BlobBackend, StorageBackend};
use crate::hashing::ContentId;
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::RwLock;

/// In-memory blob map that also counts physical writes.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    blobs: Arc<RwLock<HashMap<ContentId, Bytes>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs stored.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Number of `write` calls that reached this backend.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Overwrite a stored blob without any checks. Test hook for corruption.
    pub async fn overwrite(&self, id: &ContentId, data: Bytes) {
        self.blobs.write().await.insert(id.clone(), data);
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    fn kind(&self) -> StorageBackend {
        StorageBackend::Memory
    }

    async fn write(&self, id: &ContentId, data: Bytes) -> Result<(), BackendError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.blobs.write().await.insert(id.clone(), data);
        Ok(())
    }

    async fn read(&self, id: &ContentId) -> Result<Option<Bytes>, BackendError> {
        Ok(self.blobs.read().await.get(id).cloned())
    }

    async fn contains(&self, id: &ContentId) -> Result<bool, BackendError> {
        Ok(self.blobs.read().await.contains_key(id))
    }

    async fn check_ready(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_operations() {
        let backend = MemoryBackend::new();
        assert!(backend.is_empty().await);

        let id = ContentId::of(b"Hello, World!");
        backend
            .write(&id, Bytes::from_static(b"Hello, World!"))
            .await
            .unwrap();

        assert_eq!(backend.len().await, 1);
        assert_eq!(backend.write_count(), 1);
        assert!(backend.contains(&id).await.unwrap());
        assert_eq!(
            backend.read(&id).await.unwrap().unwrap(),
            Bytes::from_static(b"Hello, World!")
        );
    }

    #[tokio::test]
    async fn missing_blob() {
        let backend = MemoryBackend::new();
        let id = ContentId::of(b"absent");
        assert!(backend.read(&id).await.unwrap().is_none());
        assert!(!backend.contains(&id).await.unwrap());
    }
}
