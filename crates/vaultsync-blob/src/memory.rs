//! In-memory object store
//!
//! Backed by a concurrent map. Holds every object for the life of the
//! process; intended for tests and single-node ephemeral deployments.

use async_trait::async_trait;
use dashmap::DashMap;

use vaultsync_core::ports::ObjectStore;

/// Object store keeping all objects in process memory
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when no objects are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: Option<&str>)
        -> anyhow::Result<()> {
        self.objects.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.objects.get(key).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemoryObjectStore::new();
        store.put("user-1/blob-1", b"payload", None).await.unwrap();

        assert_eq!(
            store.get("user-1/blob-1").await.unwrap().as_deref(),
            Some(b"payload".as_ref())
        );
        assert!(store.get("user-1/other").await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }
}
