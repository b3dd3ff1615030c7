//! An in-memory [`KvStore`], used in tests and by tools that don't need
//! durability across restarts.

use async_trait::async_trait;
use pbft_api::storage::{KvStore, StorageSnapshot};
use pbft_types::error::StorageError;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".into()))?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let map = self
            .entries
            .read()
            .map_err(|_| StorageError::Backend("lock poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".into()))?;
        map.remove(key);
        Ok(())
    }

    async fn range(
        &self,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let map = self
            .entries
            .read()
            .map_err(|_| StorageError::Backend("lock poisoned".into()))?;
        Ok(map
            .range(start.to_vec()..end.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn snapshot(&self) -> Result<Box<dyn StorageSnapshot>, StorageError> {
        let map = self
            .entries
            .read()
            .map_err(|_| StorageError::Backend("lock poisoned".into()))?;
        Ok(Box::new(FrozenSnapshot { map: map.clone() }))
    }
}

struct FrozenSnapshot {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl StorageSnapshot for FrozenSnapshot {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let store = MemoryStore::new();
        store.put(b"k", b"v").await.expect("put");
        assert_eq!(store.get(b"k").await.expect("get"), Some(b"v".to_vec()));
        store.delete(b"k").await.expect("delete");
        assert_eq!(store.get(b"k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn range_is_ordered() {
        let store = MemoryStore::new();
        for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
            store.put(k.as_bytes(), v.as_bytes()).await.expect("put");
        }
        let range = store.range(b"a", b"c").await.expect("range");
        assert_eq!(range.len(), 2);
    }
}
