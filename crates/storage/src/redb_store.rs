//! A `redb`-backed [`KvStore`], using a single table of opaque byte keys
//! and values — the kernel's own wire codec is responsible for whatever
//! structure a key or value needs, this store just persists bytes.
//!
//! `redb` transactions are synchronous; every operation here runs on
//! `tokio::task::spawn_blocking` so it never stalls the async runtime the
//! way the teacher's `RedbEpochStore` background-thread model avoids the
//! same problem.

use async_trait::async_trait;
use pbft_api::storage::{KvStore, StorageSnapshot};
use pbft_types::error::StorageError;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ENTRIES");

#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        // Ensure the table exists before any read transaction is attempted.
        let write_txn = db
            .begin_write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let _ = write_txn
                .open_table(ENTRIES)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl KvStore for RedbStore {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let db = self.db.clone();
        let key = key.to_vec();
        let value = value.to_vec();
        tokio::task::spawn_blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            {
                let mut table = write_txn
                    .open_table(ENTRIES)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
            write_txn
                .commit()
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let db = self.db.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let table = read_txn
                .open_table(ENTRIES)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let value = table
                .get(key.as_slice())
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(value.map(|v| v.value().to_vec()))
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let db = self.db.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            {
                let mut table = write_txn
                    .open_table(ENTRIES)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                table
                    .remove(key.as_slice())
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
            write_txn
                .commit()
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn range(
        &self,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let db = self.db.clone();
        let start = start.to_vec();
        let end = end.to_vec();
        tokio::task::spawn_blocking(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let table = read_txn
                .open_table(ENTRIES)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let mut out = Vec::new();
            let range = table
                .range(start.as_slice()..end.as_slice())
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            for entry in range {
                let (k, v) = entry.map_err(|e| StorageError::Backend(e.to_string()))?;
                out.push((k.value().to_vec(), v.value().to_vec()));
            }
            Ok(out)
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    fn snapshot(&self) -> Result<Box<dyn StorageSnapshot>, StorageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let table = read_txn
            .open_table(ENTRIES)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut entries = Vec::new();
        for item in table
            .iter()
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            let (k, v) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
            entries.push((k.value().to_vec(), v.value().to_vec()));
        }
        Ok(Box::new(FrozenSnapshot { entries }))
    }
}

struct FrozenSnapshot {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl StorageSnapshot for FrozenSnapshot {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_slice() == key)
            .map(|(_, v)| v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RedbStore::open(dir.path().join("test.redb")).expect("open");

        store.put(b"k1", b"v1").await.expect("put");
        assert_eq!(store.get(b"k1").await.expect("get"), Some(b"v1".to_vec()));

        store.delete(b"k1").await.expect("delete");
        assert_eq!(store.get(b"k1").await.expect("get"), None);
    }

    #[tokio::test]
    async fn range_returns_keys_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RedbStore::open(dir.path().join("test.redb")).expect("open");

        store.put(b"a", b"1").await.expect("put");
        store.put(b"b", b"2").await.expect("put");
        store.put(b"c", b"3").await.expect("put");

        let range = store.range(b"a", b"c").await.expect("range");
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].0, b"a");
        assert_eq!(range[1].0, b"b");
    }

    #[tokio::test]
    async fn snapshot_is_frozen_at_read_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RedbStore::open(dir.path().join("test.redb")).expect("open");
        store.put(b"k", b"v1").await.expect("put");

        let snap = store.snapshot().expect("snapshot");
        store.put(b"k", b"v2").await.expect("put");

        assert_eq!(snap.get(b"k"), Some(b"v1".to_vec()));
        assert_eq!(store.get(b"k").await.expect("get"), Some(b"v2".to_vec()));
    }
}
