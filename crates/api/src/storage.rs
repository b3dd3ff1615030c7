//! Durable key-value storage capability, used for checkpoint persistence
//! and whatever state the [`crate::executor::Executor`] needs to survive a
//! restart.

use async_trait::async_trait;
use pbft_types::error::StorageError;

/// A point-in-time, read-only view of a [`KvStore`].
///
/// Lets a caller (e.g. the checkpoint manager computing a state digest)
/// read a consistent set of keys without holding up concurrent writes.
pub trait StorageSnapshot: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
}

/// A durable, ordered key-value store.
///
/// Backed by `redb` in production (`pbft-storage`), and by a
/// `BTreeMap`-backed in-memory store in tests — both behind this same
/// trait so `pbft-consensus` never depends on either concretely.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    async fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// Returns all entries with keys in `[start, end)`, in key order.
    async fn range(
        &self,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Takes a consistent point-in-time read view.
    fn snapshot(&self) -> Result<Box<dyn StorageSnapshot>, StorageError>;
}
