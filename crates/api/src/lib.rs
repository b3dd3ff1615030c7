//! Trait contracts shared by every component of the PBFT kernel.
//!
//! Capabilities the kernel depends on — signing, hashing, durable storage,
//! execution, and metrics — are expressed as traits here rather than
//! concrete types, so `pbft-consensus` and `pbft-transport` can be built and
//! tested against in-memory fakes and only wired to `pbft-crypto` /
//! `pbft-storage` at the binary edge in `pbft-node`.

pub mod crypto;
pub mod executor;
pub mod metrics;
pub mod storage;

pub mod prelude {
    pub use crate::crypto::{HashDigest, SignatureVerifier, SigningKey};
    pub use crate::executor::{ExecutionOutcome, Executor};
    pub use crate::metrics::{
        BroadcasterMetrics, CheckpointMetrics, CollectorPoolMetrics, CommitmentMetrics,
        MetricsSink, ResponseManagerMetrics, TransportMetrics,
    };
    pub use crate::storage::{KvStore, StorageSnapshot};
}
