//! The PBFT three-phase commit core: collector pool, transaction collector,
//! commitment engine, checkpoint manager, sequence manager, and system info.
//!
//! This crate has no notion of client connections or transport framing of
//! its own — it consumes [`pbft_transport::ReplicaBroadcaster`] to send and
//! is driven by whatever owns the transport's inbound loop (`pbft-node`).

pub mod checkpoint;
pub mod collector_pool;
pub mod commitment;
pub mod executor_adapter;
pub mod sequence;
pub mod system_info;
pub mod transaction_collector;

pub use checkpoint::{CheckpointData, CheckpointManager};
pub use collector_pool::CollectorPool;
pub use commitment::CommitmentEngine;
pub use executor_adapter::ExecutorAdapter;
pub use sequence::SequenceManager;
pub use system_info::SystemInfo;
pub use transaction_collector::TransactionCollector;
