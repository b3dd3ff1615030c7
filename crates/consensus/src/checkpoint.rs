//! Checkpoint hash-chain maintenance and the background broadcaster that
//! announces newly frozen blocks.
//!
//! Grounded in `CheckPointInfo::CalculateHash`: every committed request
//! folds into a running hash chain (`last_hash = H(last_hash, request_hash,
//! last_block_hash)`), but the chain's *block* hash — the value actually
//! shared with other replicas — only advances every [`BLOCK_INTERVAL`]
//! sequences. `checkpoint_water_mark` (spec.md §6's `Tunables`) is a
//! separate, configurable stability/garbage-collection stride; it does not
//! control this cadence. See SPEC_FULL.md §C.1 for why the two are kept
//! distinct rather than unified into one tunable.

use pbft_api::metrics::CheckpointMetrics;
use pbft_transport::ReplicaBroadcaster;
use pbft_types::codec::to_bytes_canonical;
use pbft_types::message::{Envelope, HashType, MessageType, Request, Signature};
use pbft_types::replica::ReplicaId;
use parity_scale_codec::{Decode, Encode};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fixed cadence, in committed sequences, at which the checkpoint hash
/// chain freezes a new block hash. Distinct from the poll interval and
/// from `Tunables::checkpoint_water_mark`.
const BLOCK_INTERVAL: u64 = 2;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
struct HashInfo {
    last_hash: Vec<u8>,
    current_hash: Vec<u8>,
    last_block_hash: Vec<u8>,
}

/// The data actually exchanged in a CHECKPOINT message: a frozen block
/// sequence and its hash.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct CheckpointData {
    pub seq: u64,
    pub hash: Vec<u8>,
}

struct Inner {
    last_seq: u64,
    last_hash: Vec<u8>,
    last_block_hash: Vec<u8>,
    current_block_seq: u64,
    last_stable_checkpoint_seq: u64,
    stable_checkpoints: Vec<CheckpointData>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            last_seq: 0,
            last_hash: Vec::new(),
            last_block_hash: Vec::new(),
            current_block_seq: 0,
            last_stable_checkpoint_seq: 0,
            stable_checkpoints: Vec::new(),
        }
    }
}

pub struct CheckpointManager {
    inner: Mutex<Inner>,
    /// Per-(seq, hash) sender sets for incoming CHECKPOINT reports, fed by
    /// `record_checkpoint_report` until `2f+1` distinct replicas agree
    /// (spec.md §4.7's "Aggregation").
    reports: Mutex<HashMap<(u64, Vec<u8>), HashSet<ReplicaId>>>,
    quorum: usize,
    metrics: Arc<dyn CheckpointMetrics>,
}

impl CheckpointManager {
    pub fn new(f: usize, metrics: Arc<dyn CheckpointMetrics>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            reports: Mutex::new(HashMap::new()),
            quorum: 2 * f + 1,
            metrics,
        }
    }

    /// Records a CHECKPOINT report from `sender` for `(seq, hash)`. Returns
    /// `true` the moment `2f+1` distinct replicas have reported the same
    /// pair, signalling the caller should call
    /// [`CheckpointManager::update_stable_checkpoint`].
    pub fn record_checkpoint_report(&self, seq: u64, hash: Vec<u8>, sender: ReplicaId) -> bool {
        let mut reports = self.reports.lock().unwrap_or_else(|p| p.into_inner());
        let senders = reports.entry((seq, hash)).or_default();
        senders.insert(sender);
        senders.len() == self.quorum
    }

    /// Folds a newly committed request into the hash chain. `hash` is the
    /// request's digest — computed by the caller so this module never needs
    /// its own copy of a [`SignatureVerifier`].
    pub fn add_commit_data(&self, seq: u64, request_hash: &[u8]) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if seq != inner.last_seq + 1 {
            tracing::warn!(seq, last_seq = inner.last_seq, "checkpoint data out of order");
        }
        inner.last_seq = seq;

        let hash_info = HashInfo {
            last_hash: inner.last_hash.clone(),
            current_hash: request_hash.to_vec(),
            last_block_hash: inner.last_block_hash.clone(),
        };
        let hash_bytes = to_bytes_canonical(&hash_info);
        inner.last_hash = hash_bytes.clone();

        if inner.last_seq == inner.current_block_seq + BLOCK_INTERVAL {
            inner.current_block_seq = inner.last_seq;
            inner.last_block_hash = hash_bytes;
            self.metrics.on_block_frozen(inner.current_block_seq);
        }
    }

    pub fn checkpoint_data(&self) -> CheckpointData {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        CheckpointData {
            seq: inner.current_block_seq,
            hash: inner.last_block_hash.clone(),
        }
    }

    /// Folds in a set of `2f+1` matching CHECKPOINT reports, advancing
    /// stability if they describe a later block than the current stable
    /// checkpoint.
    pub fn update_stable_checkpoint(&self, datas: &[CheckpointData]) {
        let Some(first) = datas.first() else {
            return;
        };
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if first.seq <= inner.last_stable_checkpoint_seq {
            return;
        }
        inner.last_stable_checkpoint_seq = first.seq;
        inner.stable_checkpoints = datas.to_vec();
        drop(inner);
        self.metrics.on_checkpoint_stable(first.seq);
    }

    pub fn stable_checkpoint_seq(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).last_stable_checkpoint_seq
    }
}

/// Polls [`CheckpointManager`] once a second and broadcasts a CHECKPOINT
/// message whenever the frozen block has advanced, mirroring the original
/// background `UpdateCheckPointStatus` poll loop.
pub async fn run_checkpoint_broadcaster(
    manager: Arc<CheckpointManager>,
    broadcaster: Arc<ReplicaBroadcaster>,
    self_id: ReplicaId,
    sign: impl Fn(&[u8]) -> Vec<u8> + Send + 'static,
) {
    let mut last_broadcast_seq = 0u64;
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let data = manager.checkpoint_data();
        if data.seq == last_broadcast_seq {
            continue;
        }
        last_broadcast_seq = data.seq;

        let payload = to_bytes_canonical(&data);
        let request = Request {
            r#type: MessageType::Checkpoint,
            seq: data.seq,
            view: 0,
            sender_id: self_id,
            proxy_id: 0,
            hash: Vec::new(),
            data: payload.clone(),
            data_signature: None,
            committed_certs: Vec::new(),
        };
        let request_bytes = to_bytes_canonical(&request);
        let sig_bytes = sign(&request_bytes);
        let envelope = Envelope {
            payload: request_bytes,
            signature: Signature {
                signer_id: self_id,
                sig_bytes,
                hash_type: HashType::Sha256,
            },
        };
        broadcaster.broadcast("checkpoint", &envelope);
        manager.metrics.on_checkpoint_broadcast(data.seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_api::metrics::NopSink;

    fn manager() -> CheckpointManager {
        CheckpointManager::new(1, Arc::new(NopSink))
    }

    #[test]
    fn block_freezes_every_two_committed_sequences() {
        let m = manager();
        m.add_commit_data(1, b"h1");
        assert_eq!(m.checkpoint_data().seq, 0);
        m.add_commit_data(2, b"h2");
        assert_eq!(m.checkpoint_data().seq, 2);
        m.add_commit_data(3, b"h3");
        assert_eq!(m.checkpoint_data().seq, 2);
        m.add_commit_data(4, b"h4");
        assert_eq!(m.checkpoint_data().seq, 4);
    }

    #[test]
    fn stable_checkpoint_only_advances() {
        let m = manager();
        m.update_stable_checkpoint(&[CheckpointData { seq: 4, hash: vec![1] }]);
        assert_eq!(m.stable_checkpoint_seq(), 4);
        m.update_stable_checkpoint(&[CheckpointData { seq: 2, hash: vec![2] }]);
        assert_eq!(m.stable_checkpoint_seq(), 4);
        m.update_stable_checkpoint(&[CheckpointData { seq: 6, hash: vec![3] }]);
        assert_eq!(m.stable_checkpoint_seq(), 6);
    }
}
