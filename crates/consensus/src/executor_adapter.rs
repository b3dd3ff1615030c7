//! Bridges committed batches to the [`Executor`] capability trait, absorbing
//! them in strictly increasing sequence order even though commit quorum can
//! be reached for several sequences out of order (spec.md §4.4's "execution
//! itself happens strictly in seq order").

use crate::checkpoint::CheckpointManager;
use crate::collector_pool::CollectorPool;
use crate::sequence::SequenceManager;
use pbft_api::executor::Executor;
use pbft_api::metrics::CommitmentMetrics;
use pbft_transport::ReplicaBroadcaster;
use pbft_types::codec::{from_bytes_canonical, to_bytes_canonical};
use pbft_types::message::{BatchClientRequest, BatchClientResponse, Envelope, HashType, MessageType, Request, Signature};
use pbft_types::replica::ReplicaId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A batch that reached COMMIT quorum, handed off by the commitment engine.
pub struct CommittedBatch {
    pub seq: u64,
    pub request: Request,
    pub commit_certs: Vec<Signature>,
}

/// Bound on the number of committed batches awaiting execution. Sized well
/// above any realistic `max_in_flight` window so the channel itself is
/// never the bottleneck (spec.md §5's water mark already bounds backlog).
pub const EXEC_QUEUE_CAPACITY: usize = 4096;

pub struct ExecutorAdapter {
    executor: Arc<dyn Executor>,
    sequence_manager: Arc<SequenceManager>,
    checkpoint_manager: Arc<CheckpointManager>,
    collector_pool: Arc<CollectorPool>,
    metrics: Arc<dyn CommitmentMetrics>,
}

impl ExecutorAdapter {
    pub fn new(
        executor: Arc<dyn Executor>,
        sequence_manager: Arc<SequenceManager>,
        checkpoint_manager: Arc<CheckpointManager>,
        collector_pool: Arc<CollectorPool>,
        metrics: Arc<dyn CommitmentMetrics>,
    ) -> Self {
        Self {
            executor,
            sequence_manager,
            checkpoint_manager,
            collector_pool,
            metrics,
        }
    }

    /// Drains committed batches in seq order, calling the executor and
    /// routing each RESPONSE back to its proxy. Out-of-order completions
    /// (a higher seq's COMMIT quorum lands before a lower one's) are held
    /// in `pending` until their predecessor has executed.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<CommittedBatch>,
        broadcaster: Arc<ReplicaBroadcaster>,
        self_id: ReplicaId,
        sign: impl Fn(&[u8]) -> Vec<u8>,
    ) {
        let mut pending: BTreeMap<u64, CommittedBatch> = BTreeMap::new();
        let mut next_seq = 1u64;

        loop {
            let batch = match rx.recv().await {
                Some(b) => b,
                None => return,
            };
            pending.insert(batch.seq, batch);

            while let Some(batch) = pending.remove(&next_seq) {
                self.execute_one(batch, &broadcaster, self_id, &sign).await;
                next_seq += 1;
            }
        }
    }

    async fn execute_one(
        &self,
        batch: CommittedBatch,
        broadcaster: &ReplicaBroadcaster,
        self_id: ReplicaId,
        sign: &impl Fn(&[u8]) -> Vec<u8>,
    ) {
        let seq = batch.seq;
        let request = batch.request;
        let client_batch: BatchClientRequest = match from_bytes_canonical(&request.data) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(seq, error = %e, "failed to decode committed batch body");
                return;
            }
        };

        let outcome = self.executor.execute_batch(seq, &client_batch).await;
        self.metrics.on_executed(seq);

        let request_hash = if request.hash.is_empty() {
            outcome.state_hash.to_vec()
        } else {
            request.hash.clone()
        };
        self.checkpoint_manager.add_commit_data(seq, &request_hash);
        self.sequence_manager.mark_executed(seq);
        let collector = self.collector_pool.get(seq);
        if collector.seq() == seq {
            collector.mark_executed();
        }
        self.collector_pool.update(seq);

        if !self.executor.needs_response(&client_batch) {
            return;
        }

        let response = BatchClientResponse {
            local_id: client_batch.local_id,
            seq,
            outputs: outcome.outputs,
        };
        let payload = to_bytes_canonical(&response);
        let response_request = Request {
            r#type: MessageType::Response,
            seq,
            view: request.view,
            sender_id: self_id,
            proxy_id: request.proxy_id,
            hash: Vec::new(),
            data: payload,
            data_signature: None,
            committed_certs: batch.commit_certs,
        };
        let request_bytes = to_bytes_canonical(&response_request);
        let sig_bytes = sign(&request_bytes);
        let envelope = Envelope {
            payload: request_bytes,
            signature: Signature {
                signer_id: self_id,
                sig_bytes,
                hash_type: HashType::Sha256,
            },
        };
        if let Err(e) = broadcaster.unicast(request.proxy_id, &envelope) {
            tracing::warn!(seq, proxy = request.proxy_id, error = %e, "failed to deliver response to proxy");
        }
    }
}
