//! Client-side request batching and response matching.
//!
//! Grounded in `response_manager.cpp`: a background batcher groups
//! submitted client requests into a `NEW_TXNS` batch and hands it to the
//! primary; `process_response` counts RESPONSE envelopes by their response
//! data hash, bucketed per outstanding batch, and delivers to the client
//! only once `f+1` replicas agree (spec.md §4.6's C1/C2 contract).

use pbft_api::crypto::{SignatureVerifier, SigningKey};
use pbft_api::metrics::ResponseManagerMetrics;
use pbft_consensus::SystemInfo;
use pbft_transport::ReplicaBroadcaster;
use pbft_types::codec::{from_bytes_canonical, to_bytes_canonical};
use pbft_types::message::{
    BatchClientRequest, BatchClientResponse, Envelope, HashType, MessageType, Request, Signature, SubRequest,
};
use pbft_types::replica::ReplicaId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("submission queue is full")]
    QueueFull,
}

pub struct SubmittedRequest {
    request: Request,
    reply: oneshot::Sender<Vec<u8>>,
}

struct PendingBatch {
    replies: Vec<oneshot::Sender<Vec<u8>>>,
}

#[derive(Default)]
struct SeqBucket {
    sealed: bool,
    counts: HashMap<(u64, Vec<u8>), HashSet<ReplicaId>>,
}

const SUBMIT_QUEUE_CAPACITY: usize = 8192;

pub struct ResponseManager {
    self_id: ReplicaId,
    quorum: usize,
    batch_num: usize,
    batch_wait: Duration,
    max_process_txn: u64,
    system_info: Arc<SystemInfo>,
    broadcaster: Arc<ReplicaBroadcaster>,
    signer: Arc<dyn SigningKey>,
    verifier: Arc<dyn SignatureVerifier>,
    metrics: Arc<dyn ResponseManagerMetrics>,
    next_local_id: AtomicU64,
    in_flight: AtomicU64,
    pending: Mutex<HashMap<u64, PendingBatch>>,
    buckets: Mutex<HashMap<u64, SeqBucket>>,
    submit_tx: mpsc::Sender<SubmittedRequest>,
}

impl ResponseManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_id: ReplicaId,
        f: usize,
        batch_num: usize,
        batch_wait: Duration,
        max_process_txn: u64,
        system_info: Arc<SystemInfo>,
        broadcaster: Arc<ReplicaBroadcaster>,
        signer: Arc<dyn SigningKey>,
        verifier: Arc<dyn SignatureVerifier>,
        metrics: Arc<dyn ResponseManagerMetrics>,
    ) -> (Arc<Self>, mpsc::Receiver<SubmittedRequest>) {
        let (submit_tx, submit_rx) = mpsc::channel(SUBMIT_QUEUE_CAPACITY);
        let manager = Arc::new(Self {
            self_id,
            quorum: f + 1,
            batch_num,
            batch_wait,
            max_process_txn,
            system_info,
            broadcaster,
            signer,
            verifier,
            metrics,
            next_local_id: AtomicU64::new(1),
            in_flight: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            buckets: Mutex::new(HashMap::new()),
            submit_tx,
        });
        (manager, submit_rx)
    }

    /// Enqueues a client request for the next batch, returning a receiver
    /// that resolves once `f+1` replicas agree on its response bytes.
    pub fn submit(&self, request: Request) -> Result<oneshot::Receiver<Vec<u8>>, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.submit_tx
            .try_send(SubmittedRequest { request, reply })
            .map_err(|_| SubmitError::QueueFull)?;
        Ok(rx)
    }

    fn sign_envelope(&self, request: &Request) -> Envelope {
        let bytes = to_bytes_canonical(request);
        let sig_bytes = self.signer.sign(&bytes);
        Envelope {
            payload: bytes,
            signature: Signature {
                signer_id: self.self_id,
                sig_bytes,
                hash_type: HashType::Sha256,
            },
        }
    }

    /// The batching background task: pops up to `batch_num` submitted
    /// requests or waits at most `batch_wait`, assembles a `NEW_TXNS`
    /// envelope, and unicasts it to the current primary. While `in_flight`
    /// exceeds `max_process_txn` the loop stalls rather than growing the
    /// backlog further (spec.md §4.6's backpressure).
    pub async fn run_batcher(self: Arc<Self>, mut submit_rx: mpsc::Receiver<SubmittedRequest>) {
        loop {
            if self.in_flight.load(Ordering::Acquire) > self.max_process_txn {
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }

            let mut batch = Vec::new();
            let deadline = tokio::time::Instant::now() + self.batch_wait;
            loop {
                match tokio::time::timeout_at(deadline, submit_rx.recv()).await {
                    Ok(Some(item)) => {
                        batch.push(item);
                        if batch.len() >= self.batch_num {
                            break;
                        }
                    }
                    Ok(None) => {
                        if batch.is_empty() {
                            return;
                        }
                        break;
                    }
                    Err(_elapsed) => break,
                }
            }
            if batch.is_empty() {
                continue;
            }

            self.send_batch(batch).await;
        }
    }

    async fn send_batch(&self, batch: Vec<SubmittedRequest>) {
        let local_id = self.next_local_id.fetch_add(1, Ordering::Relaxed);
        let mut replies = Vec::with_capacity(batch.len());
        let sub_requests: Vec<SubRequest> = batch
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                replies.push(item.reply);
                SubRequest {
                    index: i as u32,
                    client_envelope: self.sign_envelope(&item.request),
                }
            })
            .collect();
        let count = sub_requests.len() as u64;

        let client_batch = BatchClientRequest {
            local_id,
            proxy_id: self.self_id,
            sub_requests,
        };
        let data = to_bytes_canonical(&client_batch);
        let hash = self.verifier.hash(&data).to_vec();
        let data_sig = self.signer.sign(&data);
        let request = Request {
            r#type: MessageType::NewTxns,
            seq: 0,
            view: self.system_info.view(),
            sender_id: self.self_id,
            proxy_id: self.self_id,
            hash,
            data,
            data_signature: Some(Signature {
                signer_id: self.self_id,
                sig_bytes: data_sig,
                hash_type: HashType::Sha256,
            }),
            committed_certs: Vec::new(),
        };

        self.pending.lock().unwrap_or_else(|p| p.into_inner()).insert(local_id, PendingBatch { replies });
        self.in_flight.fetch_add(count, Ordering::AcqRel);
        self.metrics.on_response_batched(count as usize);

        let envelope = self.sign_envelope(&request);
        let primary = self.system_info.primary_id();
        if self.broadcaster.unicast(primary, &envelope).is_err() {
            // Send failure: every queued client connection gets an error
            // response rather than waiting for a RESPONSE that will never
            // arrive (spec.md §4.6's backpressure clause).
            if let Some(pending) = self.pending.lock().unwrap_or_else(|p| p.into_inner()).remove(&local_id) {
                for reply in pending.replies {
                    let _ = reply.send(b"ERROR: failed to reach primary".to_vec());
                }
            }
            self.in_flight.fetch_sub(count, Ordering::AcqRel);
        }
    }

    /// Feeds a received RESPONSE envelope into the matching logic. A no-op
    /// once that batch's response slot has already sealed (one-shot).
    pub fn process_response(&self, envelope: &Envelope) {
        if !self
            .verifier
            .verify(envelope.signature.signer_id, &envelope.payload, &envelope.signature.sig_bytes)
        {
            return;
        }
        let Ok(request) = from_bytes_canonical::<Request>(&envelope.payload) else {
            return;
        };
        if request.r#type != MessageType::Response {
            return;
        }
        let Ok(response) = from_bytes_canonical::<BatchClientResponse>(&request.data) else {
            return;
        };
        // `seq == 0` is the primary's admission-rejection sentinel
        // (spec.md §7): a lone, un-seconded refusal the proxy must honour
        // immediately rather than wait for f+1 matching copies of, since
        // no other replica will ever send one for a batch that was never
        // admitted into the window.
        if response.seq == 0 {
            self.notify_admission_rejected(response.local_id);
            return;
        }
        let response_hash = self.verifier.hash(&request.data).to_vec();

        let sealed_now = {
            let mut buckets = self.buckets.lock().unwrap_or_else(|p| p.into_inner());
            let bucket = buckets.entry(response.local_id).or_default();
            if bucket.sealed {
                return;
            }
            let senders = bucket
                .counts
                .entry((response.seq, response_hash))
                .or_default();
            if !senders.insert(request.sender_id) {
                return;
            }
            if senders.len() < self.quorum {
                false
            } else {
                bucket.sealed = true;
                true
            }
        };
        if !sealed_now {
            return;
        }

        self.metrics.on_response_sealed(response.seq);
        self.metrics.on_response_delivered(response.seq, self.quorum);

        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&response.local_id);
        if let Some(pending) = pending {
            let delivered = pending.replies.len() as u64;
            for (reply, output) in pending.replies.into_iter().zip(response.outputs.into_iter()) {
                let _ = reply.send(output);
            }
            self.in_flight.fetch_sub(delivered, Ordering::AcqRel);
        }
    }

    /// Completes every sub-request in `local_id`'s batch with an error
    /// payload, bypassing the f+1 quorum bucket entirely. Used only for the
    /// primary's admission-rejection sentinel (spec.md §7); ordinary
    /// application responses always go through [`Self::process_response`]'s
    /// matching path.
    fn notify_admission_rejected(&self, local_id: u64) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&local_id);
        if let Some(pending) = pending {
            let delivered = pending.replies.len() as u64;
            for reply in pending.replies {
                let _ = reply.send(b"ERROR: admission rejected, sequence window exhausted".to_vec());
            }
            self.in_flight.fetch_sub(delivered, Ordering::AcqRel);
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }
}
