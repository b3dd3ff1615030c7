//! The three-phase commit state machine: primary proposal path, backup
//! PRE_PREPARE/PREPARE/COMMIT handlers, and certificate assembly.
//!
//! Grounded in `commitment.cpp`'s dispatch-by-type handler set, translated
//! from its raw-pointer collector lookups into [`crate::collector_pool`] /
//! [`crate::transaction_collector`] calls. Handlers are re-entrant: they are
//! invoked concurrently by the transport's worker pool and synchronise only
//! through each sequence's collector (spec.md §4.5).

use crate::collector_pool::CollectorPool;
use crate::executor_adapter::CommittedBatch;
use crate::system_info::SystemInfo;
use crate::transaction_collector::{CollectorStatus, TransactionCollector, VoteOutcome};
use pbft_api::crypto::{SignatureVerifier, SigningKey};
use pbft_api::metrics::CommitmentMetrics;
use pbft_transport::ReplicaBroadcaster;
use pbft_types::codec::{from_bytes_canonical, to_bytes_canonical};
use pbft_types::error::{ConsensusError, ValidationError};
use pbft_types::message::{
    BatchClientRequest, BatchClientResponse, Envelope, HashType, MessageType, Request, Signature,
};
use pbft_types::replica::ReplicaId;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::sequence::SequenceManager;

pub struct CommitmentEngine {
    self_id: ReplicaId,
    need_qc: bool,
    system_info: Arc<SystemInfo>,
    sequence_manager: Arc<SequenceManager>,
    collector_pool: Arc<CollectorPool>,
    broadcaster: Arc<ReplicaBroadcaster>,
    verifier: Arc<dyn SignatureVerifier>,
    signer: Arc<dyn SigningKey>,
    metrics: Arc<dyn CommitmentMetrics>,
    exec_tx: mpsc::Sender<CommittedBatch>,
}

impl CommitmentEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_id: ReplicaId,
        need_qc: bool,
        system_info: Arc<SystemInfo>,
        sequence_manager: Arc<SequenceManager>,
        collector_pool: Arc<CollectorPool>,
        broadcaster: Arc<ReplicaBroadcaster>,
        verifier: Arc<dyn SignatureVerifier>,
        signer: Arc<dyn SigningKey>,
        metrics: Arc<dyn CommitmentMetrics>,
        exec_tx: mpsc::Sender<CommittedBatch>,
    ) -> Self {
        Self {
            self_id,
            need_qc,
            system_info,
            sequence_manager,
            collector_pool,
            broadcaster,
            verifier,
            signer,
            metrics,
            exec_tx,
        }
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

    /// Admission refused (spec.md §7's "Admission failure"): the primary
    /// sends a `RESPONSE` straight back to the batch's proxy, carrying
    /// `seq = 0` as a sentinel the proxy's response manager recognises as
    /// "reject immediately, no f+1 quorum required" rather than a normal
    /// application response (spec.md §4.6/§7, E4).
    fn send_admission_rejected(&self, request: &Request) {
        let Ok(batch) = from_bytes_canonical::<BatchClientRequest>(&request.data) else {
            return;
        };
        let response = BatchClientResponse {
            local_id: batch.local_id,
            seq: 0,
            outputs: Vec::new(),
        };
        let payload = to_bytes_canonical(&response);
        let response_request = Request {
            r#type: MessageType::Response,
            seq: 0,
            view: request.view,
            sender_id: self.self_id,
            proxy_id: request.proxy_id,
            hash: Vec::new(),
            data: payload,
            data_signature: None,
            committed_certs: Vec::new(),
        };
        let envelope = self.sign_envelope(&response_request);
        if self.broadcaster.unicast(request.proxy_id, &envelope).is_err() {
            tracing::warn!(
                proxy = request.proxy_id,
                local_id = batch.local_id,
                "failed to deliver admission-rejected response to proxy"
            );
        }
    }

    /// Primary path: a client batch arrives from the response manager as a
    /// `NEW_TXNS`-shaped [`Request`] (type/view/seq/sender not yet filled
    /// in). Assigns the next seq, stamps the request, and broadcasts it as
    /// the canonical PRE_PREPARE.
    ///
    /// A backup receiving `NEW_TXNS` (the proxy guessed the wrong primary,
    /// or a view change is mid-flight) drops it silently rather than
    /// assigning it a sequence of its own, which would fork the log.
    pub fn handle_new_txns(&self, mut request: Request) -> Result<(), ConsensusError> {
        if !self.system_info.is_primary(self.self_id) {
            return Ok(());
        }
        let seq = match self.sequence_manager.next() {
            Ok(seq) => seq,
            Err(err @ ConsensusError::SeqExhausted { .. }) => {
                self.send_admission_rejected(&request);
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        let view = self.system_info.view();
        request.r#type = MessageType::PrePrepare;
        request.view = view;
        request.seq = seq;
        request.sender_id = self.self_id;

        let collector = self.collector_pool.get(seq);
        if collector.seq() != seq {
            return Err(ConsensusError::ProtocolViolation(format!(
                "collector pool has no slot admissible for seq {seq}"
            )));
        }
        collector.set_main_request(request.clone());
        // The primary's own PRE_PREPARE implicitly counts as its PREPARE
        // vote (spec.md §4.4's counting policy).
        collector.add_vote(MessageType::Prepare, self.self_id, None);
        self.metrics.on_phase_entered(seq, "pre_prepare");

        let envelope = self.sign_envelope(&request);
        self.broadcaster.broadcast("pre_prepare", &envelope);
        Ok(())
    }

    /// Dispatches a received, already-transport-verified envelope to the
    /// handler for its [`MessageType`].
    pub fn handle_envelope(&self, envelope: &Envelope) -> Result<(), ConsensusError> {
        let request: Request = from_bytes_canonical(&envelope.payload)
            .map_err(|e| ConsensusError::Validation(ValidationError::Malformed(e)))?;
        if !self
            .verifier
            .verify(envelope.signature.signer_id, &envelope.payload, &envelope.signature.sig_bytes)
        {
            return Err(ConsensusError::Validation(ValidationError::BadSignature(
                envelope.signature.signer_id,
            )));
        }

        match request.r#type {
            MessageType::NewTxns => self.handle_new_txns(request),
            MessageType::PrePrepare => self.handle_pre_prepare(request),
            MessageType::Prepare => self.handle_prepare(request),
            MessageType::Commit => self.handle_commit(request),
            _ => Ok(()),
        }
    }

    /// A vote is admissible only if its view matches, its seq is ahead of
    /// what's already executed, and the collector slot it names is
    /// currently responsible for that seq (spec.md §4.4's "Validity").
    fn vote_is_admissible(&self, request: &Request) -> bool {
        request.view == self.system_info.view()
            && request.seq > self.sequence_manager.max_pending_executed_seq()
    }

    fn handle_pre_prepare(&self, request: Request) -> Result<(), ConsensusError> {
        if request.sender_id != self.system_info.primary_id() || !self.vote_is_admissible(&request) {
            return Ok(());
        }
        let Some(data_signature) = &request.data_signature else {
            return Ok(());
        };
        if !self
            .verifier
            .verify(request.sender_id, &request.data, &data_signature.sig_bytes)
        {
            return Err(ConsensusError::Validation(ValidationError::BadSignature(request.sender_id)));
        }

        let seq = request.seq;
        let collector = self.collector_pool.get(seq);
        if collector.seq() != seq {
            return Ok(());
        }
        if !collector.set_main_request(request.clone()) {
            // A second, conflicting PRE_PREPARE for a slot that already has
            // one is Byzantine behaviour from the primary, not a local bug.
            tracing::warn!(seq, sender = request.sender_id, "duplicate PRE_PREPARE for already-set slot");
            return Ok(());
        }
        self.metrics.on_phase_entered(seq, "pre_prepare");
        let primary_vote = collector.add_vote(MessageType::Prepare, request.sender_id, None);
        // This backup's own PREPARE, implicit the moment it broadcasts one
        // (spec.md §4.4's counting policy) — `ReplicaBroadcaster::broadcast`
        // only reaches peers, never self, so nothing else will ever feed it
        // back into this collector.
        let own_vote = collector.add_vote(MessageType::Prepare, self.self_id, None);

        let prepare = Request::stripped(MessageType::Prepare, request.view, seq, self.self_id, request.hash.clone());
        let envelope = self.sign_envelope(&prepare);
        self.broadcaster.broadcast("prepare", &envelope);

        // Enough PREPAREs from other backups may already have arrived out of
        // order for either of the two votes just recorded above to itself be
        // the one completing the `2f+1` quorum; the CAS inside `add_vote`
        // guarantees at most one of them actually observes the transition.
        for outcome in [primary_vote, own_vote] {
            if let VoteOutcome::QuorumReached(CollectorStatus::Prepared) = outcome {
                self.metrics.on_quorum_reached(seq, "prepare");
                self.enter_prepared(request.view, seq, &request.hash, &collector)?;
            }
        }
        Ok(())
    }

    fn handle_prepare(&self, request: Request) -> Result<(), ConsensusError> {
        if !self.vote_is_admissible(&request) {
            return Ok(());
        }
        let seq = request.seq;
        let collector = self.collector_pool.get(seq);
        if collector.seq() != seq {
            return Ok(());
        }

        match collector.add_vote(MessageType::Prepare, request.sender_id, None) {
            VoteOutcome::Duplicate => {
                self.metrics.on_duplicate_vote(seq, "prepare", request.sender_id);
            }
            VoteOutcome::Recorded => {}
            VoteOutcome::QuorumReached(CollectorStatus::Prepared) => {
                self.metrics.on_quorum_reached(seq, "prepare");
                self.enter_prepared(request.view, seq, &request.hash, &collector)?;
            }
            VoteOutcome::QuorumReached(_) => {}
        }
        Ok(())
    }

    /// Moves a collector from `Prepared` into its COMMIT phase: broadcasts
    /// this replica's own COMMIT and records it as an implicit self-vote
    /// (same reasoning as the PREPARE case in `handle_pre_prepare` —
    /// broadcast never loops back to self). Shared by `handle_pre_prepare`
    /// and `handle_prepare`, since either can be the call that pushes a
    /// collector's PREPARE vote count over the quorum line.
    fn enter_prepared(&self, view: u64, seq: u64, hash: &[u8], collector: &TransactionCollector) -> Result<(), ConsensusError> {
        let mut commit = Request::stripped(MessageType::Commit, view, seq, self.self_id, hash.to_vec());
        let mut own_sig = None;
        if self.need_qc {
            let sig_bytes = self.signer.sign(hash);
            let sig = Signature {
                signer_id: self.self_id,
                sig_bytes,
                hash_type: HashType::Sha256,
            };
            commit.data_signature = Some(sig.clone());
            own_sig = Some(sig);
        }
        // Own vote can itself complete the `2f+1` commit quorum if enough
        // COMMITs from others already arrived out of order, so the same
        // enqueue path `handle_commit` uses applies here too.
        if let VoteOutcome::QuorumReached(CollectorStatus::Committed) =
            collector.add_vote(MessageType::Commit, self.self_id, own_sig)
        {
            self.metrics.on_quorum_reached(seq, "commit");
            self.enqueue_committed(seq, collector)?;
        }
        let envelope = self.sign_envelope(&commit);
        self.broadcaster.broadcast("commit", &envelope);
        Ok(())
    }

    fn handle_commit(&self, request: Request) -> Result<(), ConsensusError> {
        if !self.vote_is_admissible(&request) {
            return Ok(());
        }
        let seq = request.seq;
        let collector = self.collector_pool.get(seq);
        if collector.seq() != seq {
            return Ok(());
        }

        let sig = request.data_signature.clone();
        match collector.add_vote(MessageType::Commit, request.sender_id, sig) {
            VoteOutcome::Duplicate => {
                self.metrics.on_duplicate_vote(seq, "commit", request.sender_id);
            }
            VoteOutcome::Recorded => {}
            VoteOutcome::QuorumReached(CollectorStatus::Committed) => {
                self.metrics.on_quorum_reached(seq, "commit");
                self.enqueue_committed(seq, &collector)?;
            }
            VoteOutcome::QuorumReached(_) => {}
        }
        Ok(())
    }

    /// Hands a just-committed seq's main request and assembled commit
    /// certificates off to the executor's ordered inbox. Shared by
    /// `handle_commit` and `handle_prepare`'s own-vote path: whichever one
    /// observes the `2f+1`-th COMMIT — a received one or this replica's own
    /// implicit vote — drives the same enqueue.
    fn enqueue_committed(&self, seq: u64, collector: &TransactionCollector) -> Result<(), ConsensusError> {
        let Some(main_request) = collector.main_request() else {
            return Err(ConsensusError::ProtocolViolation(format!(
                "commit quorum at seq {seq} with no main request recorded"
            )));
        };
        let commit_certs = collector.commit_certs();
        let batch = CommittedBatch {
            seq,
            request: main_request,
            commit_certs,
        };
        if self.exec_tx.try_send(batch).is_err() {
            tracing::error!(seq, "executor queue full or closed, dropping committed batch");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_api::metrics::NopSink;
    use pbft_types::replica::{ReplicaConfig, ReplicaInfo, Tunables};
    use std::net::{IpAddr, Ipv4Addr};

    struct StubSigner(ReplicaId);
    impl SigningKey for StubSigner {
        fn sign(&self, data: &[u8]) -> Vec<u8> {
            data.to_vec()
        }
        fn replica_id(&self) -> ReplicaId {
            self.0
        }
    }

    struct AcceptAllVerifier;
    impl SignatureVerifier for AcceptAllVerifier {
        fn verify(&self, _signer: ReplicaId, _data: &[u8], _sig: &[u8]) -> bool {
            true
        }
        fn hash(&self, data: &[u8]) -> [u8; 32] {
            let mut out = [0u8; 32];
            for (i, b) in data.iter().take(32).enumerate() {
                out[i] = *b;
            }
            out
        }
    }

    fn config(n: u64, base_port: u16) -> ReplicaConfig {
        ReplicaConfig {
            replicas: (1..=n)
                .map(|id| ReplicaInfo {
                    id,
                    ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                    port: base_port + id as u16,
                    cert: vec![],
                })
                .collect(),
            self_id: 1,
            private_key_path: "k".into(),
            certificate_path: "c".into(),
            tunables: Tunables::default(),
        }
    }

    #[tokio::test]
    async fn primary_path_stamps_and_broadcasts_pre_prepare() {
        let cfg = config(4, 18_100);
        let system_info = Arc::new(SystemInfo::new(&cfg));
        let sequence_manager = Arc::new(SequenceManager::new(128));
        let collector_pool = Arc::new(CollectorPool::new(128, cfg.n(), cfg.max_faults(), Arc::new(NopSink)));
        let transport = pbft_transport::Transport::start(&cfg, Arc::new(NopSink));
        let broadcaster = Arc::new(ReplicaBroadcaster::new(transport, Arc::new(NopSink)));
        let (exec_tx, _exec_rx) = mpsc::channel(16);

        let engine = CommitmentEngine::new(
            1,
            false,
            system_info,
            sequence_manager.clone(),
            collector_pool.clone(),
            broadcaster,
            Arc::new(AcceptAllVerifier),
            Arc::new(StubSigner(1)),
            Arc::new(NopSink),
            exec_tx,
        );

        let request = Request::stripped(MessageType::ClientRequest, 0, 0, 1, vec![7, 7]);
        engine.handle_new_txns(request).unwrap();

        let collector = collector_pool.get(1);
        assert_eq!(collector.seq(), 1);
        assert_eq!(collector.status(), CollectorStatus::PrePrepared);
        assert_eq!(collector.vote_count(MessageType::Prepare), 1);
        assert_eq!(sequence_manager.next().unwrap(), 2);
    }
}
