//! Per-sequence vote bookkeeping: one [`TransactionCollector`] tracks every
//! PRE_PREPARE/PREPARE/COMMIT vote seen for a single sequence number, and
//! exposes the single CAS-driven status transition the commitment engine
//! drives.
//!
//! Only `status` is atomic (an `AtomicU8` state machine). Everything else —
//! the main request, per-type sender dedup, and the assembled commit
//! signatures — lives behind one `Mutex`, the same split the original
//! `TransactionCollector` makes between its `std::atomic<TransactionStatue>`
//! and its `std::mutex mutex_`-guarded fields. A lock-free structure for
//! the vote sets themselves was considered and rejected (spec.md §9):
//! votes arrive in small, bursty batches, so contention is low and a single
//! mutex is both simpler and easier to reason about under Byzantine input.

use pbft_types::message::{MessageType, Request, Signature};
use pbft_types::replica::ReplicaId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CollectorStatus {
    None = 0,
    PrePrepared = 1,
    Prepared = 2,
    Committed = 3,
    Executed = 4,
}

impl CollectorStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => CollectorStatus::PrePrepared,
            2 => CollectorStatus::Prepared,
            3 => CollectorStatus::Committed,
            4 => CollectorStatus::Executed,
            _ => CollectorStatus::None,
        }
    }
}

/// The outcome of registering a vote, telling the caller whether this vote
/// pushed the collector across a quorum threshold.
#[derive(Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Recorded, no new quorum reached.
    Recorded,
    /// This sender had already voted for this phase at this seq — ignored.
    Duplicate,
    /// This vote was the `2f+1`-th for its phase; the collector has moved
    /// to the next status.
    QuorumReached(CollectorStatus),
}

#[derive(Default)]
struct Inner {
    main_request: Option<Request>,
    votes: HashMap<MessageType, HashSet<ReplicaId>>,
    commit_certs: Vec<Signature>,
}

pub struct TransactionCollector {
    seq: u64,
    n: usize,
    f: usize,
    status: AtomicU8,
    inner: Mutex<Inner>,
}

impl TransactionCollector {
    pub fn new(seq: u64, n: usize, f: usize) -> Self {
        Self {
            seq,
            n,
            f,
            status: AtomicU8::new(CollectorStatus::None as u8),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn status(&self) -> CollectorStatus {
        CollectorStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Quorum size for PREPARE/COMMIT certificates: `2f + 1`.
    fn quorum(&self) -> usize {
        2 * self.f + 1
    }

    /// Records the primary's PRE_PREPARE batch, set once per collector.
    /// Returns `false` if a (different) main request was already set —
    /// the caller should treat a second, conflicting PRE_PREPARE as a
    /// protocol violation rather than silently overwriting the first.
    pub fn set_main_request(&self, request: Request) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.main_request.is_some() {
            return false;
        }
        inner.main_request = Some(request);
        self.status
            .compare_exchange(
                CollectorStatus::None as u8,
                CollectorStatus::PrePrepared as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok();
        true
    }

    pub fn main_request(&self) -> Option<Request> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).main_request.clone()
    }

    /// Registers a PREPARE or COMMIT vote from `sender`, advancing status
    /// to [`CollectorStatus::Prepared`] / [`CollectorStatus::Committed`]
    /// once `2f+1` distinct senders have voted for that phase.
    pub fn add_vote(&self, r#type: MessageType, sender: ReplicaId, sig: Option<Signature>) -> VoteOutcome {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let senders = inner.votes.entry(r#type).or_default();
        if !senders.insert(sender) {
            return VoteOutcome::Duplicate;
        }
        let count = senders.len();
        let quorum = self.quorum();

        if let Some(sig) = sig {
            if r#type == MessageType::Commit {
                inner.commit_certs.push(sig);
            }
        }

        if count < quorum {
            return VoteOutcome::Recorded;
        }

        let (from, to) = match r#type {
            MessageType::Prepare => (CollectorStatus::PrePrepared, CollectorStatus::Prepared),
            MessageType::Commit => (CollectorStatus::Prepared, CollectorStatus::Committed),
            _ => return VoteOutcome::Recorded,
        };
        drop(inner);

        match self.status.compare_exchange(
            from as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => VoteOutcome::QuorumReached(to),
            // Already past `from` (e.g. quorum reached by a concurrent
            // caller first) — not an error, just not *this* caller's
            // transition to report.
            Err(_) => VoteOutcome::Recorded,
        }
    }

    /// Marks this collector executed. Idempotent: returns `false` if it was
    /// already executed.
    pub fn mark_executed(&self) -> bool {
        self.status
            .compare_exchange(
                CollectorStatus::Committed as u8,
                CollectorStatus::Executed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn commit_certs(&self) -> Vec<Signature> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).commit_certs.clone()
    }

    pub fn vote_count(&self, r#type: MessageType) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .votes
            .get(&r#type)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_types::message::HashType;

    fn sig(signer: ReplicaId) -> Signature {
        Signature {
            signer_id: signer,
            sig_bytes: vec![],
            hash_type: HashType::Sha256,
        }
    }

    #[test]
    fn main_request_is_set_once() {
        let c = TransactionCollector::new(1, 4, 1);
        let req = Request::stripped(MessageType::PrePrepare, 0, 1, 1, vec![]);
        assert!(c.set_main_request(req.clone()));
        assert!(!c.set_main_request(req));
        assert_eq!(c.status(), CollectorStatus::PrePrepared);
    }

    #[test]
    fn prepare_quorum_advances_status() {
        let c = TransactionCollector::new(1, 4, 1);
        c.set_main_request(Request::stripped(MessageType::PrePrepare, 0, 1, 1, vec![]));

        // f=1 -> quorum = 2f+1 = 3
        assert_eq!(
            c.add_vote(MessageType::Prepare, 1, None),
            VoteOutcome::Recorded
        );
        assert_eq!(
            c.add_vote(MessageType::Prepare, 2, None),
            VoteOutcome::Recorded
        );
        assert_eq!(
            c.add_vote(MessageType::Prepare, 3, None),
            VoteOutcome::QuorumReached(CollectorStatus::Prepared)
        );
        assert_eq!(c.status(), CollectorStatus::Prepared);
    }

    #[test]
    fn duplicate_vote_from_same_sender_is_ignored() {
        let c = TransactionCollector::new(1, 4, 1);
        c.set_main_request(Request::stripped(MessageType::PrePrepare, 0, 1, 1, vec![]));
        assert_eq!(
            c.add_vote(MessageType::Prepare, 1, None),
            VoteOutcome::Recorded
        );
        assert_eq!(
            c.add_vote(MessageType::Prepare, 1, None),
            VoteOutcome::Duplicate
        );
        assert_eq!(c.vote_count(MessageType::Prepare), 1);
    }

    #[test]
    fn commit_quorum_collects_certs_and_advances() {
        let c = TransactionCollector::new(1, 4, 1);
        c.set_main_request(Request::stripped(MessageType::PrePrepare, 0, 1, 1, vec![]));
        c.add_vote(MessageType::Prepare, 1, None);
        c.add_vote(MessageType::Prepare, 2, None);
        c.add_vote(MessageType::Prepare, 3, None);

        c.add_vote(MessageType::Commit, 1, Some(sig(1)));
        c.add_vote(MessageType::Commit, 2, Some(sig(2)));
        let outcome = c.add_vote(MessageType::Commit, 3, Some(sig(3)));

        assert_eq!(outcome, VoteOutcome::QuorumReached(CollectorStatus::Committed));
        assert_eq!(c.commit_certs().len(), 3);
        assert!(c.mark_executed());
        assert_eq!(c.status(), CollectorStatus::Executed);
        assert!(!c.mark_executed());
    }
}
