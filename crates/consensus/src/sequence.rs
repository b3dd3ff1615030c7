//! Monotonic sequence number issuance with water-mark admission control.
//!
//! Grounded in the original `SystemInfo`'s sequence counter plus the
//! `CheckPoint` water-mark check performed before admitting a new batch:
//! a primary refuses to assign a new sequence once the gap between the
//! next candidate and the highest *executed* sequence would exceed
//! `max_in_flight`, preventing an unbounded backlog of unexecuted batches
//! from piling up while a slow or partitioned backup catches up.

use pbft_types::error::ConsensusError;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct SequenceManager {
    next_seq: AtomicU64,
    max_pending_executed_seq: AtomicU64,
    max_in_flight: u64,
}

impl SequenceManager {
    pub fn new(max_in_flight: u64) -> Self {
        Self {
            next_seq: AtomicU64::new(1),
            max_pending_executed_seq: AtomicU64::new(0),
            max_in_flight,
        }
    }

    /// Issues the next sequence number, or rejects admission if doing so
    /// would push the in-flight window past `max_in_flight`.
    ///
    /// A CAS loop rather than load-then-store: handlers run on the worker
    /// pool concurrently (spec.md §4.5), so two primary-side calls racing
    /// on a plain load+store could both observe the same candidate and
    /// issue it twice, forking the log.
    pub fn next(&self) -> Result<u64, ConsensusError> {
        let mut candidate = self.next_seq.load(Ordering::Acquire);
        loop {
            let executed = self.max_pending_executed_seq.load(Ordering::Acquire);
            if candidate.saturating_sub(executed) > self.max_in_flight {
                return Err(ConsensusError::SeqExhausted {
                    next: candidate,
                    max_in_flight: self.max_in_flight,
                });
            }
            match self.next_seq.compare_exchange_weak(
                candidate,
                candidate + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(candidate),
                Err(actual) => candidate = actual,
            }
        }
    }

    /// Records that `seq` has finished executing, advancing the in-flight
    /// window's floor. Out-of-order calls are tolerated: the floor only
    /// ever moves forward.
    pub fn mark_executed(&self, seq: u64) {
        let _ = self
            .max_pending_executed_seq
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (seq > current).then_some(seq)
            });
    }

    pub fn max_pending_executed_seq(&self) -> u64 {
        self.max_pending_executed_seq.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_monotonically_increasing_sequences() {
        let m = SequenceManager::new(128);
        assert_eq!(m.next().unwrap(), 1);
        assert_eq!(m.next().unwrap(), 2);
        assert_eq!(m.next().unwrap(), 3);
    }

    #[test]
    fn rejects_admission_past_the_water_mark() {
        let m = SequenceManager::new(2);
        assert_eq!(m.next().unwrap(), 1);
        assert_eq!(m.next().unwrap(), 2);
        let err = m.next().unwrap_err();
        assert!(matches!(err, ConsensusError::SeqExhausted { .. }));
    }

    #[test]
    fn marking_executed_advances_the_window() {
        let m = SequenceManager::new(2);
        assert_eq!(m.next().unwrap(), 1);
        assert_eq!(m.next().unwrap(), 2);
        assert!(m.next().is_err());

        m.mark_executed(2);
        assert_eq!(m.max_pending_executed_seq(), 2);
        assert_eq!(m.next().unwrap(), 3);
    }

    #[test]
    fn mark_executed_never_moves_backward() {
        let m = SequenceManager::new(128);
        m.mark_executed(10);
        m.mark_executed(5);
        assert_eq!(m.max_pending_executed_seq(), 10);
    }
}
