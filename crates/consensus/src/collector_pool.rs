//! A fixed-size, double-buffered ring of [`TransactionCollector`]s, indexed
//! by sequence number modulo a power-of-two mask.
//!
//! Grounded directly in the original `LockFreeCollectorPool`: capacity is
//! rounded up to the next power of two above `2 * window_size`, the backing
//! vector holds `capacity << 1` slots so two adjacent "generations" of
//! sequence numbers never alias the same slot, and `update(seq)` rotates
//! the *sibling* slot (`idx ^ capacity`) to host `seq + capacity` — the
//! slot a caller is currently reading via `get(seq)` is never the one being
//! replaced.

use crate::transaction_collector::TransactionCollector;
use pbft_api::metrics::CollectorPoolMetrics;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

fn next_power_of_two_capacity(window_size: u32) -> u32 {
    let mut cap = 1u32;
    while cap < window_size {
        cap <<= 1;
    }
    cap
}

pub struct CollectorPool {
    capacity: u32,
    mask: u64,
    n: usize,
    f: usize,
    slots: Vec<RwLock<Arc<TransactionCollector>>>,
    occupied: AtomicU32,
    metrics: Arc<dyn CollectorPoolMetrics>,
}

impl CollectorPool {
    /// `window_size` is the maximum number of in-flight sequences the pool
    /// must be able to track concurrently (spec.md §5's `max_in_flight`).
    pub fn new(window_size: u32, n: usize, f: usize, metrics: Arc<dyn CollectorPoolMetrics>) -> Self {
        let capacity = next_power_of_two_capacity(window_size * 2);
        let mask = (u64::from(capacity) << 1) - 1;
        let total_slots = (capacity << 1) as usize;
        let slots = (0..total_slots)
            .map(|i| RwLock::new(Arc::new(TransactionCollector::new(i as u64, n, f))))
            .collect();
        Self {
            capacity,
            mask,
            n,
            f,
            slots,
            occupied: AtomicU32::new(0),
            metrics,
        }
    }

    /// Returns the collector currently responsible for `seq`. Always
    /// succeeds: the returned collector may belong to a different (stale or
    /// future) sequence if `seq` hasn't been rotated into place yet — check
    /// `collector.seq()` before trusting it.
    pub fn get(&self, seq: u64) -> Arc<TransactionCollector> {
        let idx = (seq & self.mask) as usize;
        self.slots[idx]
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Rotates the slot pool forward once `seq` is fully executed, making
    /// room for `seq + capacity`. A no-op if the slot at `seq`'s index no
    /// longer belongs to `seq` (a stale or repeated call, per the pool's
    /// rotate-once invariant).
    pub fn update(&self, seq: u64) {
        let idx = (seq & self.mask) as usize;
        let current_seq = self.slots[idx]
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .seq();
        if current_seq != seq {
            self.metrics.on_stale_update_ignored(seq);
            return;
        }
        let sibling_idx = idx ^ (self.capacity as usize);
        let replacement = Arc::new(TransactionCollector::new(
            seq + u64::from(self.capacity),
            self.n,
            self.f,
        ));
        *self.slots[sibling_idx]
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = replacement;
        self.metrics.on_slot_rotated(seq);
        self.metrics
            .record_occupancy(self.occupied.load(Ordering::Relaxed) as usize, self.slots.len());
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_api::metrics::NopSink;

    fn pool(window: u32) -> CollectorPool {
        CollectorPool::new(window, 4, 1, Arc::new(NopSink))
    }

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        let p = pool(5);
        assert_eq!(p.capacity(), 16);
    }

    #[test]
    fn capacity_is_exact_when_window_already_doubles_to_a_power_of_two() {
        // window_size=8 -> 2*window_size=16, already a power of two: the
        // smallest power of two >= 16 is 16 itself, not 32.
        let p = pool(8);
        assert_eq!(p.capacity(), 16);
    }

    #[test]
    fn get_returns_slot_seeded_with_its_own_index() {
        let p = pool(5);
        assert_eq!(p.get(3).seq(), 3);
    }

    #[test]
    fn update_rotates_the_sibling_slot_only() {
        let p = pool(5);
        let cap = p.capacity() as u64;
        let target_idx = 3u64;

        p.update(target_idx);
        // the slot at `target_idx` is unaffected...
        assert_eq!(p.get(target_idx).seq(), target_idx);
        // ...but the sibling slot now hosts seq + capacity.
        let sibling_seq = target_idx + cap;
        assert_eq!(p.get(sibling_seq).seq(), sibling_seq);
    }

    #[test]
    fn stale_update_is_a_no_op() {
        let p = pool(5);
        // seq 999 doesn't match whatever the slot at its index was seeded
        // with, so this must not panic or corrupt other slots.
        p.update(999);
        assert_eq!(p.get(0).seq(), 0);
    }
}
