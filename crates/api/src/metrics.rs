//! Metrics emission, split into one sub-trait per component so each module
//! only needs to know about the counters and gauges it itself produces.
//!
//! Unlike the teacher's `ioi-telemetry::sinks` module, which reaches a
//! process-global sink through a `OnceCell<&'static dyn MetricsSink>`, the
//! sink here is always an `Arc<dyn MetricsSink>` handle threaded through
//! component constructors at startup. A global made every unit test that
//! touched metrics order-dependent on whatever test ran first to install
//! the sink; a handle lets each test (and each replica, in a
//! multi-replica-per-process integration test) hold its own.

/// Transport-layer send/receive counters.
pub trait TransportMetrics: Send + Sync {
    fn on_send_attempt(&self, peer: u64);
    fn on_send_success(&self, peer: u64, bytes: usize);
    fn on_send_failure(&self, peer: u64, code: &'static str);
    fn on_frame_received(&self, peer: u64, bytes: usize);
}

/// Broadcaster fan-out counters (one logical send turned into N peer
/// sends).
pub trait BroadcasterMetrics: Send + Sync {
    fn on_broadcast(&self, message_type: &'static str, peer_count: usize);
    fn on_broadcast_partial_failure(&self, message_type: &'static str, failures: usize);
}

/// Collector pool occupancy and rotation counters.
pub trait CollectorPoolMetrics: Send + Sync {
    fn on_slot_rotated(&self, seq: u64);
    fn on_stale_update_ignored(&self, seq: u64);
    fn record_occupancy(&self, occupied: usize, capacity: usize);
}

/// Three-phase commit progression counters.
pub trait CommitmentMetrics: Send + Sync {
    fn on_phase_entered(&self, seq: u64, phase: &'static str);
    fn on_quorum_reached(&self, seq: u64, phase: &'static str);
    fn on_duplicate_vote(&self, seq: u64, phase: &'static str, sender: u64);
    fn on_executed(&self, seq: u64);
}

/// Client response batching and delivery counters.
pub trait ResponseManagerMetrics: Send + Sync {
    fn on_response_batched(&self, batch_size: usize);
    fn on_response_sealed(&self, seq: u64);
    fn on_response_delivered(&self, seq: u64, matching_replicas: usize);
}

/// Checkpoint and hash-chain progression counters.
pub trait CheckpointMetrics: Send + Sync {
    fn on_block_frozen(&self, block_seq: u64);
    fn on_checkpoint_broadcast(&self, seq: u64);
    fn on_checkpoint_stable(&self, seq: u64);
}

/// The full set of metrics capabilities a replica's components emit
/// through, implemented once (over a `prometheus::Registry` in
/// `pbft-telemetry`, or as a no-op in tests) and passed down as a single
/// `Arc<dyn MetricsSink>`.
pub trait MetricsSink:
    TransportMetrics
    + BroadcasterMetrics
    + CollectorPoolMetrics
    + CommitmentMetrics
    + ResponseManagerMetrics
    + CheckpointMetrics
{
}

impl<T> MetricsSink for T where
    T: TransportMetrics
        + BroadcasterMetrics
        + CollectorPoolMetrics
        + CommitmentMetrics
        + ResponseManagerMetrics
        + CheckpointMetrics
{
}

/// A [`MetricsSink`] that discards everything, for tests and tools that
/// don't care about observability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopSink;

impl TransportMetrics for NopSink {
    fn on_send_attempt(&self, _peer: u64) {}
    fn on_send_success(&self, _peer: u64, _bytes: usize) {}
    fn on_send_failure(&self, _peer: u64, _code: &'static str) {}
    fn on_frame_received(&self, _peer: u64, _bytes: usize) {}
}

impl BroadcasterMetrics for NopSink {
    fn on_broadcast(&self, _message_type: &'static str, _peer_count: usize) {}
    fn on_broadcast_partial_failure(&self, _message_type: &'static str, _failures: usize) {}
}

impl CollectorPoolMetrics for NopSink {
    fn on_slot_rotated(&self, _seq: u64) {}
    fn on_stale_update_ignored(&self, _seq: u64) {}
    fn record_occupancy(&self, _occupied: usize, _capacity: usize) {}
}

impl CommitmentMetrics for NopSink {
    fn on_phase_entered(&self, _seq: u64, _phase: &'static str) {}
    fn on_quorum_reached(&self, _seq: u64, _phase: &'static str) {}
    fn on_duplicate_vote(&self, _seq: u64, _phase: &'static str, _sender: u64) {}
    fn on_executed(&self, _seq: u64) {}
}

impl ResponseManagerMetrics for NopSink {
    fn on_response_batched(&self, _batch_size: usize) {}
    fn on_response_sealed(&self, _seq: u64) {}
    fn on_response_delivered(&self, _seq: u64, _matching_replicas: usize) {}
}

impl CheckpointMetrics for NopSink {
    fn on_block_frozen(&self, _block_seq: u64) {}
    fn on_checkpoint_broadcast(&self, _seq: u64) {}
    fn on_checkpoint_stable(&self, _seq: u64) {}
}
