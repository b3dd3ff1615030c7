//! A concrete, Prometheus-backed implementation of
//! [`pbft_api::metrics::MetricsSink`].
//!
//! Each replica owns one `PrometheusSink`, built once at startup and handed
//! down as an `Arc<dyn MetricsSink>` — see the crate-level docs for why
//! this is an owned `Registry` rather than the teacher's global statics.

use pbft_api::metrics::{
    BroadcasterMetrics, CheckpointMetrics, CollectorPoolMetrics, CommitmentMetrics,
    ResponseManagerMetrics, TransportMetrics,
};
use prometheus::{
    exponential_buckets, Gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, Registry,
};

pub struct PrometheusSink {
    registry: Registry,

    send_attempts_total: IntCounterVec,
    send_success_total: IntCounterVec,
    send_bytes_total: IntCounterVec,
    send_failures_total: IntCounterVec,
    frames_received_total: IntCounterVec,

    broadcasts_total: IntCounterVec,
    broadcast_peer_count: HistogramVec,
    broadcast_partial_failures_total: IntCounterVec,

    slot_rotations_total: IntCounter,
    stale_updates_ignored_total: IntCounter,
    collector_pool_occupancy: Gauge,

    phase_entries_total: IntCounterVec,
    quorum_reached_total: IntCounterVec,
    duplicate_votes_total: IntCounterVec,
    executed_total: IntCounter,

    response_batch_size: Histogram,
    response_sealed_total: IntCounter,
    response_matching_replicas: Histogram,

    blocks_frozen_total: IntCounter,
    checkpoints_broadcast_total: IntCounter,
    checkpoints_stable_total: IntCounter,
}

impl PrometheusSink {
    /// Builds a fresh `Registry` and registers every collector into it.
    /// Call once per replica process at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let send_attempts_total = IntCounterVec::new(
            prometheus::Opts::new("pbft_send_attempts_total", "Total send attempts, by peer"),
            &["peer"],
        )?;
        let send_success_total = IntCounterVec::new(
            prometheus::Opts::new("pbft_send_success_total", "Total successful sends, by peer"),
            &["peer"],
        )?;
        let send_bytes_total = IntCounterVec::new(
            prometheus::Opts::new("pbft_send_bytes_total", "Total bytes sent, by peer"),
            &["peer"],
        )?;
        let send_failures_total = IntCounterVec::new(
            prometheus::Opts::new(
                "pbft_send_failures_total",
                "Total failed sends, by peer and error code",
            ),
            &["peer", "code"],
        )?;
        let frames_received_total = IntCounterVec::new(
            prometheus::Opts::new(
                "pbft_frames_received_total",
                "Total frames received, by peer",
            ),
            &["peer"],
        )?;
        let broadcasts_total = IntCounterVec::new(
            prometheus::Opts::new(
                "pbft_broadcasts_total",
                "Total broadcast operations, by message type",
            ),
            &["message_type"],
        )?;
        let broadcast_peer_count = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "pbft_broadcast_peer_count",
                "Peers targeted per broadcast",
            )
            .buckets(exponential_buckets(1.0, 2.0, 8)?),
            &["message_type"],
        )?;
        let broadcast_partial_failures_total = IntCounterVec::new(
            prometheus::Opts::new(
                "pbft_broadcast_partial_failures_total",
                "Broadcasts with at least one peer send failure",
            ),
            &["message_type"],
        )?;
        let slot_rotations_total = IntCounter::new(
            "pbft_collector_pool_slot_rotations_total",
            "Total collector pool slot rotations",
        )?;
        let stale_updates_ignored_total = IntCounter::new(
            "pbft_collector_pool_stale_updates_ignored_total",
            "Total stale Update(seq) calls ignored as no-ops",
        )?;
        let collector_pool_occupancy = Gauge::new(
            "pbft_collector_pool_occupancy_ratio",
            "Fraction of collector pool slots currently occupied",
        )?;
        let phase_entries_total = IntCounterVec::new(
            prometheus::Opts::new(
                "pbft_commitment_phase_entries_total",
                "Total phase transitions, by phase",
            ),
            &["phase"],
        )?;
        let quorum_reached_total = IntCounterVec::new(
            prometheus::Opts::new(
                "pbft_commitment_quorum_reached_total",
                "Total quorum certificates assembled, by phase",
            ),
            &["phase"],
        )?;
        let duplicate_votes_total = IntCounterVec::new(
            prometheus::Opts::new(
                "pbft_commitment_duplicate_votes_total",
                "Total duplicate votes observed, by phase",
            ),
            &["phase"],
        )?;
        let executed_total = IntCounter::new(
            "pbft_commitment_executed_total",
            "Total sequences executed",
        )?;
        let response_batch_size = Histogram::with_opts(prometheus::HistogramOpts::new(
            "pbft_response_batch_size",
            "Size of client response batches",
        ))?;
        let response_sealed_total = IntCounter::new(
            "pbft_response_sealed_total",
            "Total client responses sealed (f+1 matching hash reached)",
        )?;
        let response_matching_replicas = Histogram::with_opts(prometheus::HistogramOpts::new(
            "pbft_response_matching_replicas",
            "Number of matching replica responses when a client response is delivered",
        ))?;
        let blocks_frozen_total = IntCounter::new(
            "pbft_checkpoint_blocks_frozen_total",
            "Total checkpoint hash-chain blocks frozen",
        )?;
        let checkpoints_broadcast_total = IntCounter::new(
            "pbft_checkpoints_broadcast_total",
            "Total CHECKPOINT messages broadcast",
        )?;
        let checkpoints_stable_total = IntCounter::new(
            "pbft_checkpoints_stable_total",
            "Total checkpoints reaching stability (2f+1 matching)",
        )?;

        for c in [
            send_attempts_total.clone(),
            send_success_total.clone(),
            send_bytes_total.clone(),
            send_failures_total.clone(),
            frames_received_total.clone(),
            broadcasts_total.clone(),
            broadcast_partial_failures_total.clone(),
            phase_entries_total.clone(),
            quorum_reached_total.clone(),
            duplicate_votes_total.clone(),
        ] {
            registry.register(Box::new(c))?;
        }
        registry.register(Box::new(broadcast_peer_count.clone()))?;
        registry.register(Box::new(slot_rotations_total.clone()))?;
        registry.register(Box::new(stale_updates_ignored_total.clone()))?;
        registry.register(Box::new(collector_pool_occupancy.clone()))?;
        registry.register(Box::new(executed_total.clone()))?;
        registry.register(Box::new(response_batch_size.clone()))?;
        registry.register(Box::new(response_sealed_total.clone()))?;
        registry.register(Box::new(response_matching_replicas.clone()))?;
        registry.register(Box::new(blocks_frozen_total.clone()))?;
        registry.register(Box::new(checkpoints_broadcast_total.clone()))?;
        registry.register(Box::new(checkpoints_stable_total.clone()))?;

        Ok(Self {
            registry,
            send_attempts_total,
            send_success_total,
            send_bytes_total,
            send_failures_total,
            frames_received_total,
            broadcasts_total,
            broadcast_peer_count,
            broadcast_partial_failures_total,
            slot_rotations_total,
            stale_updates_ignored_total,
            collector_pool_occupancy,
            phase_entries_total,
            quorum_reached_total,
            duplicate_votes_total,
            executed_total,
            response_batch_size,
            response_sealed_total,
            response_matching_replicas,
            blocks_frozen_total,
            checkpoints_broadcast_total,
            checkpoints_stable_total,
        })
    }

    /// The registry backing this sink, for the `/metrics` HTTP handler.
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }
}

impl TransportMetrics for PrometheusSink {
    fn on_send_attempt(&self, peer: u64) {
        self.send_attempts_total
            .with_label_values(&[&peer.to_string()])
            .inc();
    }
    fn on_send_success(&self, peer: u64, bytes: usize) {
        let peer = peer.to_string();
        self.send_success_total.with_label_values(&[&peer]).inc();
        self.send_bytes_total
            .with_label_values(&[&peer])
            .inc_by(bytes as u64);
    }
    fn on_send_failure(&self, peer: u64, code: &'static str) {
        self.send_failures_total
            .with_label_values(&[&peer.to_string(), code])
            .inc();
    }
    fn on_frame_received(&self, peer: u64, _bytes: usize) {
        self.frames_received_total
            .with_label_values(&[&peer.to_string()])
            .inc();
    }
}

impl BroadcasterMetrics for PrometheusSink {
    fn on_broadcast(&self, message_type: &'static str, peer_count: usize) {
        self.broadcasts_total
            .with_label_values(&[message_type])
            .inc();
        self.broadcast_peer_count
            .with_label_values(&[message_type])
            .observe(peer_count as f64);
    }
    fn on_broadcast_partial_failure(&self, message_type: &'static str, _failures: usize) {
        self.broadcast_partial_failures_total
            .with_label_values(&[message_type])
            .inc();
    }
}

impl CollectorPoolMetrics for PrometheusSink {
    fn on_slot_rotated(&self, _seq: u64) {
        self.slot_rotations_total.inc();
    }
    fn on_stale_update_ignored(&self, _seq: u64) {
        self.stale_updates_ignored_total.inc();
    }
    fn record_occupancy(&self, occupied: usize, capacity: usize) {
        if capacity > 0 {
            self.collector_pool_occupancy
                .set(occupied as f64 / capacity as f64);
        }
    }
}

impl CommitmentMetrics for PrometheusSink {
    fn on_phase_entered(&self, _seq: u64, phase: &'static str) {
        self.phase_entries_total.with_label_values(&[phase]).inc();
    }
    fn on_quorum_reached(&self, _seq: u64, phase: &'static str) {
        self.quorum_reached_total
            .with_label_values(&[phase])
            .inc();
    }
    fn on_duplicate_vote(&self, _seq: u64, phase: &'static str, _sender: u64) {
        self.duplicate_votes_total
            .with_label_values(&[phase])
            .inc();
    }
    fn on_executed(&self, _seq: u64) {
        self.executed_total.inc();
    }
}

impl ResponseManagerMetrics for PrometheusSink {
    fn on_response_batched(&self, batch_size: usize) {
        self.response_batch_size.observe(batch_size as f64);
    }
    fn on_response_sealed(&self, _seq: u64) {
        self.response_sealed_total.inc();
    }
    fn on_response_delivered(&self, _seq: u64, matching_replicas: usize) {
        self.response_matching_replicas
            .observe(matching_replicas as f64);
    }
}

impl CheckpointMetrics for PrometheusSink {
    fn on_block_frozen(&self, _block_seq: u64) {
        self.blocks_frozen_total.inc();
    }
    fn on_checkpoint_broadcast(&self, _seq: u64) {
        self.checkpoints_broadcast_total.inc();
    }
    fn on_checkpoint_stable(&self, _seq: u64) {
        self.checkpoints_stable_total.inc();
    }
}
