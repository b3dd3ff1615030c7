//! Fans a single signed [`Envelope`] out to every (or a chosen subset of)
//! configured peers, and records whether every send was accepted by its
//! peer queue.

use crate::transport::Transport;
use pbft_api::metrics::BroadcasterMetrics;
use pbft_types::message::Envelope;
use pbft_types::replica::ReplicaId;
use std::sync::Arc;

pub struct ReplicaBroadcaster {
    transport: Arc<Transport>,
    metrics: Arc<dyn BroadcasterMetrics>,
}

impl ReplicaBroadcaster {
    pub fn new(transport: Arc<Transport>, metrics: Arc<dyn BroadcasterMetrics>) -> Self {
        Self { transport, metrics }
    }

    /// Broadcasts `envelope` to every configured peer. A per-peer send
    /// failure (full queue, dead connector) does not abort the broadcast —
    /// PBFT's quorum math already tolerates up to `f` unreachable replicas,
    /// so one slow peer must never block progress for the rest.
    pub fn broadcast(&self, message_type: &'static str, envelope: &Envelope) {
        let peers = self.transport.peer_ids();
        let mut failures = 0;
        for peer in &peers {
            if self.transport.send(*peer, envelope.clone()).is_err() {
                failures += 1;
            }
        }
        self.metrics.on_broadcast(message_type, peers.len());
        if failures > 0 {
            self.metrics
                .on_broadcast_partial_failure(message_type, failures);
        }
    }

    /// Sends `envelope` to exactly one peer — used for unicast replies
    /// (e.g. a RESPONSE routed back to a single proxy replica) where a full
    /// broadcast would be wasteful.
    pub fn unicast(&self, peer: ReplicaId, envelope: &Envelope) -> Result<(), pbft_types::error::SendError> {
        self.transport.send(peer, envelope.clone())
    }
}
