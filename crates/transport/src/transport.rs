//! Ties together the peer connector pool and inbound listener into a single
//! handle components hand messages through.

use crate::listener::run_listener;
use crate::peer::{spawn_peer_connector, PeerHandle};
use dashmap::DashMap;
use pbft_api::metrics::TransportMetrics;
use pbft_types::error::SendError;
use pbft_types::message::Envelope;
use pbft_types::replica::{ReplicaConfig, ReplicaId};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The replica's view of the network: one outbound connector per peer, plus
/// an inbound channel fed by both the listener and every connector's own
/// reader half.
pub struct Transport {
    self_id: ReplicaId,
    peers: DashMap<ReplicaId, PeerHandle>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<(ReplicaId, Envelope)>>,
}

/// Default bound on the shared inbound channel. Sized generously relative
/// to `tcp_batch_num` so a burst across many peers doesn't immediately
/// apply backpressure to the listener/connector reader tasks.
const INBOUND_CHANNEL_CAPACITY: usize = 4096;

impl Transport {
    /// Starts the listener and a connector for every other replica in
    /// `config`, binding the listener to this replica's own configured
    /// address.
    pub fn start(config: &ReplicaConfig, metrics: Arc<dyn TransportMetrics>) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let peers = DashMap::new();

        for replica in &config.replicas {
            if replica.id == config.self_id {
                continue;
            }
            let handle =
                spawn_peer_connector(replica.clone(), inbound_tx.clone(), metrics.clone());
            peers.insert(replica.id, handle);
        }

        let self_info = config.self_info().clone();
        let listener_metrics = metrics.clone();
        let listener_inbound_tx = inbound_tx;
        tokio::spawn(async move {
            if let Err(e) =
                run_listener(self_info.addr(), listener_inbound_tx, listener_metrics).await
            {
                tracing::error!(target = "transport", error = %e, "listener exited");
            }
        });

        Arc::new(Self {
            self_id: config.self_id,
            peers,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        })
    }

    pub fn self_id(&self) -> ReplicaId {
        self.self_id
    }

    /// Enqueues `envelope` for delivery to `peer`.
    pub fn send(&self, peer: ReplicaId, envelope: Envelope) -> Result<(), SendError> {
        let handle = self
            .peers
            .get(&peer)
            .ok_or(SendError::ConnectionLost)?;
        handle.try_send(envelope)
    }

    /// Every currently configured peer (excluding self).
    pub fn peer_ids(&self) -> Vec<ReplicaId> {
        self.peers.iter().map(|e| *e.key()).collect()
    }

    /// Awaits the next inbound frame from any peer or the listener.
    ///
    /// A single receiver shared behind a mutex rather than a broadcast
    /// channel: exactly one task (the consensus service's dispatch loop)
    /// is expected to drain inbound traffic.
    pub async fn recv(&self) -> Option<(ReplicaId, Envelope)> {
        self.inbound_rx.lock().await.recv().await
    }
}
