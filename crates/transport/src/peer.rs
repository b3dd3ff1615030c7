//! One outbound connection to a peer replica: a bounded queue feeding a
//! reconnect-with-backoff loop, grounded in the same
//! command-channel-feeding-a-long-lived-task shape as the teacher's
//! libp2p swarm command loop, just over a plain `TcpStream` instead of a
//! `Swarm`.

use crate::framing::{read_envelope, write_envelope};
use pbft_api::metrics::TransportMetrics;
use pbft_types::error::SendError;
use pbft_types::message::Envelope;
use pbft_types::replica::{ReplicaId, ReplicaInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Backoff grows multiplicatively on repeated failure but resets to the
/// floor immediately on the next successful connect — asymmetric in the
/// same sense the original retry loop is: patient on the way up, instant
/// on the way down, so a peer that comes back doesn't sit in a slow climb
/// before traffic resumes.
const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// A handle to a peer's outbound queue. Cheap to clone; all clones share
/// the same underlying connection.
#[derive(Clone)]
pub struct PeerHandle {
    replica_id: ReplicaId,
    outbound_tx: mpsc::Sender<Envelope>,
}

impl PeerHandle {
    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// Enqueues `envelope` for delivery. Returns `SendError::Timeout` if the
    /// outbound queue is full (the connector is too far behind to keep up)
    /// and `SendError::ConnectionLost` if the connector task has exited.
    pub fn try_send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.outbound_tx
            .try_send(envelope)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SendError::Timeout,
                mpsc::error::TrySendError::Closed(_) => SendError::ConnectionLost,
            })
    }
}

/// Spawns the long-lived connector task for `replica` and returns a handle
/// to its outbound queue. `inbound_tx` receives every successfully decoded
/// frame the peer sends us, tagged with its replica id.
pub fn spawn_peer_connector(
    replica: ReplicaInfo,
    inbound_tx: mpsc::Sender<(ReplicaId, Envelope)>,
    metrics: Arc<dyn TransportMetrics>,
) -> PeerHandle {
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let replica_id = replica.id;
    tokio::spawn(connector_loop(replica, outbound_rx, inbound_tx, metrics));
    PeerHandle {
        replica_id,
        outbound_tx,
    }
}

async fn connector_loop(
    replica: ReplicaInfo,
    mut outbound_rx: mpsc::Receiver<Envelope>,
    inbound_tx: mpsc::Sender<(ReplicaId, Envelope)>,
    metrics: Arc<dyn TransportMetrics>,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match TcpStream::connect(replica.addr()).await {
            Ok(stream) => {
                backoff = INITIAL_BACKOFF;
                let (mut read_half, mut write_half) = stream.into_split();

                let reader_inbound_tx = inbound_tx.clone();
                let reader_replica_id = replica.id;
                let reader = tokio::spawn(async move {
                    loop {
                        match read_envelope(&mut read_half).await {
                            Ok(envelope) => {
                                if reader_inbound_tx
                                    .send((reader_replica_id, envelope))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Err(_) => break,
                        }
                    }
                });

                while let Some(envelope) = outbound_rx.recv().await {
                    metrics.on_send_attempt(replica.id);
                    match write_envelope(&mut write_half, &envelope).await {
                        Ok(bytes) => metrics.on_send_success(replica.id, bytes),
                        Err(e) => {
                            let code = match e {
                                SendError::Timeout => "timeout",
                                SendError::ConnectionLost => "connection_lost",
                                SendError::Serialise => "serialise",
                                SendError::TooLarge(_) => "too_large",
                            };
                            metrics.on_send_failure(replica.id, code);
                            break;
                        }
                    }
                }
                let _ = write_half.shutdown().await;
                reader.abort();
            }
            Err(_) => {
                metrics.on_send_failure(replica.id, "connect_failed");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }

        // Every `PeerHandle` (and its clones) dropped means nothing will
        // ever be queued again; stop retrying rather than reconnect forever.
        if outbound_rx.is_closed() {
            return;
        }
    }
}
