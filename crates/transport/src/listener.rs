//! Accepts inbound connections from peers that dial us.
//!
//! The kernel has no separate connection handshake: a replica's identity on
//! a given frame is whatever `Envelope::signature.signer_id` claims. That
//! claim is not trusted here — it is the consensus layer's job to verify
//! the signature against the claimed signer before acting on the message
//! (spec.md §4.1). This listener's only responsibility is framing.

use crate::framing::read_envelope;
use pbft_api::metrics::TransportMetrics;
use pbft_types::replica::ReplicaId;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub async fn run_listener(
    addr: SocketAddr,
    inbound_tx: mpsc::Sender<(ReplicaId, pbft_types::message::Envelope)>,
    metrics: Arc<dyn TransportMetrics>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(target = "transport", %addr, "listening for peer connections");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let inbound_tx = inbound_tx.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            let mut stream = stream;
            loop {
                match read_envelope(&mut stream).await {
                    Ok(envelope) => {
                        let signer = envelope.signature.signer_id;
                        metrics.on_frame_received(signer, envelope.payload.len());
                        if inbound_tx.send((signer, envelope)).await.is_err() {
                            return;
                        }
                    }
                    Err(_) => {
                        tracing::debug!(target = "transport", %peer_addr, "connection closed");
                        return;
                    }
                }
            }
        });
    }
}
