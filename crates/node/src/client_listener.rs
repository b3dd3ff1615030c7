//! The client-facing TCP listener: a separate port from the inter-replica
//! [`pbft_transport::Transport`], since external clients are not members of
//! the fixed replica set and never participate in its signed framing
//! (spec.md §4.6's "proxy" role — whichever replica a client is connected
//! to submits on its behalf).
//!
//! One connection handles a simple request/response cycle per client
//! submission: read a `CLIENT_REQUEST`-shaped [`Request`], hand it to the
//! [`ResponseManager`], wait for the matched response, write it back. A
//! client wanting to pipeline several outstanding requests opens several
//! connections — there is no in-protocol multiplexing here.

use pbft_client::ResponseManager;
use pbft_transport::framing::{read_envelope, write_envelope};
use pbft_types::codec::{from_bytes_canonical, to_bytes_canonical};
use pbft_types::message::{Envelope, HashType, MessageType, Request, Signature};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Accepts client connections on `addr` until the process shuts down.
pub async fn run_client_listener(addr: SocketAddr, response_manager: Arc<ResponseManager>) {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(target = "client_listener", %addr, error = %e, "failed to bind");
            return;
        }
    };
    tracing::info!(target = "client_listener", %addr, "listening for client connections");

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(target = "client_listener", error = %e, "accept failed");
                continue;
            }
        };
        let response_manager = response_manager.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, response_manager).await {
                tracing::debug!(target = "client_listener", %peer_addr, error = %e, "connection closed");
            }
        });
    }
}

async fn serve_connection(
    mut stream: tokio::net::TcpStream,
    response_manager: Arc<ResponseManager>,
) -> Result<(), pbft_types::error::SendError> {
    loop {
        let envelope = read_envelope(&mut stream).await?;
        let Ok(request) = from_bytes_canonical::<Request>(&envelope.payload) else {
            tracing::debug!(target = "client_listener", "dropping undecodable client request");
            continue;
        };
        if request.r#type != MessageType::ClientRequest {
            continue;
        }

        let rx = match response_manager.submit(request) {
            Ok(rx) => rx,
            Err(_) => {
                let reply = b"ERROR: submission queue full".to_vec();
                write_reply(&mut stream, reply).await?;
                continue;
            }
        };
        let output = rx
            .await
            .unwrap_or_else(|_| b"ERROR: response manager dropped the request".to_vec());
        write_reply(&mut stream, output).await?;
    }
}

async fn write_reply(
    stream: &mut tokio::net::TcpStream,
    output: Vec<u8>,
) -> Result<(), pbft_types::error::SendError> {
    let request = Request {
        r#type: MessageType::Response,
        seq: 0,
        view: 0,
        sender_id: 0,
        proxy_id: 0,
        hash: Vec::new(),
        data: output,
        data_signature: None,
        committed_certs: Vec::new(),
    };
    let envelope = Envelope {
        payload: to_bytes_canonical(&request),
        signature: Signature {
            signer_id: 0,
            sig_bytes: Vec::new(),
            hash_type: HashType::Sha256,
        },
    };
    write_envelope(stream, &envelope).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_api::crypto::{SignatureVerifier, SigningKey};
    use pbft_api::metrics::NopSink;
    use pbft_consensus::SystemInfo;
    use pbft_transport::ReplicaBroadcaster;
    use pbft_types::replica::{ReplicaConfig, ReplicaId, ReplicaInfo, Tunables};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::net::TcpStream;

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

    fn config(base_port: u16) -> ReplicaConfig {
        ReplicaConfig {
            replicas: (1..=4u64)
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
    async fn submission_failure_reports_error_without_hanging() {
        let cfg = config(18_300);
        let system_info = Arc::new(SystemInfo::new(&cfg));
        let transport = pbft_transport::Transport::start(&cfg, Arc::new(NopSink));
        let broadcaster = Arc::new(ReplicaBroadcaster::new(transport, Arc::new(NopSink)));
        let (manager, submit_rx) = ResponseManager::new(
            1,
            1,
            32,
            Duration::from_millis(10),
            1024,
            system_info,
            broadcaster,
            Arc::new(StubSigner(1)),
            Arc::new(AcceptAllVerifier),
            Arc::new(NopSink),
        );
        let batcher_manager = manager.clone();
        tokio::spawn(async move {
            batcher_manager.run_batcher(submit_rx).await;
        });

        let listen_addr: SocketAddr = "127.0.0.1:18399".parse().unwrap();
        let listener_manager = manager.clone();
        tokio::spawn(async move {
            run_client_listener(listen_addr, listener_manager).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut stream = TcpStream::connect(listen_addr).await.expect("connect");
        let request = Request::stripped(MessageType::ClientRequest, 0, 0, 0, vec![1, 2, 3]);
        let envelope = Envelope {
            payload: to_bytes_canonical(&request),
            signature: Signature {
                signer_id: 0,
                sig_bytes: vec![],
                hash_type: HashType::Sha256,
            },
        };
        write_envelope(&mut stream, &envelope).await.expect("write");

        let reply_envelope = read_envelope(&mut stream).await.expect("read reply");
        let reply_request: Request = from_bytes_canonical(&reply_envelope.payload).expect("decode reply");
        // This replica is its own (sole, in-process) primary but has no
        // transport peer entry for itself, so the batcher's unicast to the
        // primary fails deterministically and the client sees an error
        // reply rather than hanging forever.
        assert!(reply_request.data.starts_with(b"ERROR"));
    }
}
