//! The concrete state machine this kernel ships: a key-value store driven
//! by committed batches, implementing [`pbft_api::executor::Executor`].
//!
//! Grounded in spec.md §8's scenario table, which exercises the execution
//! path purely through `Set(k, v)` / `Get(k)` commands — this is the
//! simplest deterministic state machine that can stand in for "whatever
//! application sits behind consensus" without the kernel needing to know
//! anything about it.

use async_trait::async_trait;
use pbft_api::executor::{ExecutionOutcome, Executor};
use pbft_api::storage::KvStore;
use pbft_crypto::hash::sha256;
use pbft_types::codec::{from_bytes_canonical, to_bytes_canonical};
use pbft_types::message::{BatchClientRequest, Request};
use parity_scale_codec::{Decode, Encode};
use std::sync::Arc;

/// A single client operation against the key-value state machine.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum KvCommand {
    Set { key: Vec<u8>, value: Vec<u8> },
    Get { key: Vec<u8> },
}

/// `KvCommand`'s reply, encoded as the sub-request's output bytes.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum KvReply {
    Ok,
    Value(Option<Vec<u8>>),
    Malformed,
}

pub struct KvExecutor {
    store: Arc<dyn KvStore>,
}

impl KvExecutor {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    async fn apply_one(&self, envelope_payload: &[u8]) -> Vec<u8> {
        let reply = match from_bytes_canonical::<Request>(envelope_payload) {
            Ok(request) => match from_bytes_canonical::<KvCommand>(&request.data) {
                Ok(KvCommand::Set { key, value }) => match self.store.put(&key, &value).await {
                    Ok(()) => KvReply::Ok,
                    Err(e) => {
                        tracing::error!(error = %e, "kv put failed");
                        KvReply::Malformed
                    }
                },
                Ok(KvCommand::Get { key }) => match self.store.get(&key).await {
                    Ok(value) => KvReply::Value(value),
                    Err(e) => {
                        tracing::error!(error = %e, "kv get failed");
                        KvReply::Malformed
                    }
                },
                Err(_) => KvReply::Malformed,
            },
            Err(_) => KvReply::Malformed,
        };
        to_bytes_canonical(&reply)
    }
}

#[async_trait]
impl Executor for KvExecutor {
    async fn execute_batch(&self, _seq: u64, batch: &BatchClientRequest) -> ExecutionOutcome {
        let mut outputs = Vec::with_capacity(batch.sub_requests.len());
        for sub in &batch.sub_requests {
            outputs.push(self.apply_one(&sub.client_envelope.payload).await);
        }
        let digest_input = to_bytes_canonical(&outputs);
        let state_hash = sha256(&digest_input).unwrap_or([0u8; 32]);
        ExecutionOutcome {
            outputs,
            state_hash,
        }
    }

    fn needs_response(&self, _batch: &BatchClientRequest) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_storage::MemoryStore;
    use pbft_types::message::{Envelope, HashType, MessageType, Signature, SubRequest};

    fn client_request(data: Vec<u8>) -> Envelope {
        let request = Request {
            r#type: MessageType::ClientRequest,
            seq: 0,
            view: 0,
            sender_id: 1,
            proxy_id: 1,
            hash: Vec::new(),
            data,
            data_signature: None,
            committed_certs: Vec::new(),
        };
        Envelope {
            payload: to_bytes_canonical(&request),
            signature: Signature {
                signer_id: 1,
                sig_bytes: Vec::new(),
                hash_type: HashType::Sha256,
            },
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_execution() {
        let executor = KvExecutor::new(Arc::new(MemoryStore::new()));
        let set_cmd = KvCommand::Set {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
        };
        let get_cmd = KvCommand::Get { key: b"k".to_vec() };
        let batch = BatchClientRequest {
            local_id: 1,
            proxy_id: 1,
            sub_requests: vec![
                SubRequest {
                    index: 0,
                    client_envelope: client_request(to_bytes_canonical(&set_cmd)),
                },
                SubRequest {
                    index: 1,
                    client_envelope: client_request(to_bytes_canonical(&get_cmd)),
                },
            ],
        };

        let outcome = executor.execute_batch(1, &batch).await;
        assert_eq!(outcome.outputs.len(), 2);
        let set_reply: KvReply = from_bytes_canonical(&outcome.outputs[0]).unwrap();
        assert_eq!(set_reply, KvReply::Ok);
        let get_reply: KvReply = from_bytes_canonical(&outcome.outputs[1]).unwrap();
        assert_eq!(get_reply, KvReply::Value(Some(b"v".to_vec())));
    }

    #[tokio::test]
    async fn malformed_command_does_not_fail_the_whole_batch() {
        let executor = KvExecutor::new(Arc::new(MemoryStore::new()));
        let batch = BatchClientRequest {
            local_id: 1,
            proxy_id: 1,
            sub_requests: vec![SubRequest {
                index: 0,
                client_envelope: client_request(vec![0xff, 0xff]),
            }],
        };
        let outcome = executor.execute_batch(1, &batch).await;
        let reply: KvReply = from_bytes_canonical(&outcome.outputs[0]).unwrap();
        assert_eq!(reply, KvReply::Malformed);
    }
}
