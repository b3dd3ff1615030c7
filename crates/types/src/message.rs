//! On-wire message shapes: [`Envelope`], [`Request`], and the client-facing
//! batch types (spec.md §3).

use crate::replica::ReplicaId;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Which hash function a [`Signature`] was computed over. Kept explicit
/// (rather than implied by signer) so a verifier never has to guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub enum HashType {
    Sha256,
}

/// A signature over some payload, produced by a named replica (or, for
/// client-originated data, a client id folded into the same id space).
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Signature {
    pub signer_id: ReplicaId,
    pub sig_bytes: Vec<u8>,
    pub hash_type: HashType,
}

/// The message type discriminant carried by every [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub enum MessageType {
    ClientRequest,
    NewTxns,
    PrePrepare,
    Prepare,
    Commit,
    Response,
    Checkpoint,
    ReplicaState,
    Query,
}

/// The protocol payload wrapped by an [`Envelope`]'s signature.
///
/// Not every field is meaningful for every [`MessageType`] — e.g. `data`
/// and `data_signature` only carry a batch body for `NEW_TXNS` /
/// `PRE_PREPARE`; `PREPARE` / `COMMIT` strip them down to the bare
/// `(type, view, seq, sender_id, hash)` tuple (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Request {
    pub r#type: MessageType,
    pub seq: u64,
    pub view: u64,
    pub sender_id: ReplicaId,
    /// The client (or client-facing replica) to route the eventual
    /// RESPONSE back to.
    pub proxy_id: ReplicaId,
    /// Digest of `data`, computed once and carried along so repeated
    /// hashing isn't needed on every hop.
    pub hash: Vec<u8>,
    /// The batch body. Present on `NEW_TXNS`/`PRE_PREPARE`; empty on the
    /// stripped `PREPARE`/`COMMIT` forms.
    pub data: Vec<u8>,
    /// Signature over `data` alone, independent of the transport
    /// envelope's signature, so a backup can verify batch integrity
    /// without trusting whichever replica relayed it (spec.md §4.1).
    pub data_signature: Option<Signature>,
    /// Collected COMMIT signatures, only populated once quorum-certificate
    /// assembly is enabled (`need_qc`, spec.md §3).
    #[serde(default)]
    pub committed_certs: Vec<Signature>,
}

impl Request {
    /// A `PREPARE`/`COMMIT` message strips the batch body down to the bare
    /// identifying tuple, per spec.md §4.5.
    pub fn stripped(r#type: MessageType, view: u64, seq: u64, sender_id: ReplicaId, hash: Vec<u8>) -> Self {
        Request {
            r#type,
            seq,
            view,
            sender_id,
            proxy_id: 0,
            hash,
            data: Vec::new(),
            data_signature: None,
            committed_certs: Vec::new(),
        }
    }
}

/// The on-wire envelope: a signed payload. Framing (length prefix) happens
/// one layer up in `pbft-transport`; this is the thing that gets framed.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Envelope {
    pub payload: Vec<u8>,
    pub signature: Signature,
}

/// A single client sub-request carried inside a [`BatchClientRequest`],
/// each with its own signed envelope so that splitting the batch back into
/// individual responses (spec.md §4.6) never loses per-request identity.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct SubRequest {
    pub index: u32,
    pub client_envelope: Envelope,
}

/// A primary-issued batch grouping multiple client sub-requests.
///
/// `data` (the canonical encoding of `sub_requests`) is what
/// `data_signature` is computed over (spec.md §3), independent of whatever
/// envelope eventually carries this batch as a `PRE_PREPARE`/`NEW_TXNS`
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct BatchClientRequest {
    pub local_id: u64,
    pub proxy_id: ReplicaId,
    pub sub_requests: Vec<SubRequest>,
}

/// The executor's reply to one [`BatchClientRequest`], before it is split
/// back into per-sub-request payloads by the response manager.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct BatchClientResponse {
    pub local_id: u64,
    pub seq: u64,
    /// One output per sub-request, in the same order as
    /// `BatchClientRequest::sub_requests`.
    pub outputs: Vec<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{from_bytes_canonical, to_bytes_canonical};

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope {
            payload: vec![1, 2, 3],
            signature: Signature {
                signer_id: 1,
                sig_bytes: vec![9, 9],
                hash_type: HashType::Sha256,
            },
        };
        let bytes = to_bytes_canonical(&env);
        let back: Envelope = from_bytes_canonical(&bytes).expect("decode");
        assert_eq!(env, back);
    }

    #[test]
    fn stripped_request_has_no_body() {
        let r = Request::stripped(MessageType::Prepare, 0, 5, 2, vec![1; 32]);
        assert!(r.data.is_empty());
        assert!(r.data_signature.is_none());
        assert_eq!(r.seq, 5);
    }
}
