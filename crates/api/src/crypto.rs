//! Signing, verification, and hashing capabilities, kept behind traits so
//! `pbft-consensus` never names a concrete curve or hash function directly.

use pbft_types::replica::ReplicaId;

/// A digest produced by whatever hash function the deployment's
/// [`SignatureVerifier`] uses. Fixed-size so it can be embedded in wire
/// types without a length prefix.
pub type HashDigest = [u8; 32];

/// Capability to sign outbound data with this replica's own key.
///
/// Split from [`SignatureVerifier`] because a client or read-only tool may
/// need to verify replica signatures without ever holding a private key.
pub trait SigningKey: Send + Sync {
    /// Signs `data`, returning raw signature bytes in whatever encoding the
    /// matching [`SignatureVerifier::verify`] expects.
    fn sign(&self, data: &[u8]) -> Vec<u8>;

    /// This key's owning replica, so callers can stamp outbound
    /// [`pbft_types::message::Signature::signer_id`] without holding it
    /// separately.
    fn replica_id(&self) -> ReplicaId;
}

/// Capability to verify a signature against a replica's registered public
/// key and to hash data deterministically.
///
/// A single implementation backs an entire replica set: the verifier holds
/// (or can look up) every replica's public key, keyed by [`ReplicaId`].
pub trait SignatureVerifier: Send + Sync {
    /// Verifies `sig` over `data`, attributed to `signer`.
    ///
    /// Returns `false` for an unknown `signer` as well as for a
    /// cryptographically invalid signature — callers that need to
    /// distinguish "unknown sender" from "bad signature" should check
    /// sender membership against the replica set first.
    fn verify(&self, signer: ReplicaId, data: &[u8], sig: &[u8]) -> bool;

    /// Computes the canonical digest of `data`.
    fn hash(&self, data: &[u8]) -> HashDigest;
}
