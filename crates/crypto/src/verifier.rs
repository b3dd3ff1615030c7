//! Binds [`pbft_api::crypto`]'s capability traits to the Ed25519 primitives
//! in [`crate::sign`] and [`crate::hash`], with a registry mapping each
//! replica id to its public key.

use crate::error::CryptoError;
use crate::hash::sha256;
use crate::sign::{self, Ed25519KeyPair};
use dashmap::DashMap;
use pbft_api::crypto::{HashDigest, SignatureVerifier, SigningKey};
use pbft_types::replica::{ReplicaConfig, ReplicaId};

/// A [`SigningKey`] + [`SignatureVerifier`] for one replica's view of the
/// replica set: it can sign with its own key and verify any other
/// replica's signature by id.
///
/// For this kernel, a `ReplicaInfo::cert` *is* the replica's raw Ed25519
/// public key bytes — there is no surrounding certificate format, since the
/// replica set is fixed and distributed out of band via the JSON config
/// (spec.md §6), not discovered via PKI.
pub struct ReplicaVerifier {
    self_id: ReplicaId,
    own_key: Ed25519KeyPair,
    public_keys: DashMap<ReplicaId, Vec<u8>>,
}

impl ReplicaVerifier {
    pub fn new(own_key: Ed25519KeyPair, config: &ReplicaConfig) -> Self {
        let public_keys = DashMap::new();
        for replica in &config.replicas {
            public_keys.insert(replica.id, replica.cert.clone());
        }
        Self {
            self_id: config.self_id,
            own_key,
            public_keys,
        }
    }

    /// Registers or rotates a replica's public key, for view changes that
    /// reconfigure the replica set at runtime.
    pub fn register(&self, replica: ReplicaId, public_key: Vec<u8>) {
        self.public_keys.insert(replica, public_key);
    }

    pub fn sign_raw(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.own_key.sign(data)
    }
}

impl SigningKey for ReplicaVerifier {
    fn sign(&self, data: &[u8]) -> Vec<u8> {
        // Signing with a validated in-memory key cannot fail in practice;
        // callers that need to surface failure should use `sign_raw`.
        self.own_key.sign(data).unwrap_or_default()
    }

    fn replica_id(&self) -> ReplicaId {
        self.self_id
    }
}

impl SignatureVerifier for ReplicaVerifier {
    fn verify(&self, signer: ReplicaId, data: &[u8], sig: &[u8]) -> bool {
        let Some(public_key) = self.public_keys.get(&signer) else {
            return false;
        };
        sign::verify(&public_key, data, sig)
    }

    fn hash(&self, data: &[u8]) -> HashDigest {
        sha256(data).unwrap_or([0u8; 32])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn config_for(ids: &[ReplicaId], self_id: ReplicaId, keys: &[Vec<u8>]) -> ReplicaConfig {
        let replicas = ids
            .iter()
            .zip(keys.iter())
            .map(|(&id, key)| pbft_types::replica::ReplicaInfo {
                id,
                ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 10000 + id as u16,
                cert: key.clone(),
            })
            .collect();
        ReplicaConfig {
            replicas,
            self_id,
            private_key_path: "k".into(),
            certificate_path: "c".into(),
            tunables: Default::default(),
        }
    }

    #[test]
    fn verifies_signature_from_registered_replica() {
        let kp = Ed25519KeyPair::generate().expect("generate");
        let config = config_for(&[1, 2], 1, &[kp.public_key_bytes(), vec![1; 32]]);
        let verifier = ReplicaVerifier::new(kp, &config);

        let sig = verifier.sign_raw(b"msg").expect("sign");
        assert!(verifier.verify(1, b"msg", &sig));
    }

    #[test]
    fn rejects_unknown_signer() {
        let kp = Ed25519KeyPair::generate().expect("generate");
        let config = config_for(&[1], 1, &[kp.public_key_bytes()]);
        let verifier = ReplicaVerifier::new(kp, &config);
        assert!(!verifier.verify(99, b"msg", &[0u8; 64]));
    }

    #[test]
    fn hash_is_deterministic() {
        let kp = Ed25519KeyPair::generate().expect("generate");
        let config = config_for(&[1], 1, &[kp.public_key_bytes()]);
        let verifier = ReplicaVerifier::new(kp, &config);
        assert_eq!(verifier.hash(b"abc"), verifier.hash(b"abc"));
    }
}
