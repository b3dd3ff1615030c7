//! Replica identity and the fixed replica-set configuration.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A non-zero replica identifier, stable for the lifetime of the replica set.
pub type ReplicaId = u64;

/// Binds a [`ReplicaId`] to a network address and a certificate that in turn
/// binds the id to a public key.
///
/// The certificate itself is opaque bytes here (an X.509 DER blob, or
/// whatever the deployment's PKI produces) — `pbft-crypto` is the only
/// crate that parses it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaInfo {
    pub id: ReplicaId,
    pub ip: IpAddr,
    pub port: u16,
    /// Certificate binding `id` to a public key, in whatever encoding the
    /// configured `pbft-crypto` signature suite expects.
    #[serde(with = "hex::serde")]
    pub cert: Vec<u8>,
}

impl ReplicaInfo {
    pub fn addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.ip, self.port)
    }
}

/// The full replica set plus this replica's own keys, loaded from the JSON
/// replica config document (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// The complete, fixed replica set (including self).
    pub replicas: Vec<ReplicaInfo>,
    /// This replica's id — must match one entry in `replicas`.
    pub self_id: ReplicaId,
    /// Path to this replica's private key file.
    pub private_key_path: String,
    /// Path to this replica's certificate file.
    pub certificate_path: String,

    /// Worker pool sizing and batching tunables.
    #[serde(default)]
    pub tunables: Tunables,
}

/// Runtime tunables carried in the replica config document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub worker_num: usize,
    pub input_worker_num: usize,
    pub output_worker_num: usize,
    pub tcp_batch_num: usize,
    pub client_batch_num: usize,
    pub client_batch_wait_time_ms: u64,
    pub max_process_txn: u64,
    pub max_in_flight: u64,
    pub view_change_timeout_ms: u64,
    /// Stride, in committed sequences, at which CHECKPOINT messages are
    /// expected to align for stable-checkpoint purposes. See
    /// SPEC_FULL.md §C.1 for why this is distinct from the hash-chain
    /// block-freeze cadence, which is a fixed internal constant.
    pub checkpoint_water_mark: u64,
    pub client_timeout_ms: u64,
    pub enable_viewchange: bool,
    /// When set, COMMIT messages attach a signature forming a quorum
    /// certificate (spec.md §3, "commit_certs").
    pub need_qc: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            worker_num: 4,
            input_worker_num: 4,
            output_worker_num: 4,
            tcp_batch_num: 64,
            client_batch_num: 32,
            client_batch_wait_time_ms: 10,
            max_process_txn: 1024,
            max_in_flight: 128,
            view_change_timeout_ms: 10_000,
            checkpoint_water_mark: 5,
            client_timeout_ms: 10_000,
            enable_viewchange: false,
            need_qc: false,
        }
    }
}

/// Errors that can occur while validating a loaded [`ReplicaConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("replica set is empty")]
    EmptyReplicaSet,
    #[error("self_id {0} is not present in the replica set")]
    SelfNotFound(ReplicaId),
    #[error("duplicate replica id {0} in replica set")]
    DuplicateReplicaId(ReplicaId),
}

impl ReplicaConfig {
    /// Maximum tolerated Byzantine replicas, derived from the replica count:
    /// `f = floor((n - 1) / 3)`.
    pub fn max_faults(&self) -> usize {
        (self.replicas.len().saturating_sub(1)) / 3
    }

    /// Validates the loaded config the way `resdb_config.cpp` validates its
    /// own: the replica set must be non-empty, ids unique, self-id present,
    /// and `n >= 3f+1` for the derived `f`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replicas.is_empty() {
            return Err(ConfigError::EmptyReplicaSet);
        }
        let mut seen = std::collections::HashSet::new();
        for r in &self.replicas {
            if !seen.insert(r.id) {
                return Err(ConfigError::DuplicateReplicaId(r.id));
            }
        }
        if !self.replicas.iter().any(|r| r.id == self.self_id) {
            return Err(ConfigError::SelfNotFound(self.self_id));
        }
        Ok(())
    }

    pub fn n(&self) -> usize {
        self.replicas.len()
    }

    pub fn self_info(&self) -> &ReplicaInfo {
        // Unwrap safety: `validate` is required to be called after load,
        // and it guarantees self_id is present.
        self.replicas
            .iter()
            .find(|r| r.id == self.self_id)
            .expect("self_id validated to be present")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn replica(id: ReplicaId) -> ReplicaInfo {
        ReplicaInfo {
            id,
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 10000 + id as u16,
            cert: vec![],
        }
    }

    #[test]
    fn validates_minimal_n_3f_plus_1() {
        let cfg = ReplicaConfig {
            replicas: (1..=4).map(replica).collect(),
            self_id: 1,
            private_key_path: "k".into(),
            certificate_path: "c".into(),
            tunables: Tunables::default(),
        };
        assert_eq!(cfg.max_faults(), 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_missing_self() {
        let cfg = ReplicaConfig {
            replicas: (1..=4).map(replica).collect(),
            self_id: 99,
            private_key_path: "k".into(),
            certificate_path: "c".into(),
            tunables: Tunables::default(),
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::SelfNotFound(99))));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut replicas: Vec<_> = (1..=4).map(replica).collect();
        replicas.push(replica(1));
        let cfg = ReplicaConfig {
            replicas,
            self_id: 1,
            private_key_path: "k".into(),
            certificate_path: "c".into(),
            tunables: Tunables::default(),
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DuplicateReplicaId(1))
        ));
    }
}
