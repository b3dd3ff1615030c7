//! CLI arguments and the replica config document (spec.md §6): load the
//! JSON replica set, validate it, and load this replica's key material off
//! disk.

use anyhow::{Context, Result};
use clap::Parser;
use pbft_crypto::Ed25519KeyPair;
use pbft_types::replica::ReplicaConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pbft-node", about = "PBFT replica process")]
pub struct NodeOpts {
    /// Path to the JSON replica config document (spec.md §6).
    #[arg(long, env = "PBFT_CONFIG")]
    pub config: PathBuf,

    /// Directory for this replica's durable storage (redb file lives here).
    #[arg(long, env = "PBFT_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Address the Prometheus `/metrics` + `/healthz` server binds to.
    #[arg(long, env = "PBFT_METRICS_ADDR", default_value = "127.0.0.1:9090")]
    pub metrics_addr: std::net::SocketAddr,
}

/// Loads and validates the replica config document at `path`.
pub fn load_replica_config(path: &std::path::Path) -> Result<ReplicaConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read replica config at {}", path.display()))?;
    let config: ReplicaConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse replica config at {}", path.display()))?;
    config
        .validate()
        .with_context(|| "replica config failed validation")?;
    Ok(config)
}

/// Loads this replica's Ed25519 key pair from `ReplicaConfig::private_key_path`.
///
/// The file holds a raw 32-byte seed, matching what `Ed25519KeyPair::from_seed_bytes`
/// expects — there is no surrounding PEM/DER envelope for this kernel's keys
/// (see `pbft-crypto::verifier`'s doc comment on why `ReplicaInfo::cert` is
/// itself just the raw public key).
pub fn load_key_pair(config: &ReplicaConfig) -> Result<Ed25519KeyPair> {
    let seed = std::fs::read(&config.private_key_path).with_context(|| {
        format!(
            "failed to read private key at {}",
            config.private_key_path
        )
    })?;
    Ed25519KeyPair::from_seed_bytes(&seed)
        .map_err(|e| anyhow::anyhow!("invalid private key at {}: {e}", config.private_key_path))
}

/// The client-facing listen address for this replica: its configured peer
/// port plus one. Clients never dial the inter-replica transport port
/// directly — that port's framing is shared with signed replica-to-replica
/// traffic, and a client's own envelope is never verified against the
/// replica public-key registry (spec.md §1's executor/storage-style
/// "external collaborator" treatment extends naturally to clients, which
/// this core does not register keys for).
pub fn client_listen_addr(config: &ReplicaConfig) -> std::net::SocketAddr {
    let mut addr = config.self_info().addr();
    addr.set_port(addr.port() + 1000);
    addr
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn client_port_is_offset_from_replica_port() {
        let cfg = ReplicaConfig {
            replicas: vec![pbft_types::replica::ReplicaInfo {
                id: 1,
                ip: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 20000,
                cert: vec![],
            }],
            self_id: 1,
            private_key_path: "k".into(),
            certificate_path: "c".into(),
            tunables: Default::default(),
        };
        assert_eq!(client_listen_addr(&cfg).port(), 21000);
    }

    #[test]
    fn load_replica_config_rejects_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"not json").expect("write");
        assert!(load_replica_config(file.path()).is_err());
    }
}
