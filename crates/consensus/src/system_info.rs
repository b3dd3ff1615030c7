//! Current view and primary election: `{view, primary_id, replicas[]}`.
//!
//! Primary selection is round-robin by view, grounded in the consumers of
//! the original `SystemInfo::GetPrimaryId` (`TransactionManager`,
//! `ResponseManager`, `PerformanceManager` all defer to it rather than
//! computing the primary themselves) — every component that needs to know
//! who the primary is goes through this one place.

use pbft_types::replica::{ReplicaConfig, ReplicaId};
use std::sync::atomic::{AtomicU64, Ordering};

pub struct SystemInfo {
    view: AtomicU64,
    replicas: Vec<ReplicaId>,
}

impl SystemInfo {
    pub fn new(config: &ReplicaConfig) -> Self {
        Self {
            view: AtomicU64::new(0),
            replicas: config.replicas.iter().map(|r| r.id).collect(),
        }
    }

    pub fn view(&self) -> u64 {
        self.view.load(Ordering::Acquire)
    }

    /// Advances to a new view, e.g. after a view change completes. A no-op
    /// in the absence of view-change support (spec.md's Non-goals), kept so
    /// the primary-election math has somewhere to read a changed view from
    /// once that support lands.
    pub fn set_view(&self, view: u64) {
        self.view.store(view, Ordering::Release);
    }

    /// `primary_id = replicas[view mod N].id`.
    pub fn primary_id(&self) -> ReplicaId {
        let n = self.replicas.len() as u64;
        let idx = (self.view() % n) as usize;
        self.replicas[idx]
    }

    pub fn is_primary(&self, replica: ReplicaId) -> bool {
        self.primary_id() == replica
    }

    pub fn replicas(&self) -> &[ReplicaId] {
        &self.replicas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn config(n: u64) -> ReplicaConfig {
        ReplicaConfig {
            replicas: (1..=n)
                .map(|id| pbft_types::replica::ReplicaInfo {
                    id,
                    ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                    port: 10000 + id as u16,
                    cert: vec![],
                })
                .collect(),
            self_id: 1,
            private_key_path: "k".into(),
            certificate_path: "c".into(),
            tunables: Default::default(),
        }
    }

    #[test]
    fn primary_is_first_replica_at_view_zero() {
        let info = SystemInfo::new(&config(4));
        assert_eq!(info.primary_id(), 1);
        assert!(info.is_primary(1));
    }

    #[test]
    fn primary_rotates_with_view() {
        let info = SystemInfo::new(&config(4));
        info.set_view(1);
        assert_eq!(info.primary_id(), 2);
        info.set_view(4);
        assert_eq!(info.primary_id(), 1);
    }
}
