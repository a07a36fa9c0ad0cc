//! Configuration for ringkv nodes
//!
//! All timings are in logical ticks of the shared clock.

use crate::common::NodeAddr;
use serde::{Deserialize, Serialize};

/// Per-node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Well-known introducer address. The node whose own address equals
    /// this one bootstraps the cluster.
    #[serde(default = "default_introducer")]
    pub introducer: NodeAddr,

    /// Ticks between gossip rounds
    #[serde(default = "default_t_gossip")]
    pub t_gossip: u64,

    /// Ticks without a heartbeat advance before a peer is suspected
    #[serde(default = "default_t_fail")]
    pub t_fail: u64,

    /// Ticks a suspected peer is retained before removal
    #[serde(default = "default_t_remove")]
    pub t_remove: u64,

    /// Ticks before an unresolved transaction is finalized as failed
    #[serde(default = "default_op_timeout")]
    pub op_timeout: u64,

    /// Size of the consistent-hash ring space
    #[serde(default = "default_ring_size")]
    pub ring_size: u64,

    /// Replicas per key
    #[serde(default = "default_replicas")]
    pub replicas: usize,

    /// Successful replies required to finalize an operation
    #[serde(default = "default_quorum")]
    pub quorum: usize,
}

fn default_introducer() -> NodeAddr {
    NodeAddr::new(1, 0)
}
fn default_t_gossip() -> u64 {
    5
}
fn default_t_fail() -> u64 {
    5
}
fn default_t_remove() -> u64 {
    20
}
fn default_op_timeout() -> u64 {
    20
}
fn default_ring_size() -> u64 {
    512
}
fn default_replicas() -> usize {
    3
}
fn default_quorum() -> usize {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            introducer: default_introducer(),
            t_gossip: default_t_gossip(),
            t_fail: default_t_fail(),
            t_remove: default_t_remove(),
            op_timeout: default_op_timeout(),
            ring_size: default_ring_size(),
            replicas: default_replicas(),
            quorum: default_quorum(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> crate::Result<()> {
        if self.ring_size == 0 {
            return Err(crate::Error::InvalidConfig("ring_size must be > 0".into()));
        }
        if self.replicas == 0 {
            return Err(crate::Error::InvalidConfig("replicas must be > 0".into()));
        }
        if self.quorum == 0 || self.quorum > self.replicas {
            return Err(crate::Error::InvalidConfig(format!(
                "quorum must be in 1..={}, got {}",
                self.replicas, self.quorum
            )));
        }
        if self.t_gossip == 0 {
            return Err(crate::Error::InvalidConfig("t_gossip must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.replicas, 3);
        assert_eq!(cfg.quorum, 2);
        assert_eq!(cfg.t_fail, 5);
        assert_eq!(cfg.t_remove, 20);
    }

    #[test]
    fn test_validate_rejects_bad_quorum() {
        let cfg = Config {
            quorum: 4,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            quorum: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ring() {
        let cfg = Config {
            ring_size: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
