//! Consistent-hash ring built from the membership view
//!
//! The ring is rebuilt in full from the current membership snapshot on
//! every material change; there is no incremental maintenance. Nodes are
//! sorted ascending by hash position with the address as tie-break, so
//! ring order is a strict total order.

use crate::common::{hash, NodeAddr, ReplicaRole};

/// A node and its position on the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingNode {
    pub addr: NodeAddr,
    pub position: u64,
}

/// Sorted ring snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ring {
    nodes: Vec<RingNode>,
    ring_size: u64,
}

impl Ring {
    /// Build a ring from a membership snapshot
    pub fn build(members: &[NodeAddr], ring_size: u64) -> Self {
        let mut nodes: Vec<RingNode> = members
            .iter()
            .map(|&addr| RingNode {
                addr,
                position: hash::node_position(addr, ring_size),
            })
            .collect();
        nodes.sort_by_key(|n| (n.position, n.addr));
        Self { nodes, ring_size }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[RingNode] {
        &self.nodes
    }

    /// Replica set for a key: the owner (first node at or after the
    /// key's position, wrapping to the start) plus the next two nodes
    /// walking the ring, with roles assigned in walk order.
    ///
    /// Fewer than 3 nodes means there is no valid replica set and the
    /// result is empty.
    pub fn find_nodes(&self, key: &str) -> Vec<(NodeAddr, ReplicaRole)> {
        if self.nodes.len() < 3 {
            return Vec::new();
        }
        let pos = hash::key_position(key, self.ring_size);
        let first = self.nodes.first().unwrap();
        let last = self.nodes.last().unwrap();

        let owner = if pos <= first.position || pos > last.position {
            0
        } else {
            // First node whose position is >= the key's
            self.nodes
                .iter()
                .position(|n| pos <= n.position)
                .unwrap_or(0)
        };

        (0..3)
            .map(|i| {
                let node = &self.nodes[(owner + i) % self.nodes.len()];
                (node.addr, ReplicaRole::from_index(i))
            })
            .collect()
    }

    /// Replica addresses without roles
    pub fn replica_addrs(&self, key: &str) -> Vec<NodeAddr> {
        self.find_nodes(key).into_iter().map(|(a, _)| a).collect()
    }
}
