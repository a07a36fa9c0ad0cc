//! Replica repair after ring membership changes
//!
//! When the ring changes, every node reconciles the keys it holds with
//! the new replica assignment. Holders push each key to the new-set
//! members that were not in the previous set; a holder that dropped out
//! of the set pushes to the whole new set and discards its copy only
//! after one target confirms possession. A node newly responsible for a
//! key cannot enumerate keys it does not hold, so its side of the
//! transfer is covered by the surviving holders' pushes. The target
//! invariant: every live key ends up with min(3, live nodes) replicas.

use crate::common::{NodeAddr, ReplicaRole};
use crate::ring::Ring;
use crate::store::LocalStore;
use std::collections::HashSet;

/// One key to hand to new replica holders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Push {
    pub key: String,
    pub value: String,
    pub targets: Vec<(NodeAddr, ReplicaRole)>,
    /// Discard the local copy once a target confirms holding the key
    pub drop_local: bool,
}

/// Compute the pushes this node owes after a ring rebuild
pub fn plan(self_addr: NodeAddr, old_ring: &Ring, new_ring: &Ring, store: &LocalStore) -> Vec<Push> {
    let mut pushes = Vec::new();
    for key in store.keys() {
        let new_set = new_ring.find_nodes(key);
        if new_set.is_empty() {
            // Ring shrank below the replica count. Keep the data; the
            // next viable ring will redistribute it.
            continue;
        }
        let old_set: HashSet<NodeAddr> = old_ring.replica_addrs(key).into_iter().collect();
        let self_in_new = new_set.iter().any(|(addr, _)| *addr == self_addr);

        let targets: Vec<(NodeAddr, ReplicaRole)> = if self_in_new {
            // Still a holder: only the genuinely new members need a copy
            new_set
                .into_iter()
                .filter(|(addr, _)| *addr != self_addr && !old_set.contains(addr))
                .collect()
        } else {
            let changed = old_set.contains(&self_addr)
                || new_set.len() != old_set.len()
                || new_set.iter().any(|(addr, _)| !old_set.contains(addr));
            if !changed {
                // A copy held outside an unchanged assignment stays put;
                // there is no handoff to make.
                continue;
            }
            // Dropped out of the set: push to the full new set so at
            // least one reply can confirm the handoff
            new_set.into_iter().filter(|(addr, _)| *addr != self_addr).collect()
        };

        if targets.is_empty() {
            continue;
        }
        let value = store
            .read(key)
            .map(|entry| entry.value.clone())
            .unwrap_or_default();
        pushes.push(Push {
            key: key.to_string(),
            value,
            targets,
            drop_local: !self_in_new,
        });
    }
    pushes
}
