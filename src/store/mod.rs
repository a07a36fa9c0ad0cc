//! Per-node in-memory key-value table
//!
//! One entry per key, stamped with the write tick and the replica role
//! the node held for the key at write time. CRUD failures are typed:
//! CREATE on an existing key and UPDATE/DELETE/READ on an absent key are
//! reported, never panics.

use crate::common::{Error, ReplicaRole, Result, Tick};
use std::collections::BTreeMap;

/// A stored value with its write metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: String,
    pub timestamp: Tick,
    pub role: ReplicaRole,
}

/// In-memory store scoped to one node
#[derive(Debug, Default)]
pub struct LocalStore {
    entries: BTreeMap<String, Entry>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new key. Fails with `DuplicateKey` if present.
    pub fn create(&mut self, key: &str, value: String, role: ReplicaRole, now: Tick) -> Result<()> {
        if self.entries.contains_key(key) {
            return Err(Error::DuplicateKey(key.to_string()));
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                timestamp: now,
                role,
            },
        );
        Ok(())
    }

    /// Read a key, `None` if absent
    pub fn read(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Overwrite an existing key. Fails with `MissingKey` if absent.
    pub fn update(&mut self, key: &str, value: String, role: ReplicaRole, now: Tick) -> Result<()> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value = value;
                entry.timestamp = now;
                entry.role = role;
                Ok(())
            }
            None => Err(Error::MissingKey(key.to_string())),
        }
    }

    /// Remove an existing key. Fails with `MissingKey` if absent.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        match self.entries.remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::MissingKey(key.to_string())),
        }
    }

    /// Drop a key without CRUD semantics (stabilization handoff)
    pub fn discard(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Held keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
