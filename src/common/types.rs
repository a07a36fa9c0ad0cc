//! Core identifiers shared across membership, ring and replication

use serde::{Deserialize, Serialize};

/// Discrete logical time, advanced by the external driver
pub type Tick = u64;

/// Node address: numeric id + port, the stable identity of a peer.
///
/// Doubles as the hash-ring input (via [`NodeAddr::to_bytes`]) and as the
/// membership key. `Ord` gives the ring a deterministic tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddr {
    pub id: u32,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(id: u32, port: u16) -> Self {
        Self { id, port }
    }

    /// Fixed 6-byte encoding: 4-byte id LE, 2-byte port LE
    pub fn to_bytes(self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[0..4].copy_from_slice(&self.id.to_le_bytes());
        out[4..6].copy_from_slice(&self.port.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 6 {
            return None;
        }
        let id = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let port = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        Some(Self { id, port })
    }
}

impl std::fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.port)
    }
}

/// Client-visible operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Create,
    Read,
    Update,
    Delete,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Create => write!(f, "create"),
            OpKind::Read => write!(f, "read"),
            OpKind::Update => write!(f, "update"),
            OpKind::Delete => write!(f, "delete"),
        }
    }
}

/// Role a node plays for a given key among its 3 replicas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaRole {
    Primary,
    Secondary,
    Tertiary,
}

impl ReplicaRole {
    /// Role by position in the replica walk (owner first)
    pub fn from_index(i: usize) -> Self {
        match i {
            0 => ReplicaRole::Primary,
            1 => ReplicaRole::Secondary,
            _ => ReplicaRole::Tertiary,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ReplicaRole::Primary => 0,
            ReplicaRole::Secondary => 1,
            ReplicaRole::Tertiary => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ReplicaRole::Primary),
            1 => Some(ReplicaRole::Secondary),
            2 => Some(ReplicaRole::Tertiary),
            _ => None,
        }
    }
}
