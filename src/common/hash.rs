//! Hashing utilities for ringkv
//!
//! BLAKE3 maps node addresses and keys into the same fixed ring space:
//! the first 8 little-endian bytes of the digest, reduced modulo the
//! ring size.

use crate::common::NodeAddr;

/// Hash arbitrary bytes to a position on the ring
pub fn ring_position(data: &[u8], ring_size: u64) -> u64 {
    let hash = blake3::hash(data);
    let v = u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap());
    v % ring_size
}

/// Ring position of a key
pub fn key_position(key: &str, ring_size: u64) -> u64 {
    ring_position(key.as_bytes(), ring_size)
}

/// Ring position of a node, derived from its address bytes
pub fn node_position(addr: NodeAddr, ring_size: u64) -> u64 {
    ring_position(&addr.to_bytes(), ring_size)
}
