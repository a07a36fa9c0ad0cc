//! Gossip-based membership and failure detection

pub mod service;
pub mod wire;

pub use service::{MembershipEntry, MembershipService};
pub use wire::{MemberRecord, MembershipFrame};
