//! # ringkv
//!
//! The control and data plane of a small peer-to-peer key-value store:
//! - Heartbeat/gossip membership with timeout failure detection
//! - A consistent-hash ring rebuilt from the membership view
//! - Quorum-replicated CRUD (2 of 3) with a transaction table
//! - Stabilization that restores 3 replicas per key after ring changes
//!
//! ## Architecture
//!
//! ```text
//!  ┌───────────────────────────────┐
//!  │      Membership Service       │  heartbeats, gossip,
//!  │  (view of peers + suspects)   │  failure sweep
//!  └───────────────┬───────────────┘
//!                  │ view change
//!  ┌───────────────▼───────────────┐
//!  │         Ring Builder          │  sorted hash ring,
//!  │    find_nodes → 3 replicas    │  stabilization pushes
//!  └───────────────┬───────────────┘
//!                  │ replica set
//!  ┌───────────────▼───────────────┐      ┌──────────────┐
//!  │   Replication Coordinator     │◄────►│ Local Store  │
//!  │ (transactions, quorum = 2/3)  │      │ key → Entry  │
//!  └───────────────────────────────┘      └──────────────┘
//! ```
//!
//! Every node runs a single-threaded cooperative loop ([`Node::tick`])
//! advanced by an external driver on a shared discrete tick. Nodes only
//! interact through an unreliable message-passing [`node::Transport`];
//! the [`sim`] module provides a lossy in-process implementation and a
//! cluster driver for tests.
//!
//! Out of scope by design: durable storage, authentication, transport
//! encryption and cross-datacenter topology.

pub mod common;
pub mod membership;
pub mod node;
pub mod replication;
pub mod ring;
pub mod sim;
pub mod store;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use node::{Node, Transport};
pub use ring::Ring;
pub use sim::{Cluster, SimConfig, SimNet};
pub use store::LocalStore;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
