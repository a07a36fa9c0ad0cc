//! Shared types and utilities

pub mod config;
pub mod error;
pub mod events;
pub mod hash;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{Event, EventLog, MemoryLog, TracingLog};
pub use hash::{key_position, node_position, ring_position};
pub use types::{NodeAddr, OpKind, ReplicaRole, Tick};
