//! Quorum-replicated CRUD: wire messages, coordinator bookkeeping and
//! post-rebuild stabilization

pub mod coordinator;
pub mod message;
pub mod stabilize;

pub use coordinator::{Coordinator, Resolution, Transaction, TxPurpose};
pub use message::{CrudKind, CrudMessage};
pub use stabilize::Push;
