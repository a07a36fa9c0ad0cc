//! Event sinks for membership and CRUD outcomes
//!
//! Nodes report membership changes and operation results here.
//! Production uses [`TracingLog`]; tests inject [`MemoryLog`] and
//! assert on the recorded stream.

use crate::common::{NodeAddr, OpKind};
use std::sync::Mutex;

/// A single logged event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NodeAdd {
        at: NodeAddr,
        added: NodeAddr,
    },
    NodeRemove {
        at: NodeAddr,
        removed: NodeAddr,
    },
    OpSuccess {
        at: NodeAddr,
        coordinator: bool,
        txid: u64,
        op: OpKind,
        key: String,
        value: Option<String>,
    },
    OpFailure {
        at: NodeAddr,
        coordinator: bool,
        txid: u64,
        op: OpKind,
        key: String,
    },
}

/// Sink for node-level events
pub trait EventLog: Send + Sync {
    fn record(&self, event: Event);
}

/// Event sink backed by `tracing`
#[derive(Debug, Default)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn record(&self, event: Event) {
        match event {
            Event::NodeAdd { at, added } => {
                tracing::info!(%at, %added, "membership add");
            }
            Event::NodeRemove { at, removed } => {
                tracing::info!(%at, %removed, "membership remove");
            }
            Event::OpSuccess {
                at,
                coordinator,
                txid,
                op,
                key,
                ..
            } => {
                tracing::info!(%at, coordinator, txid, %op, %key, "operation succeeded");
            }
            Event::OpFailure {
                at,
                coordinator,
                txid,
                op,
                key,
            } => {
                tracing::warn!(%at, coordinator, txid, %op, %key, "operation failed");
            }
        }
    }
}

/// Recording sink for tests
#[derive(Debug, Default)]
pub struct MemoryLog {
    events: Mutex<Vec<Event>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Number of removal events logged at `at` for `removed`
    pub fn removals_of(&self, at: NodeAddr, removed: NodeAddr) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::NodeRemove { at: a, removed: r } if *a == at && *r == removed))
            .count()
    }

    /// Coordinator-side successes for a given operation kind
    pub fn coordinator_successes(&self, op: OpKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(
                |e| matches!(e, Event::OpSuccess { coordinator: true, op: o, .. } if *o == op),
            )
            .count()
    }

    /// Coordinator-side failures for a given operation kind
    pub fn coordinator_failures(&self, op: OpKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(
                |e| matches!(e, Event::OpFailure { coordinator: true, op: o, .. } if *o == op),
            )
            .count()
    }
}

impl EventLog for MemoryLog {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}
