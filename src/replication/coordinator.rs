//! Coordinator-side transaction table and quorum bookkeeping
//!
//! Each client operation opens a transaction keyed by a fresh id from a
//! counter owned by this coordinator instance. Replies are deduplicated
//! per (transaction, replying node) before counting; a transaction
//! finalizes as success at `quorum` successful replies, as failure when
//! all expected replies arrive short of quorum, or as failure when it
//! outlives `op_timeout` ticks (swept periodically, same shape as the
//! membership failure sweep).

use crate::common::{Config, Error, Event, EventLog, NodeAddr, OpKind, Tick};
use crate::replication::message::CrudMessage;
use std::collections::{HashMap, HashSet};

/// Why a transaction exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPurpose {
    /// A client CRUD operation
    Client,
    /// A stabilization push; `drop_local` means the local copy goes
    /// away once a push target confirms holding the key
    Repair { drop_local: bool },
}

/// An in-flight operation awaiting replies
#[derive(Debug)]
pub struct Transaction {
    pub id: u64,
    pub op: OpKind,
    pub key: String,
    pub value: Option<String>,
    pub success_count: usize,
    pub total_count: usize,
    pub created: Tick,
    /// Replies expected in total
    pub expected: usize,
    /// Successful replies required to finalize as success
    pub quorum: usize,
    pub purpose: TxPurpose,
    /// Nodes that already replied, for duplicate-delivery dedup
    replied: HashSet<NodeAddr>,
}

/// A finalized transaction, handed back to the node loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub txid: u64,
    pub op: OpKind,
    pub key: String,
    /// For successful reads, the value carried by the reply that
    /// reached quorum; otherwise the written value if any
    pub value: Option<String>,
    pub success: bool,
    /// Why the transaction failed: `QuorumFailed` when all replies
    /// arrived short of quorum, `OperationTimeout` when it expired
    pub error: Option<Error>,
    pub purpose: TxPurpose,
    pub replies: usize,
}

/// Per-node coordinator state
pub struct Coordinator {
    self_addr: NodeAddr,
    next_txid: u64,
    op_timeout: u64,
    table: HashMap<u64, Transaction>,
}

impl Coordinator {
    pub fn new(self_addr: NodeAddr, cfg: &Config) -> Self {
        Self {
            self_addr,
            next_txid: 1,
            op_timeout: cfg.op_timeout,
            table: HashMap::new(),
        }
    }

    /// Open a transaction and return its id
    pub fn begin(
        &mut self,
        op: OpKind,
        key: String,
        value: Option<String>,
        expected: usize,
        quorum: usize,
        purpose: TxPurpose,
        now: Tick,
    ) -> u64 {
        let id = self.next_txid;
        self.next_txid += 1;
        self.table.insert(
            id,
            Transaction {
                id,
                op,
                key,
                value,
                success_count: 0,
                total_count: 0,
                created: now,
                expected,
                quorum,
                purpose,
                replied: HashSet::new(),
            },
        );
        id
    }

    /// Account one REPLY/READREPLY. Returns the resolution if this reply
    /// finalized the transaction. Unknown transaction ids (already
    /// resolved, or stray deliveries) are ignored.
    pub fn handle_reply(&mut self, msg: &CrudMessage, log: &dyn EventLog) -> Option<Resolution> {
        let tx = self.table.get_mut(&msg.txid)?;
        if !tx.replied.insert(msg.origin) {
            // Duplicate delivery from the same replica, already counted
            tracing::trace!(txid = msg.txid, from = %msg.origin, "duplicate reply ignored");
            return None;
        }
        tx.total_count += 1;
        if msg.success {
            tx.success_count += 1;
        }

        // Repair pushes only need evidence the target holds the key. The
        // sole create failure mode is DuplicateKey, so any reply counts.
        if matches!(tx.purpose, TxPurpose::Repair { .. }) {
            let tx = self.table.remove(&msg.txid).unwrap();
            tracing::debug!(txid = tx.id, key = %tx.key, "repair push confirmed");
            return Some(resolution(&tx, true, None, None));
        }

        if tx.success_count >= tx.quorum {
            let tx = self.table.remove(&msg.txid).unwrap();
            let read_value = msg.value.clone();
            let res = resolution(&tx, true, read_value, None);
            log.record(Event::OpSuccess {
                at: self.self_addr,
                coordinator: true,
                txid: res.txid,
                op: res.op,
                key: res.key.clone(),
                value: res.value.clone(),
            });
            Some(res)
        } else if tx.total_count >= tx.expected {
            let tx = self.table.remove(&msg.txid).unwrap();
            let res = resolution(&tx, false, None, Some(Error::QuorumFailed(tx.id)));
            log.record(Event::OpFailure {
                at: self.self_addr,
                coordinator: true,
                txid: res.txid,
                op: res.op,
                key: res.key.clone(),
            });
            Some(res)
        } else {
            None
        }
    }

    /// Expire transactions that outlived `op_timeout`, finalizing each
    /// as failure
    pub fn sweep(&mut self, now: Tick, log: &dyn EventLog) -> Vec<Resolution> {
        let expired: Vec<u64> = self
            .table
            .values()
            .filter(|tx| now.saturating_sub(tx.created) >= self.op_timeout)
            .map(|tx| tx.id)
            .collect();

        let mut resolutions = Vec::with_capacity(expired.len());
        for txid in expired {
            let tx = self.table.remove(&txid).unwrap();
            tracing::debug!(txid, key = %tx.key, op = %tx.op, "transaction timed out");
            if matches!(tx.purpose, TxPurpose::Client) {
                log.record(Event::OpFailure {
                    at: self.self_addr,
                    coordinator: true,
                    txid,
                    op: tx.op,
                    key: tx.key.clone(),
                });
            }
            resolutions.push(resolution(&tx, false, None, Some(Error::OperationTimeout(txid))));
        }
        resolutions
    }

    pub fn pending(&self) -> usize {
        self.table.len()
    }
}

fn resolution(
    tx: &Transaction,
    success: bool,
    read_value: Option<String>,
    error: Option<Error>,
) -> Resolution {
    let value = if success && tx.op == OpKind::Read {
        read_value
    } else {
        tx.value.clone()
    };
    Resolution {
        txid: tx.id,
        op: tx.op,
        key: tx.key.clone(),
        value,
        success,
        error,
        purpose: tx.purpose,
        replies: tx.total_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{MemoryLog, ReplicaRole};

    fn coord() -> (Coordinator, MemoryLog) {
        (
            Coordinator::new(NodeAddr::new(1, 0), &Config::default()),
            MemoryLog::new(),
        )
    }

    fn reply_from(txid: u64, id: u32, success: bool) -> CrudMessage {
        CrudMessage::reply(txid, NodeAddr::new(id, 0), "k".into(), ReplicaRole::Primary, success)
    }

    #[test]
    fn test_quorum_success_two_of_three() {
        let (mut coord, log) = coord();
        let txid = coord.begin(
            OpKind::Create,
            "k".into(),
            Some("v".into()),
            3,
            2,
            TxPurpose::Client,
            0,
        );

        assert!(coord.handle_reply(&reply_from(txid, 2, true), &log).is_none());
        let res = coord.handle_reply(&reply_from(txid, 3, true), &log).unwrap();
        assert!(res.success);
        assert!(res.error.is_none());
        assert_eq!(res.value.as_deref(), Some("v"));
        assert_eq!(coord.pending(), 0);
        assert_eq!(log.coordinator_successes(OpKind::Create), 1);

        // Third reply straggles in after resolution: ignored
        assert!(coord.handle_reply(&reply_from(txid, 4, true), &log).is_none());
    }

    #[test]
    fn test_quorum_failure_one_of_three() {
        let (mut coord, log) = coord();
        let txid = coord.begin(
            OpKind::Update,
            "k".into(),
            Some("v".into()),
            3,
            2,
            TxPurpose::Client,
            0,
        );

        assert!(coord.handle_reply(&reply_from(txid, 2, true), &log).is_none());
        assert!(coord.handle_reply(&reply_from(txid, 3, false), &log).is_none());
        let res = coord.handle_reply(&reply_from(txid, 4, false), &log).unwrap();
        assert!(!res.success);
        assert_eq!(res.error, Some(Error::QuorumFailed(txid)));
        assert_eq!(log.coordinator_failures(OpKind::Update), 1);
    }

    #[test]
    fn test_duplicate_replies_do_not_double_count() {
        let (mut coord, log) = coord();
        let txid = coord.begin(
            OpKind::Create,
            "k".into(),
            Some("v".into()),
            3,
            2,
            TxPurpose::Client,
            0,
        );

        // The same replica's success delivered three times counts once
        for _ in 0..3 {
            assert!(coord.handle_reply(&reply_from(txid, 2, true), &log).is_none());
        }
        assert_eq!(coord.pending(), 1);

        // A second distinct replica completes the quorum
        assert!(coord.handle_reply(&reply_from(txid, 3, true), &log).is_some());
    }

    #[test]
    fn test_read_value_comes_from_quorum_reply() {
        let (mut coord, log) = coord();
        let txid = coord.begin(OpKind::Read, "k".into(), None, 3, 2, TxPurpose::Client, 0);

        let mk = |id: u32, value: &str| {
            CrudMessage::read_reply(
                txid,
                NodeAddr::new(id, 0),
                "k".into(),
                Some(value.into()),
                ReplicaRole::Primary,
                true,
            )
        };
        assert!(coord.handle_reply(&mk(2, "v1"), &log).is_none());
        let res = coord.handle_reply(&mk(3, "v1"), &log).unwrap();
        assert!(res.success);
        assert_eq!(res.value.as_deref(), Some("v1"));
    }

    #[test]
    fn test_unknown_txid_ignored() {
        let (mut coord, log) = coord();
        assert!(coord.handle_reply(&reply_from(99, 2, true), &log).is_none());
    }

    #[test]
    fn test_timeout_sweep_expires() {
        let (mut coord, log) = coord();
        let txid = coord.begin(
            OpKind::Delete,
            "k".into(),
            None,
            3,
            2,
            TxPurpose::Client,
            5,
        );
        assert!(coord.handle_reply(&reply_from(txid, 2, true), &log).is_none());

        assert!(coord.sweep(5 + Config::default().op_timeout - 1, &log).is_empty());
        let resolutions = coord.sweep(5 + Config::default().op_timeout, &log);
        assert_eq!(resolutions.len(), 1);
        assert!(!resolutions[0].success);
        assert_eq!(resolutions[0].error, Some(Error::OperationTimeout(txid)));
        assert_eq!(coord.pending(), 0);
        assert_eq!(log.coordinator_failures(OpKind::Delete), 1);
    }

    #[test]
    fn test_txids_monotonic() {
        let (mut coord, _) = coord();
        let a = coord.begin(OpKind::Create, "a".into(), None, 3, 2, TxPurpose::Client, 0);
        let b = coord.begin(OpKind::Create, "b".into(), None, 3, 2, TxPurpose::Client, 0);
        assert!(b > a);
    }

    #[test]
    fn test_repair_finalizes_on_first_reply() {
        let (mut coord, log) = coord();
        let txid = coord.begin(
            OpKind::Create,
            "k".into(),
            Some("v".into()),
            2,
            1,
            TxPurpose::Repair { drop_local: true },
            0,
        );

        // Even a DuplicateKey failure confirms the target holds the key
        let res = coord.handle_reply(&reply_from(txid, 2, false), &log).unwrap();
        assert!(res.success);
        assert_eq!(res.purpose, TxPurpose::Repair { drop_local: true });
        // Repair traffic is not a client outcome
        assert_eq!(log.coordinator_successes(OpKind::Create), 0);
    }

    #[test]
    fn test_repair_timeout_is_not_confirmation() {
        let (mut coord, log) = coord();
        coord.begin(
            OpKind::Create,
            "k".into(),
            Some("v".into()),
            1,
            1,
            TxPurpose::Repair { drop_local: true },
            0,
        );
        let resolutions = coord.sweep(Config::default().op_timeout, &log);
        assert_eq!(resolutions.len(), 1);
        assert!(!resolutions[0].success);
    }
}
