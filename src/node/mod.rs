//! The per-node cooperative loop
//!
//! A node owns its membership view, ring snapshot, local store and
//! transaction table; nothing else touches them. The external driver
//! advances all nodes on a shared tick: each tick the node first drains
//! its entire inbound queue, then (once joined) runs membership
//! housekeeping, rebuilds the ring if the view changed, and sweeps
//! stale transactions. Cross-node interaction is exclusively message
//! passing over an unreliable transport.

use crate::common::{Config, Error, Event, EventLog, NodeAddr, OpKind, Result, Tick};
use crate::membership::{MembershipFrame, MembershipService};
use crate::replication::message::{CrudKind, CrudMessage};
use crate::replication::{stabilize, Coordinator, Resolution, TxPurpose};
use crate::ring::Ring;
use crate::store::LocalStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::sync::Arc;

/// Outbound side of the message-passing substrate. Delivery may drop,
/// delay or duplicate; protocol correctness never assumes otherwise.
pub trait Transport {
    fn send(&mut self, from: NodeAddr, to: NodeAddr, payload: Vec<u8>);
}

/// One simulated node
pub struct Node {
    addr: NodeAddr,
    cfg: Config,
    membership: MembershipService,
    ring: Ring,
    /// Membership snapshot the current ring was built from
    ring_members: Vec<NodeAddr>,
    store: LocalStore,
    coordinator: Coordinator,
    inbox: VecDeque<Vec<u8>>,
    rng: StdRng,
    log: Arc<dyn EventLog>,
    /// Finalized client transactions awaiting pickup
    outcomes: Vec<Resolution>,
}

impl Node {
    pub fn new(addr: NodeAddr, cfg: Config, seed: u64, log: Arc<dyn EventLog>) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            addr,
            membership: MembershipService::new(addr, &cfg),
            ring: Ring::default(),
            ring_members: Vec::new(),
            store: LocalStore::new(),
            coordinator: Coordinator::new(addr, &cfg),
            inbox: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
            log,
            outcomes: Vec::new(),
            cfg,
        })
    }

    pub fn addr(&self) -> NodeAddr {
        self.addr
    }

    /// Kick off the join handshake (or bootstrap, for the introducer)
    pub fn start(&mut self, now: Tick, net: &mut dyn Transport) {
        let log = Arc::clone(&self.log);
        self.membership.start(now, net, log.as_ref());
    }

    /// Deliver one raw frame into the inbound queue
    pub fn enqueue(&mut self, payload: Vec<u8>) {
        self.inbox.push_back(payload);
    }

    /// Advance one tick: drain the inbox, then run periodic housekeeping
    pub fn tick(&mut self, now: Tick, net: &mut dyn Transport) {
        let log = Arc::clone(&self.log);

        while let Some(payload) = self.inbox.pop_front() {
            if let Err(e) = self.handle_payload(&payload, now, net) {
                tracing::warn!(at = %self.addr, error = %e, "dropped frame");
            }
        }

        // Unjoined nodes still tick membership so the join retry runs.
        self.membership.tick(now, net, &mut self.rng, log.as_ref());
        if self.membership.is_joined() {
            self.rebuild_ring_if_changed(now, net);
            for res in self.coordinator.sweep(now, log.as_ref()) {
                self.finish(res, now, net);
            }
        }
    }

    // === Client API (coordinator side) ===

    pub fn client_create(
        &mut self,
        key: &str,
        value: &str,
        now: Tick,
        net: &mut dyn Transport,
    ) -> Result<u64> {
        self.client_op(OpKind::Create, key, Some(value), now, net)
    }

    pub fn client_read(&mut self, key: &str, now: Tick, net: &mut dyn Transport) -> Result<u64> {
        self.client_op(OpKind::Read, key, None, now, net)
    }

    pub fn client_update(
        &mut self,
        key: &str,
        value: &str,
        now: Tick,
        net: &mut dyn Transport,
    ) -> Result<u64> {
        self.client_op(OpKind::Update, key, Some(value), now, net)
    }

    pub fn client_delete(&mut self, key: &str, now: Tick, net: &mut dyn Transport) -> Result<u64> {
        self.client_op(OpKind::Delete, key, None, now, net)
    }

    /// Open a transaction and fan the request out to the replica set.
    /// Fire-and-forget: resolution arrives via [`Node::drain_outcomes`].
    fn client_op(
        &mut self,
        op: OpKind,
        key: &str,
        value: Option<&str>,
        now: Tick,
        net: &mut dyn Transport,
    ) -> Result<u64> {
        if !self.membership.is_joined() {
            return Err(Error::NotJoined);
        }
        self.rebuild_ring_if_changed(now, net);

        let replicas = self.ring.find_nodes(key);
        if replicas.is_empty() {
            // Too few nodes for a valid replica set: fail fast, no
            // transaction that could never reach quorum.
            self.log.record(Event::OpFailure {
                at: self.addr,
                coordinator: true,
                txid: 0,
                op,
                key: key.to_string(),
            });
            return Err(Error::InsufficientReplicas {
                needed: self.cfg.replicas,
                available: self.ring.len(),
            });
        }

        let txid = self.coordinator.begin(
            op,
            key.to_string(),
            value.map(str::to_string),
            replicas.len(),
            self.cfg.quorum,
            TxPurpose::Client,
            now,
        );
        for (target, role) in replicas {
            let msg = CrudMessage::request(
                txid,
                self.addr,
                op,
                key.to_string(),
                value.map(str::to_string),
                role,
            );
            net.send(self.addr, target, msg.encode());
        }
        tracing::debug!(at = %self.addr, txid, %op, key, "dispatched client operation");
        Ok(txid)
    }

    /// Take the client transactions finalized since the last call
    pub fn drain_outcomes(&mut self) -> Vec<Resolution> {
        std::mem::take(&mut self.outcomes)
    }

    // === Frame handling ===

    fn handle_payload(&mut self, payload: &[u8], now: Tick, net: &mut dyn Transport) -> Result<()> {
        let tag = *payload
            .first()
            .ok_or_else(|| Error::Malformed("empty frame".into()))?;
        if MembershipFrame::owns_tag(tag) {
            let frame = MembershipFrame::decode(payload)?;
            let log = Arc::clone(&self.log);
            self.membership.handle_frame(frame, now, net, log.as_ref());
            Ok(())
        } else if CrudKind::owns_tag(tag) {
            let msg = CrudMessage::decode(payload)?;
            self.handle_crud(msg, now, net);
            Ok(())
        } else {
            Err(Error::Malformed(format!("unknown frame tag {}", tag)))
        }
    }

    fn handle_crud(&mut self, msg: CrudMessage, now: Tick, net: &mut dyn Transport) {
        match msg.kind {
            CrudKind::Create => self.serve_write(OpKind::Create, msg, now, net),
            CrudKind::Update => self.serve_write(OpKind::Update, msg, now, net),
            CrudKind::Delete => self.serve_write(OpKind::Delete, msg, now, net),
            CrudKind::Read => self.serve_read(msg, net),
            CrudKind::Reply | CrudKind::ReadReply => {
                let log = Arc::clone(&self.log);
                if let Some(res) = self.coordinator.handle_reply(&msg, log.as_ref()) {
                    self.finish(res, now, net);
                }
            }
        }
    }

    /// Replica side of CREATE/UPDATE/DELETE: apply locally, log, always
    /// reply to the origin with the outcome
    fn serve_write(&mut self, op: OpKind, msg: CrudMessage, now: Tick, net: &mut dyn Transport) {
        let result = match op {
            OpKind::Create => self.store.create(
                &msg.key,
                msg.value.clone().unwrap_or_default(),
                msg.role,
                now,
            ),
            OpKind::Update => self.store.update(
                &msg.key,
                msg.value.clone().unwrap_or_default(),
                msg.role,
                now,
            ),
            OpKind::Delete => self.store.delete(&msg.key),
            // Reads are dispatched to serve_read, never here.
            OpKind::Read => unreachable!("read request on the write path"),
        };
        let success = result.is_ok();
        self.log_replica_outcome(op, &msg, success);

        let reply = CrudMessage::reply(msg.txid, self.addr, msg.key, msg.role, success);
        net.send(self.addr, msg.origin, reply.encode());
    }

    /// Replica side of READ: reply with the value, or not-found
    fn serve_read(&mut self, msg: CrudMessage, net: &mut dyn Transport) {
        let value = self.store.read(&msg.key).map(|entry| entry.value.clone());
        let success = value.is_some();
        self.log_replica_outcome(OpKind::Read, &msg, success);

        let reply =
            CrudMessage::read_reply(msg.txid, self.addr, msg.key, value, msg.role, success);
        net.send(self.addr, msg.origin, reply.encode());
    }

    fn log_replica_outcome(&self, op: OpKind, msg: &CrudMessage, success: bool) {
        if success {
            self.log.record(Event::OpSuccess {
                at: self.addr,
                coordinator: false,
                txid: msg.txid,
                op,
                key: msg.key.clone(),
                value: msg.value.clone(),
            });
        } else {
            self.log.record(Event::OpFailure {
                at: self.addr,
                coordinator: false,
                txid: msg.txid,
                op,
                key: msg.key.clone(),
            });
        }
    }

    /// Act on a finalized transaction
    fn finish(&mut self, res: Resolution, now: Tick, net: &mut dyn Transport) {
        match res.purpose {
            TxPurpose::Repair { drop_local } => {
                if res.success {
                    if drop_local {
                        self.store.discard(&res.key);
                    }
                } else {
                    // No push target ever replied. The key may still be
                    // under-replicated, so the push goes out again.
                    self.retry_repair(&res.key, now, net);
                }
            }
            TxPurpose::Client => self.outcomes.push(res),
        }
    }

    /// Re-issue a stabilization push for a key whose repair transaction
    /// expired. Targets the full current replica set; a single reply,
    /// success or DuplicateKey, confirms the key is held.
    fn retry_repair(&mut self, key: &str, now: Tick, net: &mut dyn Transport) {
        let Some(entry) = self.store.read(key) else {
            return;
        };
        let value = entry.value.clone();
        let new_set = self.ring.find_nodes(key);
        let self_in_new = new_set.iter().any(|(addr, _)| *addr == self.addr);
        let targets: Vec<_> = new_set
            .into_iter()
            .filter(|(addr, _)| *addr != self.addr)
            .collect();
        if targets.is_empty() {
            return;
        }
        let txid = self.coordinator.begin(
            OpKind::Create,
            key.to_string(),
            Some(value.clone()),
            targets.len(),
            1,
            TxPurpose::Repair {
                drop_local: !self_in_new,
            },
            now,
        );
        tracing::debug!(at = %self.addr, txid, key, "retrying stabilization push");
        for (target, role) in targets {
            let msg = CrudMessage::request(
                txid,
                self.addr,
                OpKind::Create,
                key.to_string(),
                Some(value.clone()),
                role,
            );
            net.send(self.addr, target, msg.encode());
        }
    }

    // === Ring maintenance ===

    /// Rebuild the ring when the membership view changed, then run the
    /// stabilization pushes the new assignment demands
    fn rebuild_ring_if_changed(&mut self, now: Tick, net: &mut dyn Transport) {
        let members = self.membership.addrs();
        if members == self.ring_members {
            return;
        }
        let old_ring = std::mem::take(&mut self.ring);
        self.ring = Ring::build(&members, self.cfg.ring_size);
        self.ring_members = members;
        tracing::debug!(at = %self.addr, nodes = self.ring.len(), "ring rebuilt");

        for push in stabilize::plan(self.addr, &old_ring, &self.ring, &self.store) {
            let txid = self.coordinator.begin(
                OpKind::Create,
                push.key.clone(),
                Some(push.value.clone()),
                push.targets.len(),
                1,
                TxPurpose::Repair {
                    drop_local: push.drop_local,
                },
                now,
            );
            for (target, role) in push.targets {
                let msg = CrudMessage::request(
                    txid,
                    self.addr,
                    OpKind::Create,
                    push.key.clone(),
                    Some(push.value.clone()),
                    role,
                );
                net.send(self.addr, target, msg.encode());
            }
        }
    }

    // === Introspection ===

    pub fn is_joined(&self) -> bool {
        self.membership.is_joined()
    }

    pub fn membership(&self) -> &MembershipService {
        &self.membership
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn pending_transactions(&self) -> usize {
        self.coordinator.pending()
    }
}
